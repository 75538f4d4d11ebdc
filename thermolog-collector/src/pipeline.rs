/**
 * PIPELINE - One collection run
 *
 * START -> FETCH_DEVICE -> EXTRACT -> PERSIST_1 -> FETCH_WEATHER -> MERGE -> PERSIST_2 -> DONE
 *
 * Any stage error jumps straight to FAILED. Stages are awaited one after the
 * other on the calling task. The base reading is stored before the weather
 * call so a weather outage still leaves a row behind; the invocation is then
 * reported as failed all the same.
 *
 * Without a weather source the run ends after PERSIST_1.
 */

use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::error::CollectorError;
use crate::extractor::{extract_all, NEST_FIELDS};
use crate::fetch::{DeviceSource, WeatherSource};
use crate::record::Record;
use crate::store::RecordStore;
use crate::weather::WeatherReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Start,
    FetchDevice,
    Extract,
    #[serde(rename = "PERSIST_1")]
    Persist1,
    FetchWeather,
    Merge,
    #[serde(rename = "PERSIST_2")]
    Persist2,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "START",
            Stage::FetchDevice => "FETCH_DEVICE",
            Stage::Extract => "EXTRACT",
            Stage::Persist1 => "PERSIST_1",
            Stage::FetchWeather => "FETCH_WEATHER",
            Stage::Merge => "MERGE",
            Stage::Persist2 => "PERSIST_2",
            Stage::Done => "DONE",
            Stage::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Result of one run together with the stages it went through.
#[derive(Debug)]
pub struct Invocation {
    /// Visited stages in order, ending with `Done` or `Failed`.
    pub stages: Vec<Stage>,
    pub outcome: Result<Record, CollectorError>,
}

impl Invocation {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Last stage entered before the terminal one.
    pub fn last_step(&self) -> Option<Stage> {
        self.stages.iter().rev().nth(1).copied()
    }
}

pub struct Pipeline<D, W, S> {
    device: D,
    weather: Option<W>,
    store: S,
    clock: fn() -> i64,
}

impl<D, W, S> Pipeline<D, W, S>
where
    D: DeviceSource,
    W: WeatherSource,
    S: RecordStore,
{
    pub fn new(device: D, weather: Option<W>, store: S) -> Self {
        Self {
            device,
            weather,
            store,
            clock: now_seconds,
        }
    }

    /// Replaces the wall clock used to stamp readings.
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn has_weather(&self) -> bool {
        self.weather.is_some()
    }

    pub async fn run(&self) -> Result<Record, CollectorError> {
        self.invoke().await.outcome
    }

    pub async fn invoke(&self) -> Invocation {
        let started = Instant::now();
        let mut stages = vec![Stage::Start];

        let outcome = self.drive(&mut stages).await;
        let elapsed = started.elapsed().as_millis();

        match &outcome {
            Ok(record) => {
                stages.push(Stage::Done);
                let ambient = record
                    .get("ambientTemperature")
                    .map_or_else(|| "unknown".to_string(), |v| v.to_string());
                info!("Ambient temperature: {}", ambient);
                info!("Invocation done in {}ms", elapsed);
            }
            Err(e) => {
                stages.push(Stage::Failed);
                error!("Invocation failed after {}ms: {}", elapsed, e);
            }
        }

        Invocation { stages, outcome }
    }

    async fn drive(&self, stages: &mut Vec<Stage>) -> Result<Record, CollectorError> {
        let doc = timed(stages, Stage::FetchDevice, self.device.fetch_device()).await?;

        stages.push(Stage::Extract);
        let started = Instant::now();
        let base = extract_all(&doc, NEST_FIELDS).with_timestamp((self.clock)());
        info!("{} took {}ms ({} fields)", Stage::Extract, started.elapsed().as_millis(), base.len());

        timed(stages, Stage::Persist1, self.store.upsert(&base)).await?;

        let Some(weather) = &self.weather else {
            debug!("no weather source configured, keeping base reading");
            return Ok(base);
        };

        let raw = timed(stages, Stage::FetchWeather, weather.fetch_weather()).await?;

        stages.push(Stage::Merge);
        let started = Instant::now();
        let report = WeatherReport::from_document(weather.shape(), &raw);
        let merged = base.merge(report.to_record());
        info!("{} took {}ms", Stage::Merge, started.elapsed().as_millis());

        timed(stages, Stage::Persist2, self.store.upsert(&merged)).await?;
        Ok(merged)
    }
}

async fn timed<T, E, F>(stages: &mut Vec<Stage>, stage: Stage, step: F) -> Result<T, CollectorError>
where
    F: Future<Output = Result<T, E>>,
    CollectorError: From<E>,
{
    stages.push(stage);
    let started = Instant::now();
    let result = step.await;
    info!("{} took {}ms", stage, started.elapsed().as_millis());
    result.map_err(CollectorError::from)
}

fn now_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}
