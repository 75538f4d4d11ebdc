//! Thermolog collector binary.
//!
//! Without `SCHEDULE_INTERVAL_SECS` it runs a single collection, prints the
//! completion as JSON on stdout and exits non-zero if the run failed.
//! Otherwise it starts one independent run per interval tick until Ctrl-C.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use thermolog_collector::config::CollectorConfig;
use thermolog_collector::trigger::{self, Completion};
use thermolog_collector::{HttpDeviceFetcher, HttpWeatherFetcher, Pipeline, Store};

type Collector = Pipeline<HttpDeviceFetcher, HttpWeatherFetcher, Store>;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // stdout is reserved for completions
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("thermolog_collector=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Thermolog collector starting...");

    let config = CollectorConfig::load().context("Failed to load configuration")?;
    info!("Configuration: {:?}", config);

    let pipeline = build_pipeline(&config).await?;

    match config.schedule_interval {
        None => run_once(&pipeline).await,
        Some(every) => run_scheduled(Arc::new(pipeline), every).await,
    }
}

async fn build_pipeline(config: &CollectorConfig) -> Result<Collector> {
    let device = HttpDeviceFetcher::new(&config.device);
    let weather = config
        .weather
        .as_ref()
        .map(HttpWeatherFetcher::new)
        .transpose()
        .context("Failed to build weather client")?;
    if weather.is_none() {
        warn!("No weather provider configured, readings will not be enriched");
    }
    let store = Store::open(&config.store).await.context("Failed to open record store")?;

    Ok(Pipeline::new(device, weather, store))
}

async fn run_once(pipeline: &Collector) -> Result<()> {
    let mut completion = None;
    trigger::handle(pipeline, |c| completion = Some(c)).await;
    let completion = completion.context("Run ended without a completion")?;

    println!("{}", serde_json::to_string(&completion).context("Failed to serialize completion")?);
    match completion {
        Completion::Succeeded { .. } => Ok(()),
        Completion::Failed { error } => anyhow::bail!("Collection failed: {error}"),
    }
}

async fn run_scheduled(pipeline: Arc<Collector>, every: Duration) -> Result<()> {
    info!("Collecting every {}s", every.as_secs());
    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let pipeline = Arc::clone(&pipeline);
                tokio::spawn(async move {
                    trigger::handle(&pipeline, |completion| match completion {
                        Completion::Succeeded { result } => info!("Stored reading {}", result),
                        Completion::Failed { error } => error!("Collection failed: {}", error),
                    })
                    .await;
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                return Ok(());
            }
        }
    }
}
