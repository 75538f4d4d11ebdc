/*!
Test harness for the collector pipeline

Wires stub sources and a spy store into a pipeline and offers:
- expectations on call and write counts
- assertions on the fields of the last stored reading
- a summary of what happened during the test
*/

use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use thermolog_collector::{Pipeline, Record};

use crate::fixtures::{self, DocumentBuilder};
use crate::spy_store::SpyRecordStore;
use crate::stubs::{StubDeviceSource, StubWeatherSource};

pub type StubPipeline = Pipeline<StubDeviceSource, StubWeatherSource, SpyRecordStore>;

/// Fixed extraction time used by harness pipelines.
pub const FIXED_TIMESTAMP: i64 = 1_600_000_000;

pub struct TestHarness {
    pub device: StubDeviceSource,
    pub weather: StubWeatherSource,
    pub store: SpyRecordStore,
    expectations: Vec<Expectation>,
}

#[derive(Debug, Clone, Copy)]
enum Counter {
    DeviceCalls,
    WeatherCalls,
    Writes,
}

#[derive(Debug)]
struct Expectation {
    counter: Counter,
    expected: usize,
}

impl TestHarness {
    /// Single thermostat document, rich weather, empty spy store.
    pub fn new() -> Self {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
            .with_test_writer()
            .try_init()
            .ok();

        Self {
            device: StubDeviceSource::new(DocumentBuilder::single_thermostat().build()),
            weather: StubWeatherSource::rich(fixtures::rich_weather()),
            store: SpyRecordStore::new(),
            expectations: Vec::new(),
        }
    }

    pub fn with_device(mut self, device: StubDeviceSource) -> Self {
        self.device = device;
        self
    }

    pub fn with_weather(mut self, weather: StubWeatherSource) -> Self {
        self.weather = weather;
        self
    }

    /// Pipeline sharing this harness' stubs and store, stamped with [`FIXED_TIMESTAMP`].
    pub fn pipeline(&self) -> StubPipeline {
        Pipeline::new(self.device.clone(), Some(self.weather.clone()), self.store.clone()).with_clock(fixed_clock)
    }

    pub fn pipeline_without_weather(&self) -> StubPipeline {
        Pipeline::new(self.device.clone(), None, self.store.clone()).with_clock(fixed_clock)
    }

    pub fn expect_device_calls(&mut self, count: usize) -> &mut Self {
        self.expect(Counter::DeviceCalls, count)
    }

    pub fn expect_weather_calls(&mut self, count: usize) -> &mut Self {
        self.expect(Counter::WeatherCalls, count)
    }

    pub fn expect_writes(&mut self, count: usize) -> &mut Self {
        self.expect(Counter::Writes, count)
    }

    fn expect(&mut self, counter: Counter, expected: usize) -> &mut Self {
        self.expectations.push(Expectation { counter, expected });
        self
    }

    fn count(&self, counter: Counter) -> usize {
        match counter {
            Counter::DeviceCalls => self.device.calls(),
            Counter::WeatherCalls => self.weather.calls(),
            Counter::Writes => self.store.write_count(),
        }
    }

    pub fn verify_expectations(&self) -> Result<()> {
        tracing::info!("Verifying {} expectations...", self.expectations.len());

        for expectation in &self.expectations {
            let actual = self.count(expectation.counter);
            if actual != expectation.expected {
                anyhow::bail!(
                    "Expectation failed for {:?}: expected {}, got {}",
                    expectation.counter,
                    expectation.expected,
                    actual
                );
            }
        }
        Ok(())
    }

    /// Waits until the store has seen `count` writes.
    pub async fn wait_for_writes(&self, count: usize, timeout_ms: u64) -> Result<Vec<Record>> {
        let start = std::time::Instant::now();

        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if self.store.write_count() >= count {
                return Ok(self.store.writes());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        anyhow::bail!("Timeout waiting for {} writes, got {}", count, self.store.write_count());
    }

    fn last_write_json(&self) -> Result<Value> {
        let record = self.store.last_write().ok_or_else(|| anyhow::anyhow!("No record stored"))?;
        Ok(serde_json::to_value(record)?)
    }

    pub fn assert_field_exists(&self, field_path: &str) -> Result<()> {
        let last = self.last_write_json()?;
        if get_nested_field(&last, field_path).is_none() {
            anyhow::bail!("Field '{}' not found in last stored record", field_path);
        }
        Ok(())
    }

    pub fn assert_field_absent(&self, field_path: &str) -> Result<()> {
        let last = self.last_write_json()?;
        if let Some(value) = get_nested_field(&last, field_path) {
            anyhow::bail!("Field '{}' unexpectedly present with {:?}", field_path, value);
        }
        Ok(())
    }

    pub fn assert_field_equals(&self, field_path: &str, expected: &Value) -> Result<()> {
        let last = self.last_write_json()?;
        match get_nested_field(&last, field_path) {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => anyhow::bail!("Field '{}' mismatch: expected {:?}, got {:?}", field_path, expected, actual),
            None => anyhow::bail!("Field '{}' not found for comparison", field_path),
        }
    }

    pub fn get_stats(&self) -> TestStats {
        let mut writes_per_key = HashMap::new();
        for rec in self.store.writes() {
            let key = rec.timestamp().map_or_else(|| "<none>".to_string(), |ts| ts.to_string());
            *writes_per_key.entry(key).or_insert(0) += 1;
        }

        TestStats {
            device_calls: self.device.calls(),
            weather_calls: self.weather.calls(),
            write_attempts: self.store.attempts(),
            writes_per_key,
        }
    }

    /// Clears the store and expectations; stub counters keep running.
    pub fn reset(&mut self) {
        self.store.clear();
        self.expectations.clear();
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Dotted-path lookup (`a.b.c`) into a JSON value.
pub fn get_nested_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, part| current.as_object()?.get(part))
}

fn fixed_clock() -> i64 {
    FIXED_TIMESTAMP
}

#[derive(Debug)]
pub struct TestStats {
    pub device_calls: usize,
    pub weather_calls: usize,
    pub write_attempts: usize,
    pub writes_per_key: HashMap<String, usize>,
}

impl TestStats {
    pub fn print(&self) {
        println!("Test statistics:");
        println!("  Device calls: {}", self.device_calls);
        println!("  Weather calls: {}", self.weather_calls);
        println!("  Write attempts: {}", self.write_attempts);
        for (key, count) in &self.writes_per_key {
            println!("    {}: {} writes", key, count);
        }
    }
}

/// Declares a tokio test with a fresh [`TestHarness`] bound to `$harness`.
/// The body evaluates to `anyhow::Result<()>`.
#[macro_export]
macro_rules! collector_test {
    ($name:ident, |$harness:ident| $body:block) => {
        #[tokio::test]
        async fn $name() {
            #[allow(unused_mut)]
            let mut $harness = $crate::test_utils::TestHarness::new();
            let outcome: ::anyhow::Result<()> = async { $body }.await;

            match outcome {
                Ok(()) => $harness.get_stats().print(),
                Err(e) => panic!("Test '{}' failed: {}", stringify!($name), e),
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_harness_basic_functionality() {
        let mut harness = TestHarness::new();
        harness.expect_device_calls(1).expect_weather_calls(1).expect_writes(2);

        let record = harness.pipeline().run().await.unwrap();

        harness.verify_expectations().unwrap();
        harness.assert_field_equals("outsideTemperature", &json!(18.3)).unwrap();
        harness.assert_field_equals("timestamp", &json!(FIXED_TIMESTAMP)).unwrap();
        assert_eq!(harness.store.last_write(), Some(record));

        let stats = harness.get_stats();
        assert_eq!(stats.writes_per_key[&FIXED_TIMESTAMP.to_string()], 2);
    }

    #[test]
    fn test_nested_field_lookup() {
        let value = json!({"a": {"b": {"c": 1}}, "x": 2});
        assert_eq!(get_nested_field(&value, "a.b.c"), Some(&json!(1)));
        assert_eq!(get_nested_field(&value, "x"), Some(&json!(2)));
        assert!(get_nested_field(&value, "x.y").is_none());
    }

    collector_test!(test_macro_functionality, |harness| {
        harness.expect_writes(1);
        harness.pipeline_without_weather().run().await?;
        harness.verify_expectations()?;
        harness.assert_field_absent("outsideTemperature")?;
        harness.assert_field_exists("awayStatus")?;
        Ok(())
    });
}
