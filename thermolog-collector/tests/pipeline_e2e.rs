use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use thermolog_collector::trigger::{self, Completion};
use thermolog_collector::{CollectorError, JsonFileStore, Pipeline, Record, RecordStore, Stage};
use thermolog_devkit::fixtures::{self, DocumentBuilder, THERMOSTAT_ID};
use thermolog_devkit::test_utils::FIXED_TIMESTAMP;
use thermolog_devkit::{collector_test, StubDeviceSource, StubReply, StubWeatherSource, TestHarness};

collector_test!(weather_failure_after_first_persist, |harness| {
    harness.weather.set_reply(StubReply::Timeout(Duration::from_millis(1500)));
    harness.expect_device_calls(1).expect_weather_calls(1).expect_writes(1);

    let invocation = harness.pipeline().invoke().await;

    anyhow::ensure!(!invocation.succeeded(), "weather timeout must fail the run");
    anyhow::ensure!(invocation.last_step() == Some(Stage::FetchWeather));
    harness.verify_expectations()?;
    // base reading made it to storage without weather fields
    harness.assert_field_equals("humidity", &json!(55))?;
    harness.assert_field_absent("outsideTemperature")?;
    Ok(())
});

collector_test!(full_run_overwrites_base_reading, |harness| {
    harness.expect_writes(2);

    let record = harness.pipeline().run().await?;

    harness.verify_expectations()?;
    let writes = harness.store.writes();
    anyhow::ensure!(writes[0].timestamp() == writes[1].timestamp());
    // same key: the enriched item replaces the base one
    let table = harness.store.table();
    anyhow::ensure!(table.len() == 1);
    anyhow::ensure!(table[&FIXED_TIMESTAMP.to_string()] == record);

    for (field, value) in [
        ("outsideTemperature", json!(18.3)),
        ("weatherConditions", json!("Clear")),
        ("outsideHumidity", json!(0.5)),
        ("apparentTemperature", json!(17.9)),
        ("windSpeed", json!(3.1)),
        ("cloudCover", json!(0.1)),
        ("dewPoint", json!(9.2)),
        ("thermostatId", json!(THERMOSTAT_ID)),
        ("awayStatus", json!("home")),
        ("hasLeaf", json!(false)),
        ("heatingState", json!("heating")),
        ("timeToTarget", json!("~0")),
    ] {
        harness.assert_field_equals(field, &value)?;
    }
    Ok(())
});

collector_test!(device_failure_writes_nothing, |harness| {
    harness.device.set_reply(StubReply::Status(401));
    harness.expect_weather_calls(0).expect_writes(0);

    let err = harness.pipeline().run().await.err().ok_or_else(|| anyhow::anyhow!("run succeeded"))?;

    anyhow::ensure!(matches!(err, CollectorError::Fetch(_)));
    harness.verify_expectations()?;
    Ok(())
});

collector_test!(second_persist_failure_is_reported, |harness| {
    harness.store.fail_on_call(2);

    let invocation = harness.pipeline().invoke().await;

    anyhow::ensure!(invocation.last_step() == Some(Stage::Persist2));
    anyhow::ensure!(matches!(invocation.outcome, Err(CollectorError::Persistence(_))));
    anyhow::ensure!(harness.store.attempts() == 2);
    anyhow::ensure!(harness.store.write_count() == 1);
    Ok(())
});

collector_test!(minimal_weather_enrichment, |harness| {
    harness.weather = StubWeatherSource::minimal(fixtures::minimal_weather("21", "Cloudy"));

    harness.pipeline().run().await?;

    harness.assert_field_equals("weatherConditions", &json!("Cloudy"))?;
    harness.assert_field_equals("outsideTemperature", &json!(21))?;
    harness.assert_field_absent("windSpeed")?;
    harness.reset();
    anyhow::ensure!(harness.store.write_count() == 0);
    Ok(())
});

collector_test!(missing_device_properties_stay_absent, |harness| {
    let doc = DocumentBuilder::single_thermostat()
        .without_thermostat_property(THERMOSTAT_ID, "target_temperature_c")
        .build();
    harness.device.set_reply(StubReply::Document(doc));

    harness.pipeline_without_weather().run().await?;

    harness.assert_field_absent("targetTemperature")?;
    harness.assert_field_equals("ambientTemperature", &json!(20.5))?;
    Ok(())
});

#[tokio::test]
async fn completion_callback_fires_once_per_run() {
    let harness = TestHarness::new();
    let pipeline = harness.pipeline();

    let mut completions = Vec::new();
    trigger::handle(&pipeline, |c| completions.push(c)).await;
    harness.weather.set_reply(StubReply::Status(500));
    trigger::handle(&pipeline, |c| completions.push(c)).await;

    assert_eq!(completions.len(), 2);
    match &completions[0] {
        Completion::Succeeded { result } => {
            let stored: Record = serde_json::from_str(result).unwrap();
            assert_eq!(stored.get("name"), Some(&json!("Living Room (5F9F)")));
        }
        other => panic!("unexpected completion {other:?}"),
    }
    match &completions[1] {
        Completion::Failed { error } => assert!(error.contains("500"), "{error}"),
        other => panic!("unexpected completion {other:?}"),
    }
}

#[tokio::test]
async fn overlapping_runs_are_independent() {
    let harness = TestHarness::new();
    harness.device.set_delay(Duration::from_millis(50));
    let pipeline = Arc::new(harness.pipeline());

    let runs: Vec<_> = (0..3)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.run().await.is_ok() })
        })
        .collect();
    for run in runs {
        assert!(run.await.unwrap());
    }

    let writes = harness.wait_for_writes(6, 1000).await.unwrap();
    assert_eq!(writes.len(), 6);
    assert_eq!(harness.device.calls(), 3);
    // all runs share the fixed timestamp, the table holds one item
    assert_eq!(harness.store.table().len(), 1);
}

#[tokio::test]
async fn file_store_holds_latest_reading() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(dir.path(), "local", "nest-readings", "timestamp").await.unwrap();
    let pipeline = Pipeline::new(
        StubDeviceSource::new(DocumentBuilder::single_thermostat().build()),
        Some(StubWeatherSource::rich(fixtures::rich_weather())),
        store,
    )
    .with_clock(|| 1_700_000_000);

    let record = pipeline.run().await.unwrap();

    assert_eq!(pipeline.store().len(), 1);
    assert_eq!(pipeline.store().get("1700000000"), Some(record.clone()));

    let on_disk = std::fs::read_to_string(dir.path().join("local/nest-readings.json")).unwrap();
    let table: serde_json::Value = serde_json::from_str(&on_disk).unwrap();
    assert_eq!(table["1700000000"]["outsideTemperature"], json!(18.3));

    // a second write with the same key replaces the item
    pipeline.store().upsert(&record.clone().merge(Record::from_iter([("humidity".to_string(), json!(60))]))).await.unwrap();
    assert_eq!(pipeline.store().len(), 1);
    assert_eq!(pipeline.store().get("1700000000").unwrap().get("humidity"), Some(&json!(60)));
}
