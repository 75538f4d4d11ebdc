//! Entry point used by schedulers: one run, one completion.

use serde::Serialize;

use crate::fetch::{DeviceSource, WeatherSource};
use crate::pipeline::Pipeline;
use crate::store::RecordStore;

/// What the caller of a run gets back: the stored reading or the error,
/// without the stage that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "status")]
pub enum Completion {
    Succeeded { result: String },
    Failed { error: String },
}

impl Completion {
    pub fn is_success(&self) -> bool {
        matches!(self, Completion::Succeeded { .. })
    }
}

/// Runs one invocation and hands its outcome to `callback`, exactly once.
pub async fn handle<D, W, S, F>(pipeline: &Pipeline<D, W, S>, callback: F)
where
    D: DeviceSource,
    W: WeatherSource,
    S: RecordStore,
    F: FnOnce(Completion),
{
    let completion = match pipeline.run().await {
        Ok(record) => match record.to_json() {
            Ok(result) => Completion::Succeeded { result },
            Err(e) => Completion::Failed { error: e.to_string() },
        },
        Err(e) => Completion::Failed { error: e.to_string() },
    };
    callback(completion);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_completion_json() {
        let ok = Completion::Succeeded { result: "{\"humidity\":40}".into() };
        assert!(ok.is_success());
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"status": "succeeded", "result": "{\"humidity\":40}"})
        );

        let failed = Completion::Failed { error: "fetch failed: boom".into() };
        assert!(!failed.is_success());
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"status": "failed", "error": "fetch failed: boom"})
        );
    }
}
