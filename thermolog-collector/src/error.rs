use std::time::Duration;

/// Remote call failures (device API or weather API).
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {endpoint} timed out after {}ms", .after.as_millis())]
    Timeout { endpoint: String, after: Duration },
    #[error("request to {endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid JSON from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout { .. })
    }

    /// Maps a reqwest failure, keeping timeouts distinct.
    pub(crate) fn from_reqwest(endpoint: &str, err: reqwest::Error, timeout: Option<Duration>) -> Self {
        let endpoint = endpoint.to_string();
        let err = err.without_url();
        match timeout {
            Some(after) if err.is_timeout() => FetchError::Timeout { endpoint, after },
            _ if err.is_decode() => FetchError::Decode { endpoint, message: err.to_string() },
            _ => match err.status() {
                Some(status) => FetchError::Status { endpoint, status: status.as_u16() },
                None => FetchError::Transport { endpoint, source: err },
            },
        }
    }
}

/// Store write failures.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("record has no `{0}` field to key the item on")]
    MissingKey(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("MQTT client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),
    #[error("broker did not acknowledge write to {topic} within {}ms", .after.as_millis())]
    NotAcknowledged { topic: String, after: Duration },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Anything that stops an invocation.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("persist failed: {0}")]
    Persistence(#[from] PersistenceError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Scheme and host of `url`, dropping path and query (API keys live there).
pub fn redact_endpoint(url: &str) -> String {
    let (scheme, rest) = match url.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, url),
    };
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    match scheme {
        Some(scheme) => format!("{scheme}://{host}"),
        None => host.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_endpoint() {
        assert_eq!(
            redact_endpoint("https://api.darksky.net/forecast/SECRET/52.1,4.3?units=si"),
            "https://api.darksky.net"
        );
        assert_eq!(redact_endpoint("http://127.0.0.1:8080"), "http://127.0.0.1:8080");
        assert_eq!(redact_endpoint("example.com/path?q=1"), "example.com");
    }

    #[test]
    fn test_error_messages() {
        let err = CollectorError::from(FetchError::Timeout {
            endpoint: "https://api.darksky.net".into(),
            after: Duration::from_millis(1500),
        });
        assert_eq!(err.to_string(), "fetch failed: request to https://api.darksky.net timed out after 1500ms");

        let err = FetchError::Status { endpoint: "https://developer-api.nest.com".into(), status: 401 };
        assert!(!err.is_timeout());
        assert!(err.to_string().contains("401"));
    }
}
