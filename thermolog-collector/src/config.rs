//! Collector configuration.
//!
//! Sources, lowest priority first:
//! - built-in defaults
//! - optional TOML file (`THERMOLOG_CONFIG`, default `thermolog.toml`)
//! - environment variables (a `.env` file is loaded by the binary)
//!
//! The result is validated once into an immutable [`CollectorConfig`].

use reqwest::Url;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{redact_endpoint, ConfigError};
use crate::weather::WeatherShape;

pub const DEFAULT_NEST_URL: &str = "https://developer-api.nest.com";
pub const DEFAULT_DARKSKY_URL: &str = "https://api.darksky.net";
pub const DEFAULT_YAHOO_URL: &str = "https://query.yahooapis.com";
pub const DEFAULT_WEATHER_TIMEOUT_MS: u64 = 1500;
pub const DEFAULT_CONFIG_FILE: &str = "thermolog.toml";

/// Unvalidated settings, as found in the TOML file or the environment.
/// Keys are the lowercase form of the environment variable names.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSettings {
    pub nest_api_url: Option<String>,
    pub access_token: Option<String>,
    pub weather_provider: Option<String>,
    pub weather_base_url: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub weather_timeout_ms: Option<String>,
    pub darksky_api_key: Option<String>,
    pub lat_long: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub latitude: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub longitude: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub yahoo_woeid: Option<String>,
    pub store_backend: Option<String>,
    pub store_region: Option<String>,
    pub table_name: Option<String>,
    pub store_dir: Option<String>,
    pub store_key_field: Option<String>,
    pub mqtt_host: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub mqtt_port: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub schedule_interval_secs: Option<String>,
}

/// Numbers in the TOML file are accepted and kept in their textual form.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<toml::Value>::deserialize(deserializer)?;
    Ok(value.map(|v| match v {
        toml::Value::String(s) => s,
        other => other.to_string(),
    }))
}

impl RawSettings {
    /// Parses the TOML file at `path`. A missing file yields empty settings.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let display = path.display().to_string();
        let txt = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        toml::from_str(&txt).map_err(|source| ConfigError::Parse { path: display, source })
    }

    /// Overrides every setting for which `lookup` returns a non-empty value.
    pub fn overlay_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let slots: [(&str, &mut Option<String>); 18] = [
            ("NEST_API_URL", &mut self.nest_api_url),
            ("ACCESS_TOKEN", &mut self.access_token),
            ("WEATHER_PROVIDER", &mut self.weather_provider),
            ("WEATHER_BASE_URL", &mut self.weather_base_url),
            ("WEATHER_TIMEOUT_MS", &mut self.weather_timeout_ms),
            ("DARKSKY_API_KEY", &mut self.darksky_api_key),
            ("LAT_LONG", &mut self.lat_long),
            ("LATITUDE", &mut self.latitude),
            ("LONGITUDE", &mut self.longitude),
            ("YAHOO_WOEID", &mut self.yahoo_woeid),
            ("STORE_BACKEND", &mut self.store_backend),
            ("STORE_REGION", &mut self.store_region),
            ("TABLE_NAME", &mut self.table_name),
            ("STORE_DIR", &mut self.store_dir),
            ("STORE_KEY_FIELD", &mut self.store_key_field),
            ("MQTT_HOST", &mut self.mqtt_host),
            ("MQTT_PORT", &mut self.mqtt_port),
            ("SCHEDULE_INTERVAL_SECS", &mut self.schedule_interval_secs),
        ];
        for (key, slot) in slots {
            if let Some(value) = get(key) {
                *slot = Some(value);
            }
        }
        self
    }
}

#[derive(Clone)]
pub struct DeviceConfig {
    pub url: String,
    pub access_token: String,
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("url", &self.url)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherProvider {
    DarkSky,
    Yahoo,
}

impl WeatherProvider {
    pub fn shape(self) -> WeatherShape {
        match self {
            WeatherProvider::DarkSky => WeatherShape::Rich,
            WeatherProvider::Yahoo => WeatherShape::Minimal,
        }
    }
}

#[derive(Clone)]
pub struct WeatherConfig {
    pub provider: WeatherProvider,
    /// Fully parameterized request URL (key and location included).
    pub endpoint: String,
    pub timeout: Duration,
}

impl fmt::Debug for WeatherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeatherConfig")
            .field("provider", &self.provider)
            .field("endpoint", &redact_endpoint(&self.endpoint))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    File { dir: PathBuf },
    Mqtt { host: String, port: u16 },
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub region: String,
    pub table: String,
    /// Record field whose value identifies the stored item.
    pub key_field: String,
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub device: DeviceConfig,
    /// `None` disables weather enrichment.
    pub weather: Option<WeatherConfig>,
    pub store: StoreConfig,
    /// `None` runs a single invocation.
    pub schedule_interval: Option<Duration>,
}

impl CollectorConfig {
    /// Loads the config file named by `THERMOLOG_CONFIG` and overlays the
    /// process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("THERMOLOG_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        let raw = RawSettings::from_file(Path::new(&path))?.overlay_env(|key| std::env::var(key).ok());
        Self::from_settings(raw)
    }

    pub fn from_settings(raw: RawSettings) -> Result<Self, ConfigError> {
        let device = DeviceConfig {
            url: raw.nest_api_url.clone().unwrap_or_else(|| DEFAULT_NEST_URL.into()),
            access_token: raw.access_token.clone().ok_or(ConfigError::Missing("ACCESS_TOKEN"))?,
        };

        let weather = Self::weather_from(&raw)?;

        let region = raw.store_region.clone().unwrap_or_else(|| "local".into());
        let table = raw.table_name.clone().unwrap_or_else(|| "nest-readings".into());
        for (key, value) in [("STORE_REGION", &region), ("TABLE_NAME", &table)] {
            if !is_safe_name(value) {
                return Err(ConfigError::Invalid { key, value: value.clone() });
            }
        }
        let backend = match raw.store_backend.as_deref().unwrap_or("file") {
            "file" => StoreBackend::File {
                dir: PathBuf::from(raw.store_dir.clone().unwrap_or_else(|| "./data".into())),
            },
            "mqtt" => StoreBackend::Mqtt {
                host: raw.mqtt_host.clone().unwrap_or_else(|| "localhost".into()),
                port: parse_number("MQTT_PORT", raw.mqtt_port.as_deref())?.unwrap_or(1883),
            },
            other => return Err(ConfigError::Invalid { key: "STORE_BACKEND", value: other.into() }),
        };
        let store = StoreConfig {
            backend,
            region,
            table,
            key_field: raw.store_key_field.clone().unwrap_or_else(|| crate::record::TIMESTAMP_FIELD.into()),
        };

        let schedule_interval = parse_number::<u64>("SCHEDULE_INTERVAL_SECS", raw.schedule_interval_secs.as_deref())?
            .map(|secs| {
                if secs == 0 {
                    Err(ConfigError::Invalid { key: "SCHEDULE_INTERVAL_SECS", value: "0".into() })
                } else {
                    Ok(Duration::from_secs(secs))
                }
            })
            .transpose()?;

        Ok(Self { device, weather, store, schedule_interval })
    }

    fn weather_from(raw: &RawSettings) -> Result<Option<WeatherConfig>, ConfigError> {
        let provider = match raw.weather_provider.as_deref() {
            Some("darksky") => WeatherProvider::DarkSky,
            Some("yahoo") => WeatherProvider::Yahoo,
            Some("none") => return Ok(None),
            Some(other) => return Err(ConfigError::Invalid { key: "WEATHER_PROVIDER", value: other.into() }),
            None if raw.darksky_api_key.is_some() => WeatherProvider::DarkSky,
            None => return Ok(None),
        };
        let timeout = Duration::from_millis(
            parse_number("WEATHER_TIMEOUT_MS", raw.weather_timeout_ms.as_deref())?.unwrap_or(DEFAULT_WEATHER_TIMEOUT_MS),
        );

        let endpoint = match provider {
            WeatherProvider::DarkSky => {
                let base = raw.weather_base_url.as_deref().unwrap_or(DEFAULT_DARKSKY_URL);
                let key = raw.darksky_api_key.as_deref().ok_or(ConfigError::Missing("DARKSKY_API_KEY"))?;
                let (lat, long) = coordinates(raw)?;
                format!("{}/forecast/{key}/{lat},{long}?units=si", base.trim_end_matches('/'))
            }
            WeatherProvider::Yahoo => {
                let base = raw.weather_base_url.as_deref().unwrap_or(DEFAULT_YAHOO_URL);
                let woeid = raw.yahoo_woeid.as_deref().ok_or(ConfigError::Missing("YAHOO_WOEID"))?;
                if !woeid.chars().all(|c| c.is_ascii_digit()) {
                    return Err(ConfigError::Invalid { key: "YAHOO_WOEID", value: woeid.into() });
                }
                let query = format!("select item.condition from weather.forecast where woeid={woeid} and u='c'");
                let url = format!("{}/v1/public/yql", base.trim_end_matches('/'));
                Url::parse_with_params(&url, &[("q", query.as_str()), ("format", "json")])
                    .map_err(|_| ConfigError::Invalid { key: "WEATHER_BASE_URL", value: base.into() })?
                    .to_string()
            }
        };

        Ok(Some(WeatherConfig { provider, endpoint, timeout }))
    }
}

/// Latitude/longitude from `LAT_LONG` ("lat,long") or the two separate keys.
fn coordinates(raw: &RawSettings) -> Result<(f64, f64), ConfigError> {
    let (lat, long) = match (&raw.lat_long, &raw.latitude, &raw.longitude) {
        (Some(pair), _, _) => pair
            .split_once(',')
            .map(|(a, b)| (a.trim().to_string(), b.trim().to_string()))
            .ok_or_else(|| ConfigError::Invalid { key: "LAT_LONG", value: pair.clone() })?,
        (None, Some(lat), Some(long)) => (lat.trim().to_string(), long.trim().to_string()),
        _ => return Err(ConfigError::Missing("LAT_LONG")),
    };
    let lat: f64 = parse_number("LATITUDE", Some(lat.as_str()))?.unwrap_or(f64::NAN);
    let long: f64 = parse_number("LONGITUDE", Some(long.as_str()))?.unwrap_or(f64::NAN);
    if !(-90.0..=90.0).contains(&lat) {
        return Err(ConfigError::Invalid { key: "LATITUDE", value: lat.to_string() });
    }
    if !(-180.0..=180.0).contains(&long) {
        return Err(ConfigError::Invalid { key: "LONGITUDE", value: long.to_string() });
    }
    Ok((lat, long))
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: Option<&str>) -> Result<Option<T>, ConfigError> {
    value
        .map(|v| v.trim().parse::<T>().map_err(|_| ConfigError::Invalid { key, value: v.to_string() }))
        .transpose()
}

/// Region and table names end up in file paths and MQTT topics.
fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
