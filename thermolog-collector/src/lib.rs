//! Thermostat + outdoor weather collector.
//!
//! Fetches the thermostat state, flattens it into a [`Record`], stores it,
//! enriches it with the current weather and stores it again.

pub mod config;
pub mod document;
pub mod error;
pub mod extractor;
pub mod fetch;
pub mod pipeline;
pub mod record;
pub mod store;
pub mod trigger;
pub mod weather;

pub use config::CollectorConfig;
pub use error::{CollectorError, ConfigError, FetchError, PersistenceError};
pub use fetch::{DeviceSource, HttpDeviceFetcher, HttpWeatherFetcher, WeatherSource};
pub use pipeline::{Invocation, Pipeline, Stage};
pub use record::Record;
pub use store::{JsonFileStore, MqttStore, RecordStore, Store};
pub use trigger::Completion;
pub use weather::{WeatherReport, WeatherShape};
