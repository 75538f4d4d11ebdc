//! Remote sources: thermostat state and outdoor weather.
//!
//! Both are plain `GET` + JSON decode, no retry. The weather client is tuned
//! for latency: short overall timeout, no response compression and no
//! pooled keep-alive connections.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONNECTION};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::{DeviceConfig, WeatherConfig};
use crate::error::{redact_endpoint, FetchError};
use crate::weather::WeatherShape;

/// Source of the raw thermostat document.
#[async_trait]
pub trait DeviceSource: Send + Sync {
    async fn fetch_device(&self) -> Result<Value, FetchError>;
}

/// Source of the raw weather document.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Payload layout returned by this source.
    fn shape(&self) -> WeatherShape;

    async fn fetch_weather(&self) -> Result<Value, FetchError>;
}

/// Thermostat API client authenticated with a bearer token.
#[derive(Clone)]
pub struct HttpDeviceFetcher {
    client: Client,
    url: String,
    access_token: String,
}

impl HttpDeviceFetcher {
    pub fn new(config: &DeviceConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &DeviceConfig) -> Self {
        Self {
            client,
            url: config.url.clone(),
            access_token: config.access_token.clone(),
        }
    }

    /// `GET url` with `Authorization: Bearer <token>`, decoded as JSON.
    pub async fn fetch(&self, url: &str, access_token: &str) -> Result<Value, FetchError> {
        let request = self.client.get(url).bearer_auth(access_token).header(ACCEPT, "application/json");
        get_json(request, url, None).await
    }
}

#[async_trait]
impl DeviceSource for HttpDeviceFetcher {
    async fn fetch_device(&self) -> Result<Value, FetchError> {
        self.fetch(&self.url, &self.access_token).await
    }
}

/// Weather API client for a preconfigured endpoint.
#[derive(Clone)]
pub struct HttpWeatherFetcher {
    client: Client,
    endpoint: String,
    shape: WeatherShape,
    timeout: Duration,
}

impl HttpWeatherFetcher {
    pub fn new(config: &WeatherConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .no_gzip()
            .no_brotli()
            .no_deflate()
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|err| FetchError::Transport {
                endpoint: redact_endpoint(&config.endpoint),
                source: err,
            })?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            shape: config.provider.shape(),
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl WeatherSource for HttpWeatherFetcher {
    fn shape(&self) -> WeatherShape {
        self.shape
    }

    async fn fetch_weather(&self) -> Result<Value, FetchError> {
        let request = self
            .client
            .get(&self.endpoint)
            .header(ACCEPT, "application/json")
            .header(CONNECTION, "close");
        get_json(request, &self.endpoint, Some(self.timeout)).await
    }
}

async fn get_json(
    request: reqwest::RequestBuilder,
    url: &str,
    timeout: Option<Duration>,
) -> Result<Value, FetchError> {
    let endpoint = redact_endpoint(url);
    let response = request
        .send()
        .await
        .map_err(|err| FetchError::from_reqwest(&endpoint, err, timeout))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status { endpoint, status: status.as_u16() });
    }
    debug!("{} answered {}", endpoint, status);

    response
        .json::<Value>()
        .await
        .map_err(|err| FetchError::from_reqwest(&endpoint, err, timeout))
}
