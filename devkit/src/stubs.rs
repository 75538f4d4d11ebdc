/*!
Stub remote sources

Stand-ins for the device and weather APIs. Each stub is cheap to clone and
clones share state, so a test can hand one copy to a pipeline and keep the
other to change replies or count calls.
*/

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thermolog_collector::{DeviceSource, FetchError, WeatherShape, WeatherSource};

/// Canned answer of a stub source.
#[derive(Debug, Clone)]
pub enum StubReply {
    Document(Value),
    Status(u16),
    Timeout(Duration),
    Decode(String),
}

impl StubReply {
    fn into_result(self, endpoint: &str) -> Result<Value, FetchError> {
        let endpoint = endpoint.to_string();
        match self {
            StubReply::Document(doc) => Ok(doc),
            StubReply::Status(status) => Err(FetchError::Status { endpoint, status }),
            StubReply::Timeout(after) => Err(FetchError::Timeout { endpoint, after }),
            StubReply::Decode(message) => Err(FetchError::Decode { endpoint, message }),
        }
    }
}

#[derive(Clone)]
struct StubState {
    reply: Arc<Mutex<StubReply>>,
    delay: Arc<Mutex<Option<Duration>>>,
    calls: Arc<AtomicUsize>,
}

impl StubState {
    fn new(reply: StubReply) -> Self {
        Self {
            reply: Arc::new(Mutex::new(reply)),
            delay: Arc::new(Mutex::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    async fn answer(&self, endpoint: &str) -> Result<Value, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.reply.lock().clone();
        tracing::debug!("[STUB] {} -> {:?}", endpoint, reply);
        reply.into_result(endpoint)
    }
}

/// Device API stub.
#[derive(Clone)]
pub struct StubDeviceSource {
    state: StubState,
}

impl StubDeviceSource {
    pub fn new(document: Value) -> Self {
        Self { state: StubState::new(StubReply::Document(document)) }
    }

    pub fn failing(status: u16) -> Self {
        Self { state: StubState::new(StubReply::Status(status)) }
    }

    pub fn set_reply(&self, reply: StubReply) {
        *self.state.reply.lock() = reply;
    }

    /// Every call sleeps `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceSource for StubDeviceSource {
    async fn fetch_device(&self) -> Result<Value, FetchError> {
        self.state.answer("stub://device").await
    }
}

/// Weather API stub answering with a fixed payload shape.
#[derive(Clone)]
pub struct StubWeatherSource {
    shape: WeatherShape,
    state: StubState,
}

impl StubWeatherSource {
    pub fn new(shape: WeatherShape, document: Value) -> Self {
        Self { shape, state: StubState::new(StubReply::Document(document)) }
    }

    pub fn rich(document: Value) -> Self {
        Self::new(WeatherShape::Rich, document)
    }

    pub fn minimal(document: Value) -> Self {
        Self::new(WeatherShape::Minimal, document)
    }

    /// Always fails the way the real client does when its bound is exceeded.
    pub fn timing_out(after: Duration) -> Self {
        Self { shape: WeatherShape::Rich, state: StubState::new(StubReply::Timeout(after)) }
    }

    pub fn set_reply(&self, reply: StubReply) {
        *self.state.reply.lock() = reply;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeatherSource for StubWeatherSource {
    fn shape(&self) -> WeatherShape {
        self.shape
    }

    async fn fetch_weather(&self) -> Result<Value, FetchError> {
        self.state.answer("stub://weather").await
    }
}
