/*!
# Thermolog DevKit - Stubs and test utilities

Helps testing the collector without any remote API or real store:
- Stub device and weather sources with call counters
- Spy record store keeping every write
- Device and weather document fixtures
- Test harness wiring them into a pipeline
*/

pub mod fixtures;
pub mod spy_store;
pub mod stubs;
pub mod test_utils;

pub use fixtures::DocumentBuilder;
pub use spy_store::SpyRecordStore;
pub use stubs::{StubDeviceSource, StubReply, StubWeatherSource};
pub use test_utils::TestHarness;
