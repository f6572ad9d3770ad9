/*!
# Stats DevKit - stubs and helpers for publisher tests

- Mock indexing backend, no Elasticsearch node needed
- Fixtures for contexts, snapshots, counters and backend answers
- Log capture and a ready-made test harness
*/

pub mod mock_backend;
pub mod fixtures;
pub mod test_utils;

pub use mock_backend::{MockTransport, RecordedRequest, RequestKind};
pub use test_utils::{LogCapture, TestHarness};
