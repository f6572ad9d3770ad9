/*!
Test harness for the statistics publisher

Wires an `ElasticPublisher` to a `MockTransport`, pins its clock, and
captures log output so tests can assert on what was reported.
*/

use crate::fixtures::{fixed_instant, sample_context};
use crate::mock_backend::MockTransport;
use chrono::{DateTime, Utc};
use stats_publisher::index::FixedClock;
use stats_publisher::{ElasticPublisher, IndexSettings};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

/// Buffer receiving formatted log lines, usable as a tracing writer
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route the current thread's logs into this buffer until the guard drops
    pub fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).to_string()
    }

    pub fn lines_at(&self, level: &str) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|l| l.contains(level))
            .map(str::to_string)
            .collect()
    }

    /// Whether a single line contains every fragment
    pub fn has_line_with(&self, fragments: &[&str]) -> bool {
        self.contents()
            .lines()
            .any(|line| fragments.iter().all(|f| line.contains(f)))
    }

    pub fn clear(&self) {
        self.buffer.lock().unwrap().clear();
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Publisher wired to a mock backend with a pinned clock and captured logs
pub struct TestHarness {
    pub transport: MockTransport,
    pub logs: LogCapture,
    pub publisher: ElasticPublisher<MockTransport>,
    _log_guard: DefaultGuard,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_settings(IndexSettings::default())
    }

    pub fn with_settings(settings: IndexSettings) -> Self {
        Self::build(settings, fixed_instant())
    }

    pub fn at(instant: DateTime<Utc>) -> Self {
        Self::build(IndexSettings::default(), instant)
    }

    fn build(settings: IndexSettings, instant: DateTime<Utc>) -> Self {
        let logs = LogCapture::new();
        let guard = logs.install();
        let transport = MockTransport::new();
        let publisher = ElasticPublisher::new(Arc::new(sample_context()), transport.clone(), settings)
            .expect("harness settings are valid")
            .with_clock(FixedClock(instant));

        Self {
            transport,
            logs,
            publisher,
            _log_guard: guard,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
