//! Hourly index partitions and the document timestamp layout
//!
//! Documents already indexed by earlier publishers use these exact layouts,
//! so they must not change.

use chrono::{DateTime, Utc};

/// `2010-09-02-09:50:43.341 GMT`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H:%M:%S%.3f GMT";

/// Suffix appended to the base index, one partition per UTC hour
pub const PARTITION_FORMAT: &str = "%Y-%m-%d-%H";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Index name for the partition containing `at`
pub fn index_name(base: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}", base, at.format(PARTITION_FORMAT))
}

/// Source of "now" for a publisher; swapped in tests to pin the partition
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
