//! Named counters and an in-process registry to record them
//!
//! A `Counter` is what gets published: name, storage mode, and either the
//! current value or the delta since the previous report.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use tracing::debug;

/// Where a counter is meant to end up; only `LogAndTable` counters are published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterStorage {
    DontStore,
    LogOnly,
    LogAndTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    /// Reported as the current value
    Absolute,
    /// Reported as the change since the previous snapshot
    Delta,
}

/// Point-in-time reading of a named counter
#[derive(Debug, Clone, PartialEq)]
pub struct Counter {
    pub name: String,
    pub storage: CounterStorage,
    pub is_value_delta: bool,
    pub value: String,
    pub delta: String,
}

impl Counter {
    pub fn absolute(name: impl Into<String>, value: impl ToString) -> Self {
        let value = value.to_string();
        Self {
            name: name.into(),
            storage: CounterStorage::LogAndTable,
            is_value_delta: false,
            delta: value.clone(),
            value,
        }
    }

    pub fn delta(name: impl Into<String>, value: impl ToString, delta: impl ToString) -> Self {
        Self {
            name: name.into(),
            storage: CounterStorage::LogAndTable,
            is_value_delta: true,
            value: value.to_string(),
            delta: delta.to_string(),
        }
    }

    pub fn with_storage(mut self, storage: CounterStorage) -> Self {
        self.storage = storage;
        self
    }

    /// The string that goes into the published document
    pub fn reported_value(&self) -> &str {
        if self.is_value_delta {
            &self.delta
        } else {
            &self.value
        }
    }
}

/// Handle returned by the registry; cheap to clone and share across tasks
#[derive(Debug, Clone)]
pub struct CounterHandle {
    inner: Arc<CounterCell>,
}

#[derive(Debug)]
struct CounterCell {
    name: String,
    storage: CounterStorage,
    kind: CounterKind,
    current: AtomicI64,
    last_reported: AtomicI64,
}

impl CounterHandle {
    pub fn increment(&self, by: i64) {
        self.inner.current.fetch_add(by, Ordering::Relaxed);
    }

    pub fn set(&self, value: i64) {
        self.inner.current.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.inner.current.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

/// Registry of all counters of the process
#[derive(Debug, Clone, Default)]
pub struct CounterRegistry {
    counters: Arc<Mutex<Vec<CounterHandle>>>,
}

impl CounterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a counter, or return the existing handle with the same name
    pub fn register(&self, name: &str, storage: CounterStorage, kind: CounterKind) -> CounterHandle {
        let mut counters = self.counters.lock();
        if let Some(existing) = counters.iter().find(|c| c.inner.name == name) {
            return existing.clone();
        }

        debug!("Registering counter {} ({:?}, {:?})", name, storage, kind);
        let handle = CounterHandle {
            inner: Arc::new(CounterCell {
                name: name.to_string(),
                storage,
                kind,
                current: AtomicI64::new(0),
                last_reported: AtomicI64::new(0),
            }),
        };
        counters.push(handle.clone());
        handle
    }

    pub fn len(&self) -> usize {
        self.counters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read every counter; delta counters advance their report mark
    pub fn snapshot(&self) -> Vec<Counter> {
        let counters = self.counters.lock();
        counters
            .iter()
            .map(|handle| {
                let cell = &handle.inner;
                let current = cell.current.load(Ordering::Relaxed);
                let counter = match cell.kind {
                    CounterKind::Absolute => Counter::absolute(cell.name.clone(), current),
                    CounterKind::Delta => {
                        let previous = cell.last_reported.swap(current, Ordering::Relaxed);
                        Counter::delta(cell.name.clone(), current, current - previous)
                    }
                };
                counter.with_storage(cell.storage)
            })
            .collect()
    }
}
