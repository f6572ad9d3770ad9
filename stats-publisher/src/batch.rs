//! Fixed-size chunking for bulk writes

use crate::error::ConfigError;
use std::num::NonZeroUsize;

pub const DEFAULT_BATCH_SIZE: usize = 200;

/// Maximum number of documents per bulk request, validated at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSize(NonZeroUsize);

impl BatchSize {
    pub fn new(size: usize) -> Result<Self, ConfigError> {
        NonZeroUsize::new(size)
            .map(BatchSize)
            .ok_or_else(|| ConfigError::invalid("elastic.max_bulk_docs", "must be greater than zero"))
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl Default for BatchSize {
    fn default() -> Self {
        BatchSize(NonZeroUsize::new(DEFAULT_BATCH_SIZE).expect("default batch size is non-zero"))
    }
}

impl TryFrom<i64> for BatchSize {
    type Error = ConfigError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        let size = usize::try_from(value)
            .map_err(|_| ConfigError::invalid("elastic.max_bulk_docs", format!("{value} is negative")))?;
        BatchSize::new(size)
    }
}

/// Lazy iterator over consecutive chunks of at most `size` items
pub struct Batches<I> {
    inner: I,
    size: usize,
}

impl<I: Iterator> Iterator for Batches<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch: Vec<_> = self.inner.by_ref().take(self.size).collect();
        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }
}

/// Split `items` into batches, preserving order; the last batch may be smaller
pub fn batches<T>(items: T, size: BatchSize) -> Batches<T::IntoIter>
where
    T: IntoIterator,
{
    Batches {
        inner: items.into_iter(),
        size: size.get(),
    }
}
