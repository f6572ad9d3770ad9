//! Stats Publisher - periodic statistics shipping to an Elasticsearch index
//!
//! Turns node performance metrics and named counters into flat, timestamped
//! documents and writes them into hourly index partitions:
//! - single-document writes for metrics
//! - batched bulk writes for counters, tolerating per-item rejections
//! - explicit error kinds so callers can decide whether to retry

pub mod batch;
pub mod config;
pub mod context;
pub mod counters;
pub mod discovery;
pub mod documents;
pub mod error;
pub mod index;
pub mod logging;
pub mod metrics;
pub mod publisher;
pub mod scheduler;
pub mod transport;

pub use batch::{batches, BatchSize};
pub use config::PublisherConfig;
pub use context::{NodeRole, PublisherContext};
pub use counters::{Counter, CounterKind, CounterRegistry, CounterStorage};
pub use documents::{CounterDocument, MetricsDocument, MetricsSnapshot};
pub use error::{ConfigError, MappingError, PublishError, PublishResult};
pub use publisher::{BulkSummary, ElasticPublisher, IndexSettings, RejectedItem, StatsPublisher};
pub use scheduler::{PublishSchedule, Scheduler, StatsSource};
pub use transport::{HttpTransport, IndexTransport, TransportResponse};
