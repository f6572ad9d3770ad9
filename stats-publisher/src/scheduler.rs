//! Periodic trigger for publishing
//!
//! Two timers, one for metrics and one for counters. Each tick collects from
//! a `StatsSource` and spawns the publish as its own task, so a slow backend
//! never delays the next tick and overlapping publishes stay independent.

use crate::counters::Counter;
use crate::documents::MetricsSnapshot;
use crate::error::ConfigError;
use crate::publisher::StatsPublisher;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// Where the numbers come from; implemented by the hosting process
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn metrics(&self) -> anyhow::Result<MetricsSnapshot>;

    async fn counters(&self) -> Vec<Counter>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishSchedule {
    pub metrics_interval: Duration,
    pub stats_interval: Duration,
}

impl PublishSchedule {
    pub fn new(metrics_secs: u64, stats_secs: u64) -> Result<Self, ConfigError> {
        Self::from_durations(Duration::from_secs(metrics_secs), Duration::from_secs(stats_secs))
    }

    pub fn from_durations(metrics_interval: Duration, stats_interval: Duration) -> Result<Self, ConfigError> {
        if metrics_interval.is_zero() {
            return Err(ConfigError::invalid("schedule.metrics_interval_secs", "must be greater than zero"));
        }
        if stats_interval.is_zero() {
            return Err(ConfigError::invalid("schedule.stats_interval_secs", "must be greater than zero"));
        }
        Ok(Self {
            metrics_interval,
            stats_interval,
        })
    }
}

/// Tally of finished publish tasks, returned when the scheduler stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub metrics_published: usize,
    pub metrics_failed: usize,
    pub counters_published: usize,
    pub counters_failed: usize,
}

enum Outcome {
    Metrics(bool),
    Counters(bool),
}

pub struct Scheduler<S, P> {
    source: Arc<S>,
    publisher: Arc<P>,
    schedule: PublishSchedule,
}

impl<S, P> Scheduler<S, P>
where
    S: StatsSource + 'static,
    P: StatsPublisher + 'static,
{
    pub fn new(source: Arc<S>, publisher: Arc<P>, schedule: PublishSchedule) -> Self {
        Self {
            source,
            publisher,
            schedule,
        }
    }

    /// Publish on every tick until `shutdown` resolves, then wait for in-flight publishes
    pub async fn run<F>(self, shutdown: F) -> RunReport
    where
        F: Future<Output = ()>,
    {
        info!(
            "Starting publish loop (metrics every {:?}, counters every {:?})",
            self.schedule.metrics_interval, self.schedule.stats_interval
        );

        let mut metrics_timer = interval(self.schedule.metrics_interval);
        let mut stats_timer = interval(self.schedule.stats_interval);
        metrics_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        stats_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut in_flight: JoinSet<Outcome> = JoinSet::new();
        let mut report = RunReport::default();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,

                _ = metrics_timer.tick() => {
                    in_flight.spawn(publish_metrics_once(self.source.clone(), self.publisher.clone()));
                }

                _ = stats_timer.tick() => {
                    in_flight.spawn(publish_counters_once(self.source.clone(), self.publisher.clone()));
                }

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    record(&mut report, joined);
                }
            }
        }

        debug!("Shutdown requested, waiting for {} in-flight publishes", in_flight.len());
        while let Some(joined) = in_flight.join_next().await {
            record(&mut report, joined);
        }

        info!("Publish loop stopped: {:?}", report);
        report
    }
}

fn record(report: &mut RunReport, joined: Result<Outcome, tokio::task::JoinError>) {
    match joined {
        Ok(Outcome::Metrics(true)) => report.metrics_published += 1,
        Ok(Outcome::Metrics(false)) => report.metrics_failed += 1,
        Ok(Outcome::Counters(true)) => report.counters_published += 1,
        Ok(Outcome::Counters(false)) => report.counters_failed += 1,
        Err(e) => error!("Publish task aborted: {}", e),
    }
}

async fn publish_metrics_once<S: StatsSource, P: StatsPublisher>(source: Arc<S>, publisher: Arc<P>) -> Outcome {
    let snapshot = match source.metrics().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!("Failed to collect metrics: {:#}", e);
            return Outcome::Metrics(false);
        }
    };

    match publisher.publish_metrics(&snapshot).await {
        Ok(()) => Outcome::Metrics(true),
        Err(e) => {
            error!(retryable = e.is_retryable(), "Failed to publish metrics: {}", e);
            Outcome::Metrics(false)
        }
    }
}

async fn publish_counters_once<S: StatsSource, P: StatsPublisher>(source: Arc<S>, publisher: Arc<P>) -> Outcome {
    let counters = source.counters().await;

    match publisher.publish_counters(&counters).await {
        Ok(_) => Outcome::Counters(true),
        Err(e) => {
            error!(retryable = e.is_retryable(), "Failed to publish counters: {}", e);
            Outcome::Counters(false)
        }
    }
}
