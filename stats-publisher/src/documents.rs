//! Flat, timestamped documents built from metrics snapshots and counters
//!
//! Field names are serialized camelCase to stay compatible with documents
//! already present in the statistics indices.

use crate::context::PublisherContext;
use crate::counters::{Counter, CounterStorage};
use crate::error::MappingError;
use crate::index::format_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Performance figures of one node at one instant
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub cpu_usage: f64,
    pub total_physical_memory: i64,
    pub available_physical_memory: i64,
    pub memory_usage: i64,
    pub send_queue_length: i32,
    pub receive_queue_length: i32,
    pub request_queue_length: i32,
    pub sent_messages: i64,
    pub received_messages: i64,
    pub activation_count: i32,
    pub recently_used_activation_count: i32,
    pub is_overloaded: bool,
    pub client_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsDocument {
    pub silo_id: String,
    pub silo_name: String,
    pub deployment_id: String,
    pub is_silo: bool,
    pub address: String,
    pub host_name: String,
    pub gateway_address: String,
    pub cpu_usage: f64,
    pub total_physical_memory: i64,
    pub available_physical_memory: i64,
    pub memory_usage: i64,
    pub send_queue_length: i32,
    pub receive_queue_length: i32,
    pub sent_messages: i64,
    pub received_messages: i64,
    pub activations_count: i32,
    pub recently_used_activations: i32,
    pub request_queue_length: i32,
    pub is_overloaded: bool,
    pub client_count: i64,
    pub time: String,
}

impl MetricsDocument {
    pub fn from_snapshot(
        ctx: &PublisherContext,
        snapshot: &MetricsSnapshot,
        at: DateTime<Utc>,
    ) -> Result<Self, MappingError> {
        if !snapshot.cpu_usage.is_finite() {
            return Err(MappingError::NonFinite { field: "cpuUsage" });
        }

        Ok(MetricsDocument {
            silo_id: ctx.node_id().to_string(),
            silo_name: ctx.node_name().to_string(),
            deployment_id: ctx.deployment_id().to_string(),
            is_silo: ctx.role().is_silo(),
            address: ctx.address().to_string(),
            host_name: ctx.host_name().to_string(),
            gateway_address: ctx.gateway_address().to_string(),
            cpu_usage: snapshot.cpu_usage,
            total_physical_memory: snapshot.total_physical_memory,
            available_physical_memory: snapshot.available_physical_memory,
            memory_usage: snapshot.memory_usage,
            send_queue_length: snapshot.send_queue_length,
            receive_queue_length: snapshot.receive_queue_length,
            sent_messages: snapshot.sent_messages,
            received_messages: snapshot.received_messages,
            activations_count: snapshot.activation_count,
            recently_used_activations: snapshot.recently_used_activation_count,
            request_queue_length: snapshot.request_queue_length,
            is_overloaded: snapshot.is_overloaded,
            client_count: snapshot.client_count,
            time: format_timestamp(at),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterDocument {
    pub identity: String,
    pub deployment_id: String,
    pub name: String,
    pub host_name: String,
    pub address: String,
    pub is_silo: bool,
    pub statistic: String,
    pub stat_value: String,
    pub is_delta: bool,
    pub time: String,
}

impl CounterDocument {
    pub fn from_counter(
        ctx: &PublisherContext,
        counter: &Counter,
        time: &str,
    ) -> Result<Self, MappingError> {
        if counter.name.trim().is_empty() {
            return Err(MappingError::EmptyCounterName);
        }

        Ok(CounterDocument {
            identity: ctx.node_id().to_string(),
            deployment_id: ctx.deployment_id().to_string(),
            name: ctx.node_name().to_string(),
            host_name: ctx.host_name().to_string(),
            address: ctx.address().to_string(),
            is_silo: ctx.role().is_silo(),
            statistic: counter.name.clone(),
            stat_value: counter.reported_value().to_string(),
            is_delta: counter.is_value_delta,
            time: time.to_string(),
        })
    }
}

/// Map the publishable counters, sorted by name so batch contents are deterministic.
/// Counters not stored as `LogAndTable` are dropped.
pub fn map_counters(
    ctx: &PublisherContext,
    counters: &[Counter],
    at: DateTime<Utc>,
) -> Result<Vec<CounterDocument>, MappingError> {
    let time = format_timestamp(at);

    let mut publishable: Vec<&Counter> = counters
        .iter()
        .filter(|c| c.storage == CounterStorage::LogAndTable)
        .collect();
    publishable.sort_by(|a, b| a.name.cmp(&b.name));

    publishable
        .into_iter()
        .map(|c| CounterDocument::from_counter(ctx, c, &time))
        .collect()
}
