//! Publishing metrics and counters to the statistics index
//!
//! - `publish_metrics`: one document, written to the current hourly index
//! - `publish_counters`: counter documents, written in bulk batches
//!
//! No retries happen here: errors are logged and returned, and the caller
//! decides whether the next cycle should try again. Items rejected inside a
//! successful bulk request are logged and reported in `BulkSummary` only.

use crate::batch::{batches, BatchSize};
use crate::context::PublisherContext;
use crate::counters::Counter;
use crate::documents::{map_counters, CounterDocument, MetricsDocument, MetricsSnapshot};
use crate::error::{ConfigError, PublishError, PublishResult};
use crate::index::{index_name, Clock, SystemClock};
use chrono::{DateTime, Utc};
use crate::transport::{IndexTransport, TransportResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const DEFAULT_INDEX: &str = "orleans_statistics";
pub const DEFAULT_METRICS_TYPE: &str = "silo_metrics";
pub const DEFAULT_STATS_TYPE: &str = "silo_stats";

/// The two capabilities a scheduler needs from a statistics sink
#[async_trait]
pub trait StatsPublisher: Send + Sync {
    async fn publish_metrics(&self, snapshot: &MetricsSnapshot) -> PublishResult<()>;

    async fn publish_counters(&self, counters: &[Counter]) -> PublishResult<BulkSummary>;
}

/// Where documents go: base index, document types and bulk limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSettings {
    pub index: String,
    pub metrics_type: String,
    pub stats_type: String,
    pub batch_size: BatchSize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            index: DEFAULT_INDEX.to_string(),
            metrics_type: DEFAULT_METRICS_TYPE.to_string(),
            stats_type: DEFAULT_STATS_TYPE.to_string(),
            batch_size: BatchSize::default(),
        }
    }
}

impl IndexSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index.trim().is_empty() {
            return Err(ConfigError::Missing("elastic.index"));
        }
        if self.index.chars().any(|c| c.is_ascii_uppercase() || c.is_whitespace() || "\\/*?\"<>|,#".contains(c)) {
            return Err(ConfigError::invalid(
                "elastic.index",
                format!("'{}' is not a valid index name", self.index),
            ));
        }
        if self.metrics_type.trim().is_empty() {
            return Err(ConfigError::Missing("elastic.metrics_type"));
        }
        if self.stats_type.trim().is_empty() {
            return Err(ConfigError::Missing("elastic.stats_type"));
        }
        Ok(())
    }
}

/// A bulk item the backend refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedItem {
    pub statistic: String,
    pub status: u16,
    pub message: String,
}

/// Outcome of a `publish_counters` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkSummary {
    pub requests: usize,
    pub submitted: usize,
    pub rejected: Vec<RejectedItem>,
}

impl BulkSummary {
    pub fn indexed(&self) -> usize {
        self.submitted.saturating_sub(self.rejected.len())
    }

    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

pub struct ElasticPublisher<T> {
    context: Arc<PublisherContext>,
    transport: T,
    settings: IndexSettings,
    clock: Arc<dyn Clock>,
}

impl<T: IndexTransport> ElasticPublisher<T> {
    pub fn new(context: Arc<PublisherContext>, transport: T, settings: IndexSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            context,
            transport,
            settings,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn context(&self) -> &PublisherContext {
        &self.context
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    /// Write one metrics document to the hourly index of `at`
    pub async fn publish_metrics_document(&self, document: &MetricsDocument, at: DateTime<Utc>) -> PublishResult<()> {
        let index = index_name(&self.settings.index, at);
        let body = serde_json::to_string(document)?;

        let response = self
            .transport
            .index_document(&index, &self.settings.metrics_type, body)
            .await
            .inspect_err(|e| warn!("Metrics publish to {} failed: {}", index, e))?;

        if !response.is_success() {
            let message = server_error_message(&response);
            error!(status = response.status, index = %index, "Metrics document rejected: {}", message);
            return Err(PublishError::Backend {
                status: response.status,
                message,
            });
        }

        debug!("Metrics document indexed into {}", index);
        Ok(())
    }

    /// Bulk-write counter documents to the hourly index of `at`, one request per batch, in order
    pub async fn publish_counter_documents(
        &self,
        documents: Vec<CounterDocument>,
        at: DateTime<Utc>,
    ) -> PublishResult<BulkSummary> {
        let mut summary = BulkSummary::default();
        if documents.is_empty() {
            debug!("No counters to publish");
            return Ok(summary);
        }

        let index = index_name(&self.settings.index, at);

        for batch in batches(documents, self.settings.batch_size) {
            let body = bulk_body(&index, &self.settings.stats_type, &batch)?;

            let response = self
                .transport
                .bulk(body)
                .await
                .inspect_err(|e| warn!("Counter bulk publish to {} failed: {}", index, e))?;
            summary.requests += 1;
            summary.submitted += batch.len();

            if !response.is_success() {
                let message = server_error_message(&response);
                error!(status = response.status, index = %index, "Bulk request rejected: {}", message);
                return Err(PublishError::Backend {
                    status: response.status,
                    message,
                });
            }

            let rejected = rejected_items(&response, &batch)?;
            for item in &rejected {
                error!(
                    status = item.status,
                    statistic = %item.statistic,
                    "Bulk item rejected by backend: {}",
                    item.message
                );
            }
            summary.rejected.extend(rejected);
        }

        if summary.is_complete() {
            debug!("Indexed {} counters into {} in {} requests", summary.submitted, index, summary.requests);
        } else {
            warn!(
                "Indexed {}/{} counters into {}; {} rejected",
                summary.indexed(),
                summary.submitted,
                index,
                summary.rejected.len()
            );
        }
        Ok(summary)
    }
}

#[async_trait]
impl<T: IndexTransport> StatsPublisher for ElasticPublisher<T> {
    async fn publish_metrics(&self, snapshot: &MetricsSnapshot) -> PublishResult<()> {
        debug!(
            "publish_metrics for {} ({})",
            self.context.node_name(),
            self.context.node_id()
        );
        let at = self.clock.now();
        let document = MetricsDocument::from_snapshot(&self.context, snapshot, at)?;
        self.publish_metrics_document(&document, at).await
    }

    async fn publish_counters(&self, counters: &[Counter]) -> PublishResult<BulkSummary> {
        debug!(
            "publish_counters with {} counters for {} ({})",
            counters.len(),
            self.context.node_name(),
            self.context.node_id()
        );
        let at = self.clock.now();
        let documents = map_counters(&self.context, counters, at)?;
        let summary = self.publish_counter_documents(documents, at).await?;
        if summary.requests > 0 {
            info!("Published {} counters in {} bulk requests", summary.indexed(), summary.requests);
        }
        Ok(summary)
    }
}

#[derive(Serialize)]
struct BulkAction<'a> {
    create: BulkTarget<'a>,
}

#[derive(Serialize)]
struct BulkTarget<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_type")]
    doc_type: &'a str,
}

/// NDJSON body for a bulk `create` of every document, trailing newline included
pub fn bulk_body<D: Serialize>(index: &str, doc_type: &str, documents: &[D]) -> Result<String, serde_json::Error> {
    let action = serde_json::to_string(&BulkAction {
        create: BulkTarget { index, doc_type },
    })?;

    let mut body = String::new();
    for document in documents {
        body.push_str(&action);
        body.push('\n');
        body.push_str(&serde_json::to_string(document)?);
        body.push('\n');
    }
    Ok(body)
}

#[derive(Debug, Deserialize)]
struct ServerErrorBody {
    error: Option<Value>,
}

/// Best-effort human message out of an error response
fn server_error_message(response: &TransportResponse) -> String {
    serde_json::from_str::<ServerErrorBody>(&response.body)
        .ok()
        .and_then(|b| b.error)
        .map(|e| error_cause_message(&e))
        .unwrap_or_else(|| {
            let body = response.body.trim();
            if body.is_empty() {
                format!("HTTP {}", response.status)
            } else {
                body.chars().take(512).collect()
            }
        })
}

fn error_cause_message(cause: &Value) -> String {
    match cause {
        Value::String(s) => s.clone(),
        Value::Object(obj) => {
            let kind = obj.get("type").and_then(Value::as_str);
            let reason = obj.get("reason").and_then(Value::as_str);
            match (kind, reason) {
                (Some(k), Some(r)) => format!("{k}: {r}"),
                (None, Some(r)) => r.to_string(),
                (Some(k), None) => k.to_string(),
                (None, None) => cause.to_string(),
            }
        }
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct BulkResponseBody {
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItemBody>>,
}

#[derive(Debug, Deserialize)]
struct BulkItemBody {
    #[serde(default)]
    status: u16,
    error: Option<Value>,
}

fn rejected_items(response: &TransportResponse, batch: &[CounterDocument]) -> PublishResult<Vec<RejectedItem>> {
    let parsed: BulkResponseBody = serde_json::from_str(&response.body)
        .map_err(|e| PublishError::Response(format!("invalid bulk response: {e}")))?;

    if !parsed.errors {
        return Ok(Vec::new());
    }
    if parsed.items.len() != batch.len() {
        return Err(PublishError::Response(format!(
            "bulk response has {} items for {} documents",
            parsed.items.len(),
            batch.len()
        )));
    }

    let mut rejected = Vec::new();
    for (position, item) in parsed.items.iter().enumerate() {
        // each item is keyed by its action name ("create")
        let Some(result) = item.values().next() else { continue };
        if let Some(cause) = &result.error {
            rejected.push(RejectedItem {
                statistic: batch
                    .get(position)
                    .map(|d| d.statistic.clone())
                    .unwrap_or_default(),
                status: result.status,
                message: error_cause_message(cause),
            });
        }
    }

    if rejected.is_empty() {
        rejected.push(RejectedItem {
            statistic: String::new(),
            status: response.status,
            message: "bulk response flagged errors without item details".to_string(),
        });
    }
    Ok(rejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> TransportResponse {
        TransportResponse { status, body: body.to_string() }
    }

    fn doc(statistic: &str) -> CounterDocument {
        CounterDocument {
            identity: "n".into(),
            deployment_id: "d".into(),
            name: "silo".into(),
            host_name: "h".into(),
            address: "a".into(),
            is_silo: true,
            statistic: statistic.into(),
            stat_value: "1".into(),
            is_delta: false,
            time: "2024-01-02-15:04:05.678 GMT".into(),
        }
    }

    #[test]
    fn test_bulk_body_layout() {
        let body = bulk_body("stats-2024-01-02-15", "silo_stats", &[doc("A"), doc("B")]).unwrap();
        let lines: Vec<&str> = body.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(body.ends_with('\n'));
        assert_eq!(
            lines[0],
            r#"{"create":{"_index":"stats-2024-01-02-15","_type":"silo_stats"}}"#
        );
        let second: Value = serde_json::from_str(lines[3]).unwrap();
        assert_eq!(second["statistic"], "B");
    }

    #[test]
    fn test_server_error_message_variants() {
        let structured = response(400, r#"{"error":{"type":"mapper_parsing_exception","reason":"failed to parse"},"status":400}"#);
        assert_eq!(server_error_message(&structured), "mapper_parsing_exception: failed to parse");

        let plain = response(404, r#"{"error":"no such index","status":404}"#);
        assert_eq!(server_error_message(&plain), "no such index");

        let html = response(502, "<html>Bad Gateway</html>");
        assert_eq!(server_error_message(&html), "<html>Bad Gateway</html>");

        let empty = response(503, "");
        assert_eq!(server_error_message(&empty), "HTTP 503");
    }

    #[test]
    fn test_rejected_items_mapped_to_statistics() {
        let body = r#"{"took":3,"errors":true,"items":[
            {"create":{"_index":"i","status":201}},
            {"create":{"_index":"i","status":400,"error":{"type":"mapper_parsing_exception","reason":"bad value"}}}
        ]}"#;
        let rejected = rejected_items(&response(200, body), &[doc("A"), doc("B")]).unwrap();
        assert_eq!(
            rejected,
            vec![RejectedItem {
                statistic: "B".into(),
                status: 400,
                message: "mapper_parsing_exception: bad value".into(),
            }]
        );
    }

    #[test]
    fn test_clean_bulk_has_no_rejections() {
        let body = r#"{"took":1,"errors":false,"items":[{"create":{"status":201}}]}"#;
        assert!(rejected_items(&response(200, body), &[doc("A")]).unwrap().is_empty());
    }

    #[test]
    fn test_item_count_mismatch_is_malformed() {
        let body = r#"{"took":3,"errors":true,"items":[
            {"create":{"status":400,"error":"a"}},
            {"create":{"status":400,"error":"b"}},
            {"create":{"status":400,"error":"c"}}
        ]}"#;
        let err = rejected_items(&response(200, body), &[doc("A"), doc("B")]).unwrap_err();
        assert!(matches!(err, PublishError::Response(_)));
    }

    #[test]
    fn test_indexed_never_underflows() {
        let summary = BulkSummary {
            requests: 1,
            submitted: 1,
            rejected: vec![
                RejectedItem { statistic: "A".into(), status: 400, message: "x".into() },
                RejectedItem { statistic: "B".into(), status: 400, message: "y".into() },
            ],
        };
        assert_eq!(summary.indexed(), 0);
    }

    #[test]
    fn test_malformed_bulk_response() {
        let err = rejected_items(&response(200, "not json"), &[doc("A")]).unwrap_err();
        assert!(matches!(err, PublishError::Response(_)));
    }

    #[test]
    fn test_settings_validation() {
        assert!(IndexSettings::default().validate().is_ok());

        let upper = IndexSettings { index: "Orleans".into(), ..Default::default() };
        assert!(matches!(upper.validate(), Err(ConfigError::Invalid { .. })));

        let no_type = IndexSettings { stats_type: "".into(), ..Default::default() };
        assert!(matches!(no_type.validate(), Err(ConfigError::Missing("elastic.stats_type"))));
    }
}
