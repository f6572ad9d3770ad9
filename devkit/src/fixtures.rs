/*!
Fixtures for publisher tests

Sample contexts, snapshots and counters, plus canned backend answers
shaped like real Elasticsearch responses.
*/

use chrono::{DateTime, Duration, TimeZone, Utc};
use stats_publisher::{Counter, MetricsSnapshot, NodeRole, PublisherContext};

/// 2024-01-02T15:04:05.678Z
pub fn fixed_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 15, 4, 5).unwrap() + Duration::milliseconds(678)
}

pub fn sample_context() -> PublisherContext {
    PublisherContext::builder()
        .deployment_id("test-deployment")
        .node_id("S127.0.0.1:11111:1")
        .role(NodeRole::Silo)
        .node_name("silo-test")
        .address("127.0.0.1:11111")
        .gateway_address("127.0.0.1:30000")
        .host_name("test-host")
        .build()
        .expect("sample context is complete")
}

pub fn sample_snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        cpu_usage: 23.5,
        total_physical_memory: 16_000_000_000,
        available_physical_memory: 6_000_000_000,
        memory_usage: 420_000_000,
        send_queue_length: 2,
        receive_queue_length: 1,
        request_queue_length: 4,
        sent_messages: 1_200,
        received_messages: 1_150,
        activation_count: 310,
        recently_used_activation_count: 42,
        is_overloaded: false,
        client_count: 3,
    }
}

/// `count` publishable counters named `Stat.0000`, `Stat.0001`, ... in reverse order
pub fn counters(count: usize) -> Vec<Counter> {
    (0..count)
        .rev()
        .map(|i| Counter::absolute(format!("Stat.{i:04}"), i))
        .collect()
}

pub mod responses {
    use serde_json::json;

    pub fn created() -> String {
        json!({"_index": "test", "_type": "silo_metrics", "_id": "1", "result": "created"}).to_string()
    }

    pub fn bulk_ok(items: usize) -> String {
        let items: Vec<_> = (0..items)
            .map(|_| json!({"create": {"_index": "test", "status": 201}}))
            .collect();
        json!({"took": 1, "errors": false, "items": items}).to_string()
    }

    /// Bulk answer where the items at `rejected` positions failed with `status`
    pub fn bulk_partial(items: usize, rejected: &[usize], status: u16, kind: &str, reason: &str) -> String {
        let items: Vec<_> = (0..items)
            .map(|i| {
                if rejected.contains(&i) {
                    json!({"create": {
                        "_index": "test",
                        "status": status,
                        "error": {"type": kind, "reason": reason}
                    }})
                } else {
                    json!({"create": {"_index": "test", "status": 201}})
                }
            })
            .collect();
        json!({"took": 2, "errors": true, "items": items}).to_string()
    }

    pub fn server_error(status: u16, kind: &str, reason: &str) -> String {
        json!({"error": {"type": kind, "reason": reason}, "status": status}).to_string()
    }
}
