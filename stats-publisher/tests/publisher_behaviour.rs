use chrono::{DateTime, Duration, TimeZone, Utc};
use stats_devkit::fixtures::{self, responses};
use stats_devkit::{LogCapture, MockTransport, RequestKind, TestHarness};
use stats_publisher::batch::BatchSize;
use stats_publisher::index::Clock;
use stats_publisher::{
    Counter, CounterStorage, ElasticPublisher, IndexSettings, MetricsSnapshot, PublishError, StatsPublisher,
};
use std::error::Error as _;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Clock that moves forward one millisecond every time it is read
struct TickingClock {
    start: DateTime<Utc>,
    reads: AtomicI64,
}

impl TickingClock {
    fn starting_at(start: DateTime<Utc>) -> Self {
        Self { start, reads: AtomicI64::new(0) }
    }
}

impl Clock for TickingClock {
    fn now(&self) -> DateTime<Utc> {
        self.start + Duration::milliseconds(self.reads.fetch_add(1, Ordering::SeqCst))
    }
}

fn last_millisecond_of_hour() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 15, 59, 59).unwrap() + Duration::milliseconds(999)
}

fn ticking_publisher(transport: &MockTransport) -> ElasticPublisher<MockTransport> {
    ElasticPublisher::new(Arc::new(fixtures::sample_context()), transport.clone(), IndexSettings::default())
        .unwrap()
        .with_clock(TickingClock::starting_at(last_millisecond_of_hour()))
}

#[tokio::test]
async fn test_metrics_document_written_to_hourly_index() {
    let harness = TestHarness::new();

    harness
        .publisher
        .publish_metrics(&fixtures::sample_snapshot())
        .await
        .unwrap();

    let requests = harness.transport.requests_of(RequestKind::Document);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].index.as_deref(), Some("orleans_statistics-2024-01-02-15"));
    assert_eq!(requests[0].doc_type.as_deref(), Some("silo_metrics"));

    let doc = &requests[0].json_lines().unwrap()[0];
    assert_eq!(doc["deploymentId"], "test-deployment");
    assert_eq!(doc["siloId"], "S127.0.0.1:11111:1");
    assert_eq!(doc["time"], "2024-01-02-15:04:05.678 GMT");
    assert_eq!(doc["activationsCount"], 310);
}

#[tokio::test]
async fn test_metrics_connection_failure_propagates() {
    let harness = TestHarness::new();
    harness
        .transport
        .fail_with(std::io::ErrorKind::ConnectionRefused, "connection refused");

    let err = harness
        .publisher
        .publish_metrics(&fixtures::sample_snapshot())
        .await
        .unwrap_err();

    assert!(matches!(err, PublishError::Transport(_)));
    assert!(err.is_retryable());
    let cause = err.source().unwrap().downcast_ref::<std::io::Error>().unwrap();
    assert_eq!(cause.kind(), std::io::ErrorKind::ConnectionRefused);
    assert!(harness.logs.has_line_with(&["WARN", "connection refused"]));
}

#[tokio::test]
async fn test_metrics_backend_error_is_logged_and_returned() {
    let harness = TestHarness::new();
    harness
        .transport
        .respond_with(401, responses::server_error(401, "security_exception", "missing authentication credentials"));

    let err = harness
        .publisher
        .publish_metrics(&fixtures::sample_snapshot())
        .await
        .unwrap_err();

    match &err {
        PublishError::Backend { status, message } => {
            assert_eq!(*status, 401);
            assert_eq!(message, "security_exception: missing authentication credentials");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!err.is_retryable());
    assert!(harness
        .logs
        .has_line_with(&["ERROR", "status=401", "missing authentication credentials"]));
}

#[tokio::test]
async fn test_invalid_snapshot_fails_before_sending() {
    let harness = TestHarness::new();
    let snapshot = MetricsSnapshot {
        cpu_usage: f64::INFINITY,
        ..fixtures::sample_snapshot()
    };

    let err = harness.publisher.publish_metrics(&snapshot).await.unwrap_err();

    assert!(matches!(err, PublishError::Mapping(_)));
    assert_eq!(harness.transport.request_count(), 0);
}

#[tokio::test]
async fn test_counters_split_into_sorted_batches() {
    let settings = IndexSettings {
        batch_size: BatchSize::new(4).unwrap(),
        ..Default::default()
    };
    let harness = TestHarness::with_settings(settings);

    let summary = harness.publisher.publish_counters(&fixtures::counters(10)).await.unwrap();

    assert_eq!(summary.requests, 3);
    assert_eq!(summary.submitted, 10);
    assert!(summary.is_complete());

    let bulks = harness.transport.requests_of(RequestKind::Bulk);
    let sizes: Vec<usize> = bulks.iter().map(|b| b.bulk_documents().unwrap().len()).collect();
    assert_eq!(sizes, vec![4, 4, 2]);

    let names: Vec<String> = bulks
        .iter()
        .flat_map(|b| b.bulk_documents().unwrap())
        .map(|d| d["statistic"].as_str().unwrap().to_string())
        .collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);

    let action = &bulks[0].bulk_actions().unwrap()[0];
    assert_eq!(action["create"]["_index"], "orleans_statistics-2024-01-02-15");
    assert_eq!(action["create"]["_type"], "silo_stats");
}

#[tokio::test]
async fn test_only_log_and_table_counters_published() {
    let harness = TestHarness::new();
    let counters = vec![
        Counter::absolute("Kept.B", 2),
        Counter::absolute("Dropped.Log", 3).with_storage(CounterStorage::LogOnly),
        Counter::delta("Kept.A", 10, 1),
        Counter::absolute("Dropped.None", 4).with_storage(CounterStorage::DontStore),
    ];

    let summary = harness.publisher.publish_counters(&counters).await.unwrap();

    assert_eq!(summary.submitted, 2);
    let docs = harness.transport.requests()[0].bulk_documents().unwrap();
    assert_eq!(docs[0]["statistic"], "Kept.A");
    assert_eq!(docs[0]["statValue"], "1");
    assert_eq!(docs[0]["isDelta"], true);
    assert_eq!(docs[1]["statistic"], "Kept.B");
}

#[tokio::test]
async fn test_partial_bulk_failure_completes_and_logs() {
    let harness = TestHarness::new();
    harness.transport.respond_with(
        200,
        responses::bulk_partial(3, &[1], 400, "mapper_parsing_exception", "failed to parse field [statValue]"),
    );

    let summary = harness.publisher.publish_counters(&fixtures::counters(3)).await.unwrap();

    assert_eq!(summary.submitted, 3);
    assert_eq!(summary.indexed(), 2);
    assert_eq!(summary.rejected.len(), 1);
    assert_eq!(summary.rejected[0].status, 400);
    assert_eq!(summary.rejected[0].statistic, "Stat.0001");
    assert!(harness
        .logs
        .has_line_with(&["ERROR", "status=400", "failed to parse field [statValue]"]));
}

#[tokio::test]
async fn test_partial_failure_does_not_stop_later_batches() {
    let settings = IndexSettings {
        batch_size: BatchSize::new(2).unwrap(),
        ..Default::default()
    };
    let harness = TestHarness::with_settings(settings);
    harness
        .transport
        .respond_with(200, responses::bulk_partial(2, &[0, 1], 429, "es_rejected_execution_exception", "queue full"));

    let summary = harness.publisher.publish_counters(&fixtures::counters(5)).await.unwrap();

    assert_eq!(summary.requests, 3);
    assert_eq!(summary.rejected.len(), 2);
    assert_eq!(summary.indexed(), 3);
    assert_eq!(harness.transport.request_count(), 3);
}

#[tokio::test]
async fn test_rejected_bulk_request_raises() {
    let harness = TestHarness::new();
    harness
        .transport
        .respond_with(503, responses::server_error(503, "cluster_block_exception", "blocked by: [SERVICE_UNAVAILABLE]"));

    let err = harness.publisher.publish_counters(&fixtures::counters(2)).await.unwrap_err();

    assert!(matches!(err, PublishError::Backend { status: 503, .. }));
    assert!(err.is_retryable());
    assert!(harness.logs.has_line_with(&["ERROR", "status=503"]));
}

#[tokio::test]
async fn test_malformed_bulk_response_raises() {
    let harness = TestHarness::new();
    harness.transport.respond_with(200, "<html>proxy</html>");

    let err = harness.publisher.publish_counters(&fixtures::counters(1)).await.unwrap_err();

    assert!(matches!(err, PublishError::Response(_)));
}

#[tokio::test]
async fn test_bulk_transport_failure_propagates() {
    let harness = TestHarness::new();
    harness
        .transport
        .fail_with(std::io::ErrorKind::TimedOut, "operation timed out");

    let err = harness.publisher.publish_counters(&fixtures::counters(3)).await.unwrap_err();

    let cause = err.source().unwrap().downcast_ref::<std::io::Error>().unwrap();
    assert_eq!(cause.kind(), std::io::ErrorKind::TimedOut);
}

#[tokio::test]
async fn test_empty_counter_list_sends_nothing() {
    let harness = TestHarness::new();

    let summary = harness.publisher.publish_counters(&[]).await.unwrap();

    assert_eq!(summary.requests, 0);
    assert_eq!(harness.transport.request_count(), 0);
}

#[tokio::test]
async fn test_index_follows_the_clock_hour() {
    let harness = TestHarness::at(Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap());
    harness.publisher.publish_counters(&fixtures::counters(1)).await.unwrap();

    let action = &harness.transport.requests()[0].bulk_actions().unwrap()[0];
    assert_eq!(action["create"]["_index"], "orleans_statistics-2023-12-31-23");
}

#[tokio::test]
async fn test_metrics_index_matches_document_time_across_hour_boundary() {
    let logs = LogCapture::new();
    let _guard = logs.install();
    let transport = MockTransport::new();

    ticking_publisher(&transport)
        .publish_metrics(&fixtures::sample_snapshot())
        .await
        .unwrap();

    let request = &transport.requests()[0];
    let doc = &request.json_lines().unwrap()[0];
    assert_eq!(doc["time"], "2024-01-02-15:59:59.999 GMT");
    assert_eq!(request.index.as_deref(), Some("orleans_statistics-2024-01-02-15"));
}

#[tokio::test]
async fn test_counter_index_matches_document_time_across_hour_boundary() {
    let logs = LogCapture::new();
    let _guard = logs.install();
    let transport = MockTransport::new();

    ticking_publisher(&transport)
        .publish_counters(&fixtures::counters(2))
        .await
        .unwrap();

    let request = &transport.requests()[0];
    for doc in request.bulk_documents().unwrap() {
        assert_eq!(doc["time"], "2024-01-02-15:59:59.999 GMT");
    }
    for action in request.bulk_actions().unwrap() {
        assert_eq!(action["create"]["_index"], "orleans_statistics-2024-01-02-15");
    }
}

#[tokio::test]
async fn test_bulk_answer_with_extra_items_is_malformed() {
    let harness = TestHarness::new();
    harness.transport.respond_with(
        200,
        responses::bulk_partial(3, &[0, 1, 2], 400, "mapper_parsing_exception", "bad value"),
    );

    let err = harness.publisher.publish_counters(&fixtures::counters(2)).await.unwrap_err();

    assert!(matches!(err, PublishError::Response(_)));
    assert!(!err.is_retryable());
}
