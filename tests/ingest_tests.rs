// Ingestion pipeline tests: window, end-to-end write, overwrite, error propagation

mod common;

use chrono::Duration;
use common::{BUCKET, INSTANCE_ID, ingestion_fixture, point, ts};
use instance_metrics::backends::memory::{
    MemoryInstanceDirectory, MemoryMetricsStore, MemoryObjectStore,
};
use instance_metrics::ingest::IngestionPipeline;
use instance_metrics::ingest::fetcher::{CPU_ID, NETWORK_IN_ID, NETWORK_OUT_ID, fetch_window};
use instance_metrics::models::{ObjectRef, Statistic, Unit};
use std::sync::Arc;

#[test]
fn window_start_is_launch_time_for_young_instance() {
    let now = ts("2025-03-10T12:34:56Z");
    let launch = ts("2025-03-10T09:34:56Z");
    let window = fetch_window(now, launch, Duration::hours(24));
    assert_eq!(window.end, ts("2025-03-10T12:34:00Z"));
    assert_eq!(window.start, ts("2025-03-10T09:34:00Z"));
}

#[test]
fn window_start_is_lookback_for_old_instance() {
    let now = ts("2025-03-10T12:34:56Z");
    let launch = ts("2024-01-01T00:00:00Z");
    let window = fetch_window(now, launch, Duration::hours(24));
    assert_eq!(window.start, ts("2025-03-09T12:34:00Z"));
    assert_eq!(window.end, ts("2025-03-10T12:34:00Z"));
}

#[test]
fn window_start_never_precedes_launch() {
    let now = ts("2025-03-10T12:00:30Z");
    for hours_ago in [0i64, 1, 3, 23, 24, 25, 100] {
        let launch = ts("2025-03-10T12:00:00Z") - Duration::hours(hours_ago);
        let window = fetch_window(now, launch, Duration::hours(24));
        assert!(window.start >= launch, "launch {} hours ago", hours_ago);
        assert!(window.start >= window.end - Duration::hours(24));
    }
}

#[tokio::test]
async fn run_writes_partitioned_csv_and_summary() {
    let fx = ingestion_fixture(ts("2025-03-01T00:00:00Z")).await;
    fx.metrics
        .insert_series(
            CPU_ID,
            vec![
                point("2025-03-10T12:05:00Z", 12.5),
                point("2025-03-10T12:00:00Z", 12.0),
            ],
        )
        .await;
    fx.metrics
        .insert_series(
            NETWORK_IN_ID,
            vec![
                point("2025-03-10T12:00:00Z", 1024.0),
                point("2025-03-10T12:10:00Z", 2048.75),
            ],
        )
        .await;
    fx.metrics
        .insert_series(NETWORK_OUT_ID, vec![point("2025-03-10T12:05:00Z", 512.0)])
        .await;

    let summary = fx.pipeline.run_at(ts("2025-03-10T12:34:56Z")).await.unwrap();

    assert_eq!(summary.status, "ok");
    assert_eq!(summary.s3_key, "ec2-metrics/2025/03/10/instance-i-0abc123.csv");
    assert_eq!(summary.period_seconds, 300);
    assert_eq!(summary.window_start, "2025-03-09T12:34:00+00:00");
    assert_eq!(summary.window_end, "2025-03-10T12:34:00+00:00");
    assert_eq!(summary.datapoints.timestamps, 3);
    assert_eq!(summary.datapoints.cpu, 2);
    assert_eq!(summary.datapoints.network_in, 2);
    assert_eq!(summary.datapoints.network_out, 1);

    let stored = fx
        .objects
        .object(&ObjectRef::new(BUCKET, summary.s3_key.clone()))
        .await
        .expect("csv written");
    assert_eq!(stored.content_type, "text/csv");
    assert_eq!(
        std::str::from_utf8(&stored.body).unwrap(),
        "timestamp,cpu_percent,network_in_bytes,network_out_bytes\n\
         2025-03-10T12:00:00+00:00,12,1024,\n\
         2025-03-10T12:05:00+00:00,12.500,,512\n\
         2025-03-10T12:10:00+00:00,,2048.750,\n"
    );
}

#[tokio::test]
async fn summary_serializes_with_expected_field_names() {
    let fx = ingestion_fixture(ts("2025-03-01T00:00:00Z")).await;
    let summary = fx.pipeline.run_at(ts("2025-03-10T12:34:56Z")).await.unwrap();
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["datapoints"]["timestamps"], 0);
    assert!(json["datapoints"]["network_in"].is_number());
    assert_eq!(json["s3_key"], "ec2-metrics/2025/03/10/instance-i-0abc123.csv");
    assert_eq!(json["period_seconds"], 300);
    assert!(json["window_start"].is_string());
    assert!(json["window_end"].is_string());
}

#[tokio::test]
async fn requests_three_series_with_configured_period() {
    let fx = ingestion_fixture(ts("2025-03-10T09:00:00Z")).await;
    fx.pipeline.run_at(ts("2025-03-10T12:34:56Z")).await.unwrap();

    let requests = fx.metrics.requests().await;
    assert_eq!(requests.len(), 1, "one batched metrics call per run");
    let (queries, window) = &requests[0];
    assert_eq!(window.start, ts("2025-03-10T09:00:00Z"));
    assert_eq!(window.end, ts("2025-03-10T12:34:00Z"));

    let summary: Vec<(&str, &str, Statistic, Unit)> = queries
        .iter()
        .map(|q| (q.id, q.metric_name, q.stat, q.unit))
        .collect();
    assert_eq!(
        summary,
        vec![
            (CPU_ID, "CPUUtilization", Statistic::Average, Unit::Percent),
            (NETWORK_IN_ID, "NetworkIn", Statistic::Sum, Unit::Bytes),
            (NETWORK_OUT_ID, "NetworkOut", Statistic::Sum, Unit::Bytes),
        ]
    );
    for q in queries {
        assert_eq!(q.namespace, "AWS/EC2");
        assert_eq!(q.instance_id, INSTANCE_ID);
        assert_eq!(q.period_seconds, 300);
    }
}

#[tokio::test]
async fn points_before_launch_are_not_written() {
    let fx = ingestion_fixture(ts("2025-03-10T12:00:00Z")).await;
    fx.metrics
        .insert_series(
            CPU_ID,
            vec![
                point("2025-03-10T11:55:00Z", 0.0),
                point("2025-03-10T12:00:00Z", 5.0),
            ],
        )
        .await;
    let summary = fx.pipeline.run_at(ts("2025-03-10T12:30:00Z")).await.unwrap();
    assert_eq!(summary.datapoints.cpu, 1);
    assert_eq!(summary.window_start, "2025-03-10T12:00:00+00:00");
}

#[tokio::test]
async fn rerun_same_day_replaces_the_partition() {
    let fx = ingestion_fixture(ts("2025-03-01T00:00:00Z")).await;
    fx.metrics
        .insert_series(CPU_ID, vec![point("2025-03-10T10:00:00Z", 1.0)])
        .await;
    fx.pipeline.run_at(ts("2025-03-10T10:30:00Z")).await.unwrap();

    fx.metrics
        .insert_series(CPU_ID, vec![point("2025-03-10T11:00:00Z", 2.0)])
        .await;
    let summary = fx.pipeline.run_at(ts("2025-03-10T11:30:00Z")).await.unwrap();

    assert_eq!(fx.objects.put_count(), 2);
    assert_eq!(fx.objects.keys().await.len(), 1);
    let stored = fx
        .objects
        .object(&ObjectRef::new(BUCKET, summary.s3_key))
        .await
        .unwrap();
    let text = String::from_utf8(stored.body.to_vec()).unwrap();
    assert!(text.contains("2025-03-10T11:00:00+00:00,2,,"));
    assert!(!text.contains("2025-03-10T10:00:00+00:00"));
}

#[tokio::test]
async fn unknown_instance_aborts_the_run() {
    let objects = Arc::new(MemoryObjectStore::new());
    let pipeline = IngestionPipeline::new(
        Arc::new(MemoryMetricsStore::new()),
        Arc::new(MemoryInstanceDirectory::new()),
        objects.clone(),
        common::ingestion_config(),
    );
    let err = pipeline.run_at(ts("2025-03-10T12:00:00Z")).await.unwrap_err();
    assert!(err.to_string().contains("describe instance i-0abc123"), "{}", err);
    assert_eq!(objects.put_count(), 0);
}

#[tokio::test]
async fn metrics_failure_aborts_without_writing() {
    let instances = Arc::new(MemoryInstanceDirectory::new());
    instances.insert(INSTANCE_ID, ts("2025-03-01T00:00:00Z")).await;
    let objects = Arc::new(MemoryObjectStore::new());
    let pipeline = IngestionPipeline::new(
        Arc::new(MemoryMetricsStore::failing("Throttling: rate exceeded")),
        instances,
        objects.clone(),
        common::ingestion_config(),
    );
    let err = pipeline.run_at(ts("2025-03-10T12:00:00Z")).await.unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("fetch metrics"), "{}", msg);
    assert!(msg.contains("Throttling"), "{}", msg);
    assert_eq!(objects.put_count(), 0);
}

// --- scheduled worker ---

#[tokio::test]
async fn worker_rejects_invalid_schedule() {
    let fx = ingestion_fixture(ts("2025-03-01T00:00:00Z")).await;
    let (_tx, rx) = tokio::sync::oneshot::channel();
    let stats = Arc::new(instance_metrics::ingest::worker::IngestionStats::default());
    let err = instance_metrics::ingest::worker::spawn(
        Arc::new(fx.pipeline),
        "every five minutes",
        stats,
        rx,
    )
    .unwrap_err();
    assert!(err.to_string().contains("invalid ingestion schedule"), "{}", err);
}

#[tokio::test]
async fn worker_stops_on_shutdown_without_running() {
    use std::sync::atomic::Ordering;

    let fx = ingestion_fixture(ts("2025-03-01T00:00:00Z")).await;
    let (tx, rx) = tokio::sync::oneshot::channel();
    let stats = Arc::new(instance_metrics::ingest::worker::IngestionStats::default());
    // Midnight on 1 January only: never fires during the test.
    let handle = instance_metrics::ingest::worker::spawn(
        Arc::new(fx.pipeline),
        "0 0 0 1 1 *",
        stats.clone(),
        rx,
    )
    .unwrap();

    tx.send(()).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("worker exits promptly")
        .unwrap();
    assert_eq!(stats.runs_ok.load(Ordering::Relaxed), 0);
    assert_eq!(stats.runs_failed.load(Ordering::Relaxed), 0);
    assert_eq!(fx.objects.put_count(), 0);
}

#[tokio::test]
async fn worker_logs_failed_runs_and_keeps_going() {
    use std::sync::atomic::Ordering;

    // No instance registered: every run fails at the launch-time lookup.
    let objects = Arc::new(MemoryObjectStore::new());
    let pipeline = IngestionPipeline::new(
        Arc::new(MemoryMetricsStore::new()),
        Arc::new(MemoryInstanceDirectory::new()),
        objects.clone(),
        common::ingestion_config(),
    );
    let (tx, rx) = tokio::sync::oneshot::channel();
    let stats = Arc::new(instance_metrics::ingest::worker::IngestionStats::default());
    let handle = instance_metrics::ingest::worker::spawn(
        Arc::new(pipeline),
        "* * * * * *",
        stats.clone(),
        rx,
    )
    .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(2500)).await;

    assert!(stats.runs_failed.load(Ordering::Relaxed) >= 1);
    assert_eq!(stats.runs_ok.load(Ordering::Relaxed), 0);
    assert!(!handle.is_finished(), "worker exited after a failed run");
    assert_eq!(objects.put_count(), 0);

    tx.send(()).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("worker exits promptly")
        .unwrap();
}

#[tokio::test]
async fn max_datapoints_caps_the_whole_read() {
    let fx = ingestion_fixture(ts("2025-03-01T00:00:00Z")).await;
    let pipeline = IngestionPipeline::new(
        fx.metrics.clone(),
        fx.instances.clone(),
        fx.objects.clone(),
        instance_metrics::config::IngestionConfig {
            max_datapoints: 4,
            ..common::ingestion_config()
        },
    );
    for id in [CPU_ID, NETWORK_IN_ID, NETWORK_OUT_ID] {
        fx.metrics
            .insert_series(
                id,
                vec![
                    point("2025-03-10T10:00:00Z", 1.0),
                    point("2025-03-10T10:05:00Z", 2.0),
                    point("2025-03-10T10:10:00Z", 3.0),
                ],
            )
            .await;
    }

    let summary = pipeline.run_at(ts("2025-03-10T12:00:00Z")).await.unwrap();

    let d = &summary.datapoints;
    assert_eq!(d.cpu + d.network_in + d.network_out, 4);
}
