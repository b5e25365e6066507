// Shared test helpers
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use instance_metrics::backends::memory::{
    MemoryInstanceDirectory, MemoryMetricsStore, MemoryObjectStore, ScriptedQueryEngine,
};
use instance_metrics::config::{IngestionConfig, QueryConfig};
use instance_metrics::ingest::IngestionPipeline;
use instance_metrics::models::{MetricPoint, QueryState, RawResultSet};
use instance_metrics::query::QueryPipeline;
use std::sync::Arc;

pub const BUCKET: &str = "metrics-bucket";
pub const INSTANCE_ID: &str = "i-0abc123";
pub const ALIAS_URL: &str = "s3://metrics-bucket/athena-query-results/latest.csv";

pub fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .expect("rfc3339")
        .with_timezone(&Utc)
}

pub fn point(s: &str, value: f64) -> MetricPoint {
    MetricPoint::new(ts(s), value)
}

pub fn ingestion_config() -> IngestionConfig {
    IngestionConfig {
        bucket: BUCKET.into(),
        instance_id: INSTANCE_ID.into(),
        ..IngestionConfig::default()
    }
}

pub fn query_config(timeout_secs: u64) -> QueryConfig {
    QueryConfig {
        output_location: format!("s3://{}/athena-query-results/", BUCKET),
        timeout_secs,
        ..QueryConfig::default()
    }
}

pub struct IngestionFixture {
    pub metrics: Arc<MemoryMetricsStore>,
    pub instances: Arc<MemoryInstanceDirectory>,
    pub objects: Arc<MemoryObjectStore>,
    pub pipeline: IngestionPipeline,
}

pub async fn ingestion_fixture(launch_time: DateTime<Utc>) -> IngestionFixture {
    let metrics = Arc::new(MemoryMetricsStore::new());
    let instances = Arc::new(MemoryInstanceDirectory::new());
    instances.insert(INSTANCE_ID, launch_time).await;
    let objects = Arc::new(MemoryObjectStore::new());
    let pipeline = IngestionPipeline::new(
        metrics.clone(),
        instances.clone(),
        objects.clone(),
        ingestion_config(),
    );
    IngestionFixture {
        metrics,
        instances,
        objects,
        pipeline,
    }
}

pub fn sample_results() -> RawResultSet {
    vec![
        vec![
            Some("ts".into()),
            Some("cpu_percent".into()),
            Some("network_in_bytes".into()),
        ],
        vec![
            Some("2025-03-10 12:00:00.000".into()),
            Some("12.5".into()),
            Some("1024".into()),
        ],
        vec![Some("2025-03-10 12:05:00.000".into()), Some("3.0".into()), None],
    ]
}

/// Engine that writes its results into `objects`, plus a pipeline over both.
pub fn query_fixture(
    states: Vec<QueryState>,
    objects: Arc<MemoryObjectStore>,
    timeout_secs: u64,
) -> (Arc<ScriptedQueryEngine>, QueryPipeline) {
    let engine = Arc::new(
        ScriptedQueryEngine::new(states)
            .with_results(sample_results())
            .with_object_store(objects.clone()),
    );
    let pipeline = QueryPipeline::new(engine.clone(), objects, query_config(timeout_secs));
    (engine, pipeline)
}
