// Run one ingestion and one query against in-memory backends and print what they produce.
//
// Usage: cargo run --example dry_run -- [SQL]
//   SQL  default: the preview statement from QueryConfig

use chrono::{Duration, DurationRound, Utc};
use instance_metrics::backends::memory::{
    MemoryInstanceDirectory, MemoryMetricsStore, MemoryObjectStore, ScriptedQueryEngine,
};
use instance_metrics::config::{IngestionConfig, QueryConfig};
use instance_metrics::ingest::IngestionPipeline;
use instance_metrics::ingest::fetcher::{CPU_ID, NETWORK_IN_ID, NETWORK_OUT_ID};
use instance_metrics::models::{MetricPoint, QueryState};
use instance_metrics::query::QueryPipeline;
use std::env;
use std::sync::Arc;

const INSTANCE_ID: &str = "i-0dryrun";
const BUCKET: &str = "dry-run";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .with_writer(std::io::stderr)
        .init();
    let sql = env::args().nth(1);

    let now = Utc::now();
    let start = now.duration_trunc(Duration::minutes(5))? - Duration::hours(1);
    let metrics = Arc::new(MemoryMetricsStore::new());
    let mut cpu = Vec::new();
    let mut net_in = Vec::new();
    let mut net_out = Vec::new();
    for i in 0..12 {
        let t = start + Duration::minutes(5 * i);
        cpu.push(MetricPoint::new(t, 2.0 + (i as f64) * 0.25));
        net_in.push(MetricPoint::new(t, (1024 * (i + 1)) as f64));
        // Gaps are written as empty cells.
        if i % 3 != 0 {
            net_out.push(MetricPoint::new(t, (512 * i) as f64));
        }
    }
    metrics.insert_series(CPU_ID, cpu).await;
    metrics.insert_series(NETWORK_IN_ID, net_in).await;
    metrics.insert_series(NETWORK_OUT_ID, net_out).await;

    let instances = Arc::new(MemoryInstanceDirectory::new());
    instances.insert(INSTANCE_ID, now - Duration::hours(2)).await;
    let objects = Arc::new(MemoryObjectStore::new());

    let ingestion = IngestionPipeline::new(
        metrics,
        instances,
        objects.clone(),
        IngestionConfig {
            bucket: BUCKET.into(),
            instance_id: INSTANCE_ID.into(),
            ..IngestionConfig::default()
        },
    );
    let summary = ingestion.run().await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    let engine = Arc::new(
        ScriptedQueryEngine::new(vec![QueryState::Queued, QueryState::Succeeded])
            .with_results(vec![
                vec![Some("ts".into()), Some("cpu_percent".into())],
                vec![Some(summary.window_end.clone()), Some("2.5".into())],
            ])
            .with_object_store(objects.clone()),
    );
    let query = QueryPipeline::new(
        engine,
        objects.clone(),
        QueryConfig {
            output_location: format!("s3://{}/athena-query-results/", BUCKET),
            timeout_secs: 5,
            ..QueryConfig::default()
        },
    );
    let envelope = query.handle(sql).await;
    println!("{}", serde_json::to_string_pretty(&envelope)?);

    for key in objects.keys().await {
        println!("{}", key);
    }
    Ok(())
}
