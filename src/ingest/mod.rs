// Ingestion pipeline: fetch -> merge -> CSV -> one object-store write per run.
// Errors are not caught here; the caller (CLI or scheduler) decides what a failed run means.

pub mod csv_writer;
pub mod fetcher;
pub mod merge;
pub mod worker;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument};

use crate::backends::{InstanceDirectory, MetricsStore, ObjectStore};
use crate::config::IngestionConfig;
use crate::models::{DatapointCounts, IngestionSummary, ObjectRef, iso_timestamp};
use fetcher::MetricsFetcher;

pub struct IngestionPipeline {
    metrics: Arc<dyn MetricsStore>,
    instances: Arc<dyn InstanceDirectory>,
    objects: Arc<dyn ObjectStore>,
    config: IngestionConfig,
}

impl IngestionPipeline {
    pub fn new(
        metrics: Arc<dyn MetricsStore>,
        instances: Arc<dyn InstanceDirectory>,
        objects: Arc<dyn ObjectStore>,
        config: IngestionConfig,
    ) -> Self {
        Self {
            metrics,
            instances,
            objects,
            config,
        }
    }

    pub async fn run(&self) -> anyhow::Result<IngestionSummary> {
        self.run_at(Utc::now()).await
    }

    /// One run with an explicit "now" (window end before minute truncation).
    #[instrument(skip(self), fields(operation = "ingest", instance_id = %self.config.instance_id, period_seconds = self.config.period_seconds))]
    pub async fn run_at(&self, now: DateTime<Utc>) -> anyhow::Result<IngestionSummary> {
        let cfg = &self.config;
        let fetcher = MetricsFetcher {
            metrics: self.metrics.as_ref(),
            instances: self.instances.as_ref(),
        };
        let (window, series) = fetcher
            .fetch(
                &cfg.instance_id,
                cfg.period_seconds,
                now,
                Duration::hours(cfg.lookback_hours as i64),
                cfg.max_datapoints,
            )
            .await?;

        let rows = merge::merge_series(&series);
        let body = csv_writer::to_csv_bytes(&rows)?;
        let key = csv_writer::partition_key(&cfg.key_prefix, window.end, &cfg.instance_id);
        let target = ObjectRef::new(cfg.bucket.clone(), key.clone());
        self.objects
            .put_object(&target, body, csv_writer::CONTENT_TYPE)
            .await
            .map_err(|e| anyhow::anyhow!("write {}: {}", target, e))?;

        let summary = IngestionSummary {
            status: "ok".into(),
            datapoints: DatapointCounts {
                timestamps: rows.len(),
                cpu: series.cpu.len(),
                network_in: series.network_in.len(),
                network_out: series.network_out.len(),
            },
            s3_key: key,
            period_seconds: cfg.period_seconds,
            window_start: iso_timestamp(&window.start),
            window_end: iso_timestamp(&window.end),
        };
        info!(
            s3_key = %summary.s3_key,
            rows = summary.datapoints.timestamps,
            window_start = %summary.window_start,
            window_end = %summary.window_end,
            "metrics written"
        );
        Ok(summary)
    }
}
