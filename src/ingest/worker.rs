// Cron-driven ingestion: sleep until the next fire time (UTC), run once, repeat.
// A failed run is logged and the worker waits for the next fire time.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{info, warn};

use super::IngestionPipeline;

/// Run counters, readable while the worker is alive.
#[derive(Debug, Default)]
pub struct IngestionStats {
    pub runs_ok: AtomicU64,
    pub runs_failed: AtomicU64,
}

/// Spawns the worker. Returns an error up front if `schedule` does not parse.
pub fn spawn(
    pipeline: Arc<IngestionPipeline>,
    schedule: &str,
    stats: Arc<IngestionStats>,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let schedule = cron::Schedule::from_str(schedule)
        .map_err(|e| anyhow::anyhow!("invalid ingestion schedule {:?}: {}", schedule, e))?;

    Ok(tokio::spawn(async move {
        loop {
            let now = chrono::Utc::now();
            let Some(next) = schedule.after(&now).next() else {
                warn!("ingestion schedule has no future fire times; worker exiting");
                break;
            };
            let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
            tracing::debug!(next_run = %next, "ingestion worker sleeping");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    match pipeline.run().await {
                        Ok(summary) => {
                            stats.runs_ok.fetch_add(1, Ordering::Relaxed);
                            info!(
                                s3_key = %summary.s3_key,
                                runs_ok = stats.runs_ok.load(Ordering::Relaxed),
                                "scheduled ingestion complete"
                            );
                        }
                        Err(e) => {
                            stats.runs_failed.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                error = %e,
                                operation = "ingest",
                                runs_failed = stats.runs_failed.load(Ordering::Relaxed),
                                "scheduled ingestion failed"
                            );
                        }
                    }
                }
                _ = &mut shutdown_rx => {
                    tracing::debug!("Ingestion worker shutting down");
                    break;
                }
            }
        }
    }))
}
