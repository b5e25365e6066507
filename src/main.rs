use anyhow::Result;
use clap::{Parser, Subcommand};
use instance_metrics::backends::{self, Backends, fs::FsObjectStore};
use instance_metrics::config::{AppConfig, StorageBackend};
use instance_metrics::ingest::{self, IngestionPipeline};
use instance_metrics::query::QueryPipeline;
use instance_metrics::routes;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[derive(Parser)]
#[command(
    name = "instance-metrics",
    about = "EC2 metrics to partitioned CSV in S3, queried through Athena",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve POST /query and run scheduled ingestion if ingestion.schedule is set (default)
    Serve,
    /// Fetch the last window of metrics and write one CSV partition, then exit
    Ingest,
    /// Run one query and print the response envelope as JSON
    Query {
        /// SQL text; the default preview statement when omitted
        sql: Option<String>,
    },
}

async fn build_backends(config: &AppConfig) -> Backends {
    let sdk = backends::aws::load_sdk_config().await;
    let mut backends = backends::aws::backends(&sdk);
    if config.storage.backend == StorageBackend::Fs
        && let Some(root) = config.storage.root.as_deref()
    {
        tracing::info!(root, "using filesystem object store");
        backends.objects = Arc::new(FsObjectStore::new(root));
    }
    backends
}

fn ingestion_pipeline(backends: &Backends, config: &AppConfig) -> IngestionPipeline {
    IngestionPipeline::new(
        backends.metrics.clone(),
        backends.instances.clone(),
        backends.objects.clone(),
        config.ingestion.clone(),
    )
}

fn query_pipeline(backends: &Backends, config: &AppConfig) -> QueryPipeline {
    QueryPipeline::new(
        backends.engine.clone(),
        backends.objects.clone(),
        config.query.clone(),
    )
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn serve(config: AppConfig, backends: Backends) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let worker_handle = match config.ingestion.schedule.as_deref() {
        Some(schedule) => {
            config.ensure_ingestion_target()?;
            let pipeline = Arc::new(ingestion_pipeline(&backends, &config));
            let stats = Arc::new(ingest::worker::IngestionStats::default());
            tracing::info!(schedule, "scheduled ingestion enabled");
            Some(ingest::worker::spawn(pipeline, schedule, stats, shutdown_rx)?)
        }
        None => None,
    };

    let app = routes::app(Arc::new(query_pipeline(&backends, &config)));
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Received shutdown signal");
    let _ = shutdown_tx.send(());
    if let Some(handle) = worker_handle {
        let _ = handle.await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load()?;
    let backends = build_backends(&config).await;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, backends).await,
        Commands::Ingest => {
            config.ensure_ingestion_target()?;
            let summary = ingestion_pipeline(&backends, &config).run().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Commands::Query { sql } => {
            let envelope = query_pipeline(&backends, &config).handle(sql).await;
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            Ok(())
        }
    }
}
