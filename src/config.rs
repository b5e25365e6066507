// App config: TOML file (optional) + environment overrides, validated once at startup.

use serde::Deserialize;
use std::str::FromStr;

use crate::models::ObjectRef;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ingestion: IngestionConfig,
    pub query: QueryConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Bucket the daily CSV partitions are written to.
    pub bucket: String,
    pub instance_id: String,
    /// Metric granularity; 300 matches basic (5-min) monitoring.
    pub period_seconds: u32,
    pub key_prefix: String,
    pub lookback_hours: u32,
    pub max_datapoints: u32,
    /// Cron expression (UTC) for the in-process ingestion worker. Unset = external trigger only.
    pub schedule: Option<String>,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            instance_id: String::new(),
            period_seconds: 300,
            key_prefix: "ec2-metrics".into(),
            lookback_hours: 24,
            max_datapoints: 5000,
            schedule: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub database: String,
    pub table: String,
    /// Where the engine writes result artifacts (s3://bucket/prefix/).
    pub output_location: String,
    /// Poll deadline in seconds.
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// 1.0 = fixed interval; > 1.0 grows the interval after each non-terminal poll.
    pub backoff_multiplier: f64,
    pub max_poll_interval_ms: u64,
    pub alias_prefix: String,
    pub alias_name: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            database: "cpu_metrics".into(),
            table: "ec2_metrics_typed".into(),
            output_location: "s3://instance-metrics/athena-query-results/".into(),
            timeout_secs: 50,
            poll_interval_ms: 1000,
            backoff_multiplier: 1.0,
            max_poll_interval_ms: 5000,
            alias_prefix: "athena-query-results".into(),
            alias_name: "latest".into(),
        }
    }
}

impl QueryConfig {
    pub fn default_sql(&self) -> String {
        format!("SELECT * FROM {}.{} LIMIT 20;", self.database, self.table)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    S3,
    Fs,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory for the `fs` backend; buckets are subdirectories.
    pub root: Option<String>,
}

impl AppConfig {
    /// Reads `CONFIG_FILE` (default `config.toml`); a missing file means all defaults.
    /// Environment overrides are applied before validation.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let mut config = match std::fs::read_to_string(&path) {
            Ok(s) => toml::from_str(&s)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path, "no config file; using defaults");
                AppConfig::default()
            }
            Err(e) => return Err(anyhow::anyhow!("read {}: {}", path, e)),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate config from a string (e.g. for tests). No env overrides.
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the deployment environment variables on top of file values.
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BUCKET_NAME") {
            self.ingestion.bucket = v;
        }
        if let Some(v) = lookup("INSTANCE_ID") {
            self.ingestion.instance_id = v;
        }
        if let Some(v) = lookup("PERIOD_SECONDS") {
            self.ingestion.period_seconds = v
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("PERIOD_SECONDS={:?}: {}", v, e))?;
        }
        if let Some(v) = lookup("ATHENA_DATABASE") {
            self.query.database = v;
        }
        if let Some(v) = lookup("ATHENA_TABLE") {
            self.query.table = v;
        }
        if let Some(v) = lookup("ATHENA_OUTPUT_S3") {
            self.query.output_location = v;
        }
        if let Some(v) = lookup("ATHENA_TIMEOUT") {
            self.query.timeout_secs = v
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("ATHENA_TIMEOUT={:?}: {}", v, e))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            self.ingestion.period_seconds > 0,
            "ingestion.period_seconds must be > 0, got {}",
            self.ingestion.period_seconds
        );
        anyhow::ensure!(
            !self.ingestion.key_prefix.is_empty(),
            "ingestion.key_prefix must be non-empty"
        );
        anyhow::ensure!(
            self.ingestion.lookback_hours > 0,
            "ingestion.lookback_hours must be > 0, got {}",
            self.ingestion.lookback_hours
        );
        anyhow::ensure!(
            self.ingestion.max_datapoints > 0,
            "ingestion.max_datapoints must be > 0, got {}",
            self.ingestion.max_datapoints
        );
        if let Some(ref schedule) = self.ingestion.schedule {
            cron::Schedule::from_str(schedule).map_err(|e| {
                anyhow::anyhow!("ingestion.schedule is not a valid cron expression: {}", e)
            })?;
        }
        anyhow::ensure!(
            !self.query.database.is_empty(),
            "query.database must be non-empty"
        );
        anyhow::ensure!(!self.query.table.is_empty(), "query.table must be non-empty");
        self.query
            .output_location
            .parse::<ObjectRef>()
            .map_err(|e| anyhow::anyhow!("query.output_location: {}", e))?;
        anyhow::ensure!(
            self.query.timeout_secs > 0,
            "query.timeout_secs must be > 0, got {}",
            self.query.timeout_secs
        );
        anyhow::ensure!(
            self.query.poll_interval_ms > 0,
            "query.poll_interval_ms must be > 0, got {}",
            self.query.poll_interval_ms
        );
        anyhow::ensure!(
            self.query.backoff_multiplier >= 1.0,
            "query.backoff_multiplier must be >= 1.0, got {}",
            self.query.backoff_multiplier
        );
        anyhow::ensure!(
            self.query.max_poll_interval_ms >= self.query.poll_interval_ms,
            "query.max_poll_interval_ms must be >= query.poll_interval_ms, got {}",
            self.query.max_poll_interval_ms
        );
        anyhow::ensure!(
            !self.query.alias_name.is_empty(),
            "query.alias_name must be non-empty"
        );
        if self.storage.backend == StorageBackend::Fs {
            anyhow::ensure!(
                self.storage.root.as_deref().is_some_and(|r| !r.is_empty()),
                "storage.root must be set when storage.backend = \"fs\""
            );
        }
        Ok(())
    }

    /// Ingestion needs a target bucket and instance; checked only by the ingestion entry points.
    pub fn ensure_ingestion_target(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.ingestion.bucket.is_empty(),
            "ingestion.bucket (or BUCKET_NAME) must be set"
        );
        anyhow::ensure!(
            !self.ingestion.instance_id.is_empty(),
            "ingestion.instance_id (or INSTANCE_ID) must be set"
        );
        Ok(())
    }
}
