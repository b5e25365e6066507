// External service seams: metrics store, instance lookup, object store, query engine.
// One client per service is built at startup and shared as Arc<dyn ...>.

#[cfg(feature = "aws")]
pub mod aws;
pub mod fs;
pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::models::{MetricPoint, MetricQuery, ObjectRef, QueryExecution, RawResultSet, TimeWindow};

#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// One batched read, oldest first. Results are keyed by `MetricQuery::id`; a query the store
    /// has no data for may be missing from the map.
    async fn get_metric_data(
        &self,
        queries: &[MetricQuery],
        window: &TimeWindow,
        max_datapoints: u32,
    ) -> anyhow::Result<HashMap<String, Vec<MetricPoint>>>;
}

#[async_trait]
pub trait InstanceDirectory: Send + Sync {
    async fn launch_time(&self, instance_id: &str) -> anyhow::Result<DateTime<Utc>>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Full replacement of whatever is stored at `target`.
    async fn put_object(&self, target: &ObjectRef, body: Bytes, content_type: &str)
    -> anyhow::Result<()>;

    /// Server-side copy; bytes never pass through this process.
    async fn copy_object(&self, source: &ObjectRef, target: &ObjectRef) -> anyhow::Result<()>;
}

/// Everything the engine needs to start one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySubmission {
    pub sql: String,
    pub database: String,
    pub output_location: String,
}

#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Returns the opaque execution id.
    async fn start_query(&self, submission: &QuerySubmission) -> anyhow::Result<String>;

    async fn get_query_execution(&self, execution_id: &str) -> anyhow::Result<QueryExecution>;

    /// First page of results; row 0 is the header row.
    async fn get_query_results(&self, execution_id: &str) -> anyhow::Result<RawResultSet>;
}

/// Configured clients, cloned cheaply into each pipeline.
#[derive(Clone)]
pub struct Backends {
    pub metrics: Arc<dyn MetricsStore>,
    pub instances: Arc<dyn InstanceDirectory>,
    pub objects: Arc<dyn ObjectStore>,
    pub engine: Arc<dyn QueryEngine>,
}
