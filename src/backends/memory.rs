// In-process fakes for every backend seam. Used by tests and local dry runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use super::{InstanceDirectory, MetricsStore, ObjectStore, QueryEngine, QuerySubmission};
use crate::models::{
    MetricPoint, MetricQuery, ObjectRef, QueryExecution, QueryState, RawResultSet, TimeWindow,
};

/// Serves canned points per query id, filtered to the requested window.
#[derive(Default)]
pub struct MemoryMetricsStore {
    series: RwLock<HashMap<String, Vec<MetricPoint>>>,
    failure: Option<String>,
    requests: Mutex<Vec<(Vec<MetricQuery>, TimeWindow)>>,
}

impl MemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every read fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub async fn insert_series(&self, id: &str, points: Vec<MetricPoint>) {
        self.series.write().await.insert(id.to_string(), points);
    }

    /// Every (queries, window) pair this store has been asked for, oldest first.
    pub async fn requests(&self) -> Vec<(Vec<MetricQuery>, TimeWindow)> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl MetricsStore for MemoryMetricsStore {
    async fn get_metric_data(
        &self,
        queries: &[MetricQuery],
        window: &TimeWindow,
        max_datapoints: u32,
    ) -> anyhow::Result<HashMap<String, Vec<MetricPoint>>> {
        self.requests
            .lock()
            .await
            .push((queries.to_vec(), *window));
        if let Some(ref message) = self.failure {
            anyhow::bail!("{}", message);
        }
        let series = self.series.read().await;
        let mut out = HashMap::with_capacity(queries.len());
        // Like a single GetMetricData page, the cap applies to the whole response.
        let mut remaining = max_datapoints as usize;
        for q in queries {
            let Some(points) = series.get(q.id) else {
                continue;
            };
            let mut in_window: Vec<MetricPoint> = points
                .iter()
                .filter(|p| p.timestamp >= window.start && p.timestamp < window.end)
                .cloned()
                .collect();
            in_window.sort_by_key(|p| p.timestamp);
            in_window.truncate(remaining);
            remaining -= in_window.len();
            out.insert(q.id.to_string(), in_window);
        }
        Ok(out)
    }
}

#[derive(Default)]
pub struct MemoryInstanceDirectory {
    launch_times: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl MemoryInstanceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, instance_id: &str, launch_time: DateTime<Utc>) {
        self.launch_times
            .write()
            .await
            .insert(instance_id.to_string(), launch_time);
    }
}

#[async_trait]
impl InstanceDirectory for MemoryInstanceDirectory {
    async fn launch_time(&self, instance_id: &str) -> anyhow::Result<DateTime<Utc>> {
        self.launch_times
            .read()
            .await
            .get(instance_id)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("instance {} not found", instance_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<ObjectRef, StoredObject>>,
    fail_copies: bool,
    puts: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that accepts writes but rejects every copy.
    pub fn failing_copies() -> Self {
        Self {
            fail_copies: true,
            ..Self::default()
        }
    }

    pub async fn object(&self, r: &ObjectRef) -> Option<StoredObject> {
        self.objects.read().await.get(r).cloned()
    }

    pub async fn keys(&self) -> Vec<ObjectRef> {
        let mut keys: Vec<ObjectRef> = self.objects.read().await.keys().cloned().collect();
        keys.sort_by(|a, b| (&a.bucket, &a.key).cmp(&(&b.bucket, &b.key)));
        keys
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(
        &self,
        target: &ObjectRef,
        body: Bytes,
        content_type: &str,
    ) -> anyhow::Result<()> {
        self.objects.write().await.insert(
            target.clone(),
            StoredObject {
                body,
                content_type: content_type.to_string(),
            },
        );
        self.puts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn copy_object(&self, source: &ObjectRef, target: &ObjectRef) -> anyhow::Result<()> {
        anyhow::ensure!(!self.fail_copies, "AccessDenied: copy to {} rejected", target);
        let mut objects = self.objects.write().await;
        let stored = objects
            .get(source)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("NoSuchKey: {}", source))?;
        objects.insert(target.clone(), stored);
        Ok(())
    }
}

/// Scripted engine: each poll returns the next state of `states`; the last one repeats forever.
/// On success the result artifact is written to `objects` (if given) under the output location.
pub struct ScriptedQueryEngine {
    states: Vec<QueryState>,
    failure_reason: Option<String>,
    results: RawResultSet,
    submit_error: Option<String>,
    objects: Option<Arc<MemoryObjectStore>>,
    polls: AtomicUsize,
    submissions: Mutex<Vec<QuerySubmission>>,
    executions: Mutex<HashMap<String, String>>,
}

impl ScriptedQueryEngine {
    pub fn new(states: Vec<QueryState>) -> Self {
        Self {
            states,
            failure_reason: None,
            results: Vec::new(),
            submit_error: None,
            objects: None,
            polls: AtomicUsize::new(0),
            submissions: Mutex::new(Vec::new()),
            executions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_results(mut self, results: RawResultSet) -> Self {
        self.results = results;
        self
    }

    pub fn with_failure_reason(mut self, reason: impl Into<String>) -> Self {
        self.failure_reason = Some(reason.into());
        self
    }

    pub fn with_submit_error(mut self, message: impl Into<String>) -> Self {
        self.submit_error = Some(message.into());
        self
    }

    /// Write each successful result as CSV into `objects`, like the real engine does.
    pub fn with_object_store(mut self, objects: Arc<MemoryObjectStore>) -> Self {
        self.objects = Some(objects);
        self
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::Relaxed)
    }

    pub async fn submissions(&self) -> Vec<QuerySubmission> {
        self.submissions.lock().await.clone()
    }

    fn state_at(&self, poll: usize) -> QueryState {
        self.states
            .get(poll)
            .or_else(|| self.states.last())
            .copied()
            .unwrap_or(QueryState::Running)
    }

    fn results_csv(&self) -> anyhow::Result<Bytes> {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        for row in &self.results {
            writer.write_record(row.iter().map(|c| c.as_deref().unwrap_or("")))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("csv flush: {}", e))?;
        Ok(Bytes::from(bytes))
    }
}

#[async_trait]
impl QueryEngine for ScriptedQueryEngine {
    async fn start_query(&self, submission: &QuerySubmission) -> anyhow::Result<String> {
        if let Some(ref message) = self.submit_error {
            anyhow::bail!("{}", message);
        }
        let mut submissions = self.submissions.lock().await;
        submissions.push(submission.clone());
        let id = format!("exec-{:04}", submissions.len());
        let location = format!(
            "{}/{}.csv",
            submission.output_location.trim_end_matches('/'),
            id
        );
        self.executions.lock().await.insert(id.clone(), location);
        Ok(id)
    }

    async fn get_query_execution(&self, execution_id: &str) -> anyhow::Result<QueryExecution> {
        let location = self
            .executions
            .lock()
            .await
            .get(execution_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown execution {}", execution_id))?;
        let poll = self.polls.fetch_add(1, Ordering::Relaxed);
        let state = self.state_at(poll);
        let mut execution = QueryExecution::new(execution_id, state);
        match state {
            QueryState::Succeeded => {
                if let Some(ref objects) = self.objects {
                    let target: ObjectRef = location.parse()?;
                    objects
                        .put_object(&target, self.results_csv()?, "text/csv")
                        .await?;
                }
                execution = execution.with_result_location(location);
            }
            QueryState::Failed | QueryState::Cancelled => {
                if let Some(ref reason) = self.failure_reason {
                    execution = execution.with_failure_reason(reason.clone());
                }
            }
            QueryState::Queued | QueryState::Running => {}
        }
        Ok(execution)
    }

    async fn get_query_results(&self, execution_id: &str) -> anyhow::Result<RawResultSet> {
        anyhow::ensure!(
            self.executions.lock().await.contains_key(execution_id),
            "unknown execution {}",
            execution_id
        );
        Ok(self.results.clone())
    }
}
