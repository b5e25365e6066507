// Query pipeline: submit -> poll -> materialize -> shape.
// Every failure is caught here and turned into a JSON error envelope; nothing escapes.

pub mod materialize;
pub mod poller;
pub mod shaper;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use crate::backends::{ObjectStore, QueryEngine, QuerySubmission};
use crate::config::QueryConfig;
use crate::error::{QueryError, QueryResult};
use poller::PollPolicy;

/// Successful response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub data: Vec<Map<String, Value>>,
    pub csv_url: String,
}

/// HTTP-style envelope: `{statusCode, headers, body}` with `body` a JSON string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl ApiResponse {
    pub fn json(status_code: u16, body: &Value) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self {
            status_code,
            headers,
            body: body.to_string(),
        }
    }

    pub fn from_error(e: &QueryError) -> Self {
        Self::json(e.status_code(), &serde_json::json!({ "error": e.to_string() }))
    }
}

/// The SQL a request asked for, if any. Blank or non-string `query` counts as absent.
fn query_field(body: &Value) -> Option<String> {
    body.get("query")
        .and_then(Value::as_str)
        .filter(|q| !q.trim().is_empty())
        .map(str::to_string)
}

/// Parse a raw request body. Unparsable bodies are treated as empty.
pub fn requested_sql(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| query_field(&v))
}

/// Parse an invocation event: `{"body": "<json>"}`, `{"body": {...}}`, or the bare object.
pub fn requested_sql_from_event(event: &Value) -> Option<String> {
    match event.get("body") {
        Some(Value::String(s)) => requested_sql(s.as_bytes()),
        Some(body @ Value::Object(_)) => query_field(body),
        Some(_) => None,
        None => query_field(event),
    }
}

pub struct QueryPipeline {
    engine: Arc<dyn QueryEngine>,
    objects: Arc<dyn ObjectStore>,
    config: QueryConfig,
}

impl QueryPipeline {
    pub fn new(
        engine: Arc<dyn QueryEngine>,
        objects: Arc<dyn ObjectStore>,
        config: QueryConfig,
    ) -> Self {
        Self {
            engine,
            objects,
            config,
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            deadline: Duration::from_secs(self.config.timeout_secs),
            interval: Duration::from_millis(self.config.poll_interval_ms),
            backoff_multiplier: self.config.backoff_multiplier,
            max_interval: Duration::from_millis(self.config.max_poll_interval_ms),
        }
    }

    /// Run the whole workflow. `None` or blank SQL runs the default preview statement.
    #[instrument(skip(self, sql), fields(operation = "query", database = %self.config.database))]
    pub async fn execute(&self, sql: Option<String>) -> QueryResult<QueryResponse> {
        let sql = sql
            .filter(|q| !q.trim().is_empty())
            .unwrap_or_else(|| self.config.default_sql());
        let submission = QuerySubmission {
            sql,
            database: self.config.database.clone(),
            output_location: self.config.output_location.clone(),
        };
        let execution_id = self
            .engine
            .start_query(&submission)
            .await
            .map_err(|e| QueryError::Submission(e.to_string()))?;
        tracing::debug!(execution_id = %execution_id, "query submitted");

        let execution =
            poller::wait_for_completion(self.engine.as_ref(), &execution_id, &self.poll_policy())
                .await?;

        let alias = materialize::materialize(
            self.objects.as_ref(),
            &execution,
            &self.config.alias_prefix,
            &self.config.alias_name,
        )
        .await?;

        let raw = self
            .engine
            .get_query_results(&execution_id)
            .await
            .map_err(|e| QueryError::ResultFetch(e.to_string()))?;
        let preview = shaper::shape_preview(&raw);

        info!(
            execution_id = %execution_id,
            rows = preview.rows.len(),
            csv_url = %alias,
            "query complete"
        );
        Ok(QueryResponse {
            data: preview.rows,
            csv_url: alias.to_string(),
        })
    }

    /// Boundary: always returns an envelope, 200 on success.
    pub async fn handle(&self, sql: Option<String>) -> ApiResponse {
        match self.execute(sql).await {
            Ok(resp) => match serde_json::to_value(&resp) {
                Ok(body) => ApiResponse::json(200, &body),
                Err(e) => ApiResponse::json(500, &serde_json::json!({ "error": e.to_string() })),
            },
            Err(e) => {
                warn!(error = %e, status = e.status_code(), "query request failed");
                ApiResponse::from_error(&e)
            }
        }
    }

    pub async fn handle_event(&self, event: &Value) -> ApiResponse {
        self.handle(requested_sql_from_event(event)).await
    }
}
