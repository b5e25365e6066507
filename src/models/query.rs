// Query execution lifecycle and result preview

use serde::Serialize;
use serde_json::{Map, Value};

use super::ObjectRef;

/// Raw result page: row 0 is the header row, `None` is a cell with no value.
pub type RawResultSet = Vec<Vec<Option<String>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl QueryState {
    /// Parse an engine state string. Unknown states are reported as `Running` so polling continues.
    pub fn from_engine(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "QUEUED" => QueryState::Queued,
            "SUCCEEDED" => QueryState::Succeeded,
            "FAILED" => QueryState::Failed,
            "CANCELLED" => QueryState::Cancelled,
            _ => QueryState::Running,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueryState::Succeeded | QueryState::Failed | QueryState::Cancelled
        )
    }
}

/// Engine-owned execution status as observed by one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryExecution {
    pub id: String,
    pub state: QueryState,
    pub result_location: Option<String>,
    pub failure_reason: Option<String>,
}

impl QueryExecution {
    pub fn new(id: impl Into<String>, state: QueryState) -> Self {
        Self {
            id: id.into(),
            state,
            result_location: None,
            failure_reason: None,
        }
    }

    pub fn with_result_location(mut self, location: impl Into<String>) -> Self {
        self.result_location = Some(location.into());
        self
    }

    pub fn with_failure_reason(mut self, reason: impl Into<String>) -> Self {
        self.failure_reason = Some(reason.into());
        self
    }

    pub fn result_object(&self) -> anyhow::Result<ObjectRef> {
        let location = self
            .result_location
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("query {} has no result location", self.id))?;
        location.parse()
    }
}

/// Bounded preview of a successful result. Row maps keep column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultPreview {
    pub headers: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}
