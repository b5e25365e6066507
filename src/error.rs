//! Query-pipeline error taxonomy.
//!
//! Every variant is caught at the request boundary and rendered as a JSON `{error}` body;
//! `Timeout` maps to 504, everything else to 500.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Failed to start query: {0}")]
    Submission(String),

    #[error("Failed to check query status: {0}")]
    Status(String),

    #[error("Athena query timed out")]
    Timeout,

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Failed to copy {alias}: {message}")]
    Materialization { alias: String, message: String },

    #[error("Failed to fetch query results: {0}")]
    ResultFetch(String),
}

impl QueryError {
    pub fn status_code(&self) -> u16 {
        match self {
            QueryError::Timeout => 504,
            _ => 500,
        }
    }
}

pub type QueryResult<T> = Result<T, QueryError>;
