// Drive one execution to a terminal state under a wall-clock deadline.

use std::time::Duration;

use tokio::time::Instant;

use crate::backends::QueryEngine;
use crate::error::{QueryError, QueryResult};
use crate::models::{QueryExecution, QueryState};

pub const UNKNOWN_ERROR: &str = "Unknown error";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub deadline: Duration,
    pub interval: Duration,
    /// 1.0 keeps the interval fixed.
    pub backoff_multiplier: f64,
    pub max_interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(50),
            interval: Duration::from_secs(1),
            backoff_multiplier: 1.0,
            max_interval: Duration::from_secs(5),
        }
    }
}

impl PollPolicy {
    fn next_interval(&self, current: Duration) -> Duration {
        if self.backoff_multiplier <= 1.0 {
            return current;
        }
        current
            .mul_f64(self.backoff_multiplier)
            .min(self.max_interval)
            .max(current)
    }
}

/// Check, stop on a terminal state, give up once elapsed exceeds the deadline, otherwise sleep.
/// Returns the SUCCEEDED execution; FAILED/CANCELLED become `QueryFailed` with the engine's reason.
pub async fn wait_for_completion(
    engine: &dyn QueryEngine,
    execution_id: &str,
    policy: &PollPolicy,
) -> QueryResult<QueryExecution> {
    let started = Instant::now();
    let mut interval = policy.interval;
    let mut polls: u32 = 0;

    let execution = loop {
        let execution = engine
            .get_query_execution(execution_id)
            .await
            .map_err(|e| QueryError::Status(e.to_string()))?;
        polls += 1;
        if execution.state.is_terminal() {
            break execution;
        }
        if started.elapsed() > policy.deadline {
            tracing::warn!(
                execution_id,
                polls,
                state = ?execution.state,
                "query still running at deadline"
            );
            return Err(QueryError::Timeout);
        }
        tokio::time::sleep(interval).await;
        interval = policy.next_interval(interval);
    };

    tracing::debug!(execution_id, polls, state = ?execution.state, "query reached terminal state");
    match execution.state {
        QueryState::Succeeded => Ok(execution),
        _ => {
            let reason = execution
                .failure_reason
                .as_deref()
                .filter(|r| !r.trim().is_empty())
                .unwrap_or(UNKNOWN_ERROR);
            Err(QueryError::QueryFailed(reason.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_interval_by_default() {
        let p = PollPolicy::default();
        assert_eq!(p.next_interval(Duration::from_secs(1)), Duration::from_secs(1));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let p = PollPolicy {
            backoff_multiplier: 2.0,
            max_interval: Duration::from_secs(3),
            ..PollPolicy::default()
        };
        let second = p.next_interval(Duration::from_secs(1));
        assert_eq!(second, Duration::from_secs(2));
        assert_eq!(p.next_interval(second), Duration::from_secs(3));
        assert_eq!(p.next_interval(Duration::from_secs(3)), Duration::from_secs(3));
    }
}
