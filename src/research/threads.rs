//! Parallel thread coordination.
//!
//! Given a plan with N sub-queries, the coordinator launches N detached
//! tokio tasks, one per sub-query. The tasks share no mutable memory: each
//! owns clones of the store handles and communicates only by writing its
//! [`ThreadResult`] into the result store under `{execution_id}:{index}`.
//! A thread's backend failure is isolated to its own result and never
//! aborts siblings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::research::backend::ResearchBackend;
use crate::research::execution::{Execution, ExecutionState};
use crate::research::plan::ResearchPlan;
use crate::research::sources::count_sources;
use crate::store::executions::ExecutionStore;
use crate::store::results::{thread_result_key, ResultStore};
use crate::types::Result;

/// Outcome of one parallel sub-query, as written into the result store.
///
/// The JSON round-trip preserves thread index, sub-query, findings, source
/// count, and the error flag. `missing` is set by the reader, never the
/// writer: it marks a placeholder for a thread that never wrote a result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadResult {
    /// 0-based thread index matching plan order.
    pub thread_index: usize,
    /// The sub-query this thread researched.
    pub sub_query: String,
    /// Findings text (or the error message for error-flagged results).
    pub findings: String,
    /// Number of sources counted in the findings.
    pub source_count: usize,
    /// The thread ran and its backend call failed.
    #[serde(default)]
    pub error: bool,
    /// No record was found before the synthesis deadline.
    #[serde(default)]
    pub missing: bool,
    /// When the thread settled.
    pub completed_at: DateTime<Utc>,
}

impl ThreadResult {
    /// Result for a successful research call.
    pub fn success(thread_index: usize, sub_query: &str, findings: String) -> Self {
        let source_count = count_sources(&findings);
        Self {
            thread_index,
            sub_query: sub_query.to_string(),
            findings,
            source_count,
            error: false,
            missing: false,
            completed_at: Utc::now(),
        }
    }

    /// Error-flagged result, written instead of leaving the key absent so
    /// synthesis can distinguish "ran and failed" from "never ran".
    pub fn failed(thread_index: usize, sub_query: &str, message: &str) -> Self {
        Self {
            thread_index,
            sub_query: sub_query.to_string(),
            findings: format!("Research failed: {}", message),
            source_count: 0,
            error: true,
            missing: false,
            completed_at: Utc::now(),
        }
    }

    /// Placeholder synthesized by the reader for an absent record.
    pub fn missing(thread_index: usize, sub_query: &str) -> Self {
        Self {
            thread_index,
            sub_query: sub_query.to_string(),
            findings: String::new(),
            source_count: 0,
            error: false,
            missing: true,
            completed_at: Utc::now(),
        }
    }

    /// Whether this result carries usable findings.
    pub fn is_usable(&self) -> bool {
        !self.error && !self.missing
    }
}

/// How a settle wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleStatus {
    /// Number of thread results present in the store.
    pub present: usize,
    /// Total threads expected.
    pub expected: usize,
    /// The wait deadline elapsed before every index was present.
    pub timed_out: bool,
}

impl SettleStatus {
    /// Whether every expected thread wrote a result.
    pub fn all_present(&self) -> bool {
        self.present == self.expected
    }
}

/// Dispatches one detached research task per sub-query and detects when
/// all threads have settled.
pub struct ThreadCoordinator {
    executions: Arc<ExecutionStore>,
    results: Arc<dyn ResultStore>,
    backend: Arc<dyn ResearchBackend>,
    /// Initial TTL on thread results; must outlive any expected synthesis
    /// delay since synthesis may be deferred.
    result_ttl: Duration,
}

impl ThreadCoordinator {
    /// Create a coordinator over shared store and backend handles.
    pub fn new(
        executions: Arc<ExecutionStore>,
        results: Arc<dyn ResultStore>,
        backend: Arc<dyn ResearchBackend>,
        result_ttl: Duration,
    ) -> Self {
        Self {
            executions,
            results,
            backend,
            result_ttl,
        }
    }

    /// Launch one independent asynchronous unit of work per sub-query.
    ///
    /// Fire and forget: the join handles are dropped, and completion is
    /// observed through the result store, not a blocking join.
    pub fn dispatch(&self, execution: &Execution, plan: &ResearchPlan) {
        for (index, sub_query) in plan.sub_queries.iter().enumerate() {
            let executions = self.executions.clone();
            let results = self.results.clone();
            let backend = self.backend.clone();
            let execution_id = execution.id.clone();
            let user_id = execution.user_id.clone();
            let sub_query = sub_query.clone();
            let ttl = self.result_ttl;

            tokio::spawn(async move {
                run_thread(
                    executions,
                    results,
                    backend,
                    execution_id,
                    user_id,
                    index,
                    sub_query,
                    ttl,
                )
                .await;
            });
        }

        tracing::info!(
            execution_id = %execution.id,
            thread_count = plan.sub_queries.len(),
            "Dispatched research threads"
        );
    }

    /// Poll the result store until every index in `[0, expected)` has a
    /// result or `max_wait` elapses. Never blocks indefinitely.
    pub async fn await_settled(
        &self,
        execution_id: &str,
        expected: usize,
        poll_interval: Duration,
        max_wait: Duration,
    ) -> SettleStatus {
        let deadline = tokio::time::Instant::now() + max_wait;

        loop {
            let mut present = 0;
            for index in 0..expected {
                let key = thread_result_key(execution_id, index);
                if self.results.get(&key).await.is_some() {
                    present += 1;
                }
            }

            if present == expected {
                return SettleStatus {
                    present,
                    expected,
                    timed_out: false,
                };
            }

            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(
                    execution_id,
                    present,
                    expected,
                    "Settle deadline elapsed with threads outstanding"
                );
                return SettleStatus {
                    present,
                    expected,
                    timed_out: true,
                };
            }

            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// One thread's unit of work.
#[allow(clippy::too_many_arguments)]
async fn run_thread(
    executions: Arc<ExecutionStore>,
    results: Arc<dyn ResultStore>,
    backend: Arc<dyn ResearchBackend>,
    execution_id: String,
    user_id: String,
    index: usize,
    sub_query: String,
    ttl: Duration,
) {
    // Cooperative cancellation: check committed state before doing any work.
    let execution = match executions.get(&execution_id).await {
        Ok(execution) => execution,
        Err(e) => {
            tracing::error!(execution_id, thread_index = index, error = %e, "Thread could not load execution");
            return;
        }
    };
    if execution.state.is_terminal() {
        tracing::info!(
            execution_id,
            thread_index = index,
            state = %execution.state,
            "Execution already terminal; skipping thread"
        );
        return;
    }

    // First thread to arrive moves the execution into `executing`; the
    // transition is idempotent for the rest.
    if execution.state == ExecutionState::Planned {
        if let Err(e) = executions
            .transition(&execution_id, ExecutionState::Executing)
            .await
        {
            tracing::warn!(execution_id, thread_index = index, error = %e, "Could not enter executing state");
        }
    }

    let child = match executions.create(&user_id, Some(&execution_id)).await {
        Ok(child) => {
            let patch = serde_json::json!({ "thread_index": index, "sub_query": sub_query });
            if let Err(e) = executions.merge_metadata(&child.id, &patch).await {
                tracing::warn!(execution_id, thread_index = index, error = %e, "Could not tag thread child");
            }
            Some(child)
        }
        Err(e) => {
            tracing::warn!(execution_id, thread_index = index, error = %e, "Could not create thread child execution");
            None
        }
    };

    let result = match backend.research(&sub_query).await {
        Ok(findings) => {
            tracing::debug!(
                execution_id,
                thread_index = index,
                chars = findings.len(),
                "Thread research complete"
            );
            if let Some(ref child) = child {
                if let Err(e) = executions.complete_with_output(&child.id, &findings).await {
                    tracing::warn!(execution_id, thread_index = index, error = %e, "Could not complete thread child");
                }
            }
            ThreadResult::success(index, &sub_query, findings)
        }
        Err(e) => {
            tracing::warn!(execution_id, thread_index = index, error = %e, "Thread research failed");
            if let Some(ref child) = child {
                if let Err(mark_err) = executions.mark_failed(&child.id, &e.to_string()).await {
                    tracing::warn!(execution_id, thread_index = index, error = %mark_err, "Could not mark thread child failed");
                }
            }
            ThreadResult::failed(index, &sub_query, &e.to_string())
        }
    };

    if let Err(e) = write_result(&*results, &execution_id, &result, ttl).await {
        tracing::error!(execution_id, thread_index = index, error = %e, "Could not write thread result");
    }
}

async fn write_result(
    results: &dyn ResultStore,
    execution_id: &str,
    result: &ThreadResult,
    ttl: Duration,
) -> Result<()> {
    let key = thread_result_key(execution_id, result.thread_index);
    let value = serde_json::to_string(result)
        .map_err(|e| crate::types::AppError::Internal(format!("Serialize thread result: {}", e)))?;
    results.put(&key, &value, ttl).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_result_json_round_trip() {
        let result = ThreadResult::success(2, "sub query", "findings with https://x.example".into());
        let json = serde_json::to_string(&result).unwrap();
        let back: ThreadResult = serde_json::from_str(&json).unwrap();

        assert_eq!(back.thread_index, 2);
        assert_eq!(back.sub_query, "sub query");
        assert_eq!(back.findings, result.findings);
        assert_eq!(back.source_count, 1);
        assert!(!back.error);
        assert!(!back.missing);
    }

    #[test]
    fn test_failed_result_carries_message() {
        let result = ThreadResult::failed(0, "q", "backend down");
        assert!(result.error);
        assert!(!result.missing);
        assert!(result.findings.contains("backend down"));
        assert_eq!(result.source_count, 0);
        assert!(!result.is_usable());
    }

    #[test]
    fn test_missing_placeholder() {
        let result = ThreadResult::missing(3, "q");
        assert!(result.missing);
        assert!(!result.error);
        assert!(!result.is_usable());
    }

    #[test]
    fn test_success_counts_sources() {
        let result = ThreadResult::success(
            0,
            "q",
            "See https://a.example and [b](https://b.example)".into(),
        );
        assert_eq!(result.source_count, 2);
        assert!(result.is_usable());
    }

    #[test]
    fn test_error_flag_defaults_false_on_deserialize() {
        // Older records may omit the flags entirely.
        let json = r#"{"thread_index":0,"sub_query":"q","findings":"f","source_count":0,"completed_at":"2026-01-01T00:00:00Z"}"#;
        let back: ThreadResult = serde_json::from_str(json).unwrap();
        assert!(!back.error);
        assert!(!back.missing);
    }
}
