//! Execution lifecycle record and its state machine.
//!
//! An [`Execution`] tracks one research request through the phases
//! `pending → planning → planned → executing → synthesizing → completed`,
//! with `failed` and `cancelled` reachable as absorbing terminal states from
//! any non-terminal state. The state is persisted by the execution store and
//! mutated by independently scheduled processes, so callers must reload
//! before trusting an in-memory copy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle states of a research execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Created, nothing has run yet.
    Pending,
    /// Plan generation in flight.
    Planning,
    /// Plan committed to metadata; threads not yet dispatched.
    Planned,
    /// Per-thread research units running.
    Executing,
    /// Synthesis backend call in flight.
    Synthesizing,
    /// Terminal: final answer persisted.
    Completed,
    /// Terminal: unrecoverable failure, reason recorded in metadata.
    Failed,
    /// Terminal: cooperatively cancelled.
    Cancelled,
}

impl ExecutionState {
    /// Whether this state is terminal. Once terminal, no further transition
    /// may succeed (same-state re-entry excepted).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Completed | ExecutionState::Failed | ExecutionState::Cancelled
        )
    }

    /// Whether the transition graph permits moving from `self` to `target`.
    ///
    /// Re-entering the current state is always allowed as a no-op so that
    /// asynchronous, possibly-retried callers stay idempotent under
    /// at-least-once dispatch.
    pub fn can_transition_to(&self, target: ExecutionState) -> bool {
        if *self == target {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        // Failure and cancellation absorb from any non-terminal state.
        if matches!(target, ExecutionState::Failed | ExecutionState::Cancelled) {
            return true;
        }
        matches!(
            (self, target),
            (ExecutionState::Pending, ExecutionState::Planning)
                | (ExecutionState::Planning, ExecutionState::Planned)
                | (ExecutionState::Planned, ExecutionState::Executing)
                | (ExecutionState::Executing, ExecutionState::Synthesizing)
                | (ExecutionState::Synthesizing, ExecutionState::Completed)
        )
    }

    /// The state's stable string form, as persisted in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Pending => "pending",
            ExecutionState::Planning => "planning",
            ExecutionState::Planned => "planned",
            ExecutionState::Executing => "executing",
            ExecutionState::Synthesizing => "synthesizing",
            ExecutionState::Completed => "completed",
            ExecutionState::Failed => "failed",
            ExecutionState::Cancelled => "cancelled",
        }
    }

    /// Parse the persisted string form back into a state.
    pub fn parse(s: &str) -> Option<ExecutionState> {
        match s {
            "pending" => Some(ExecutionState::Pending),
            "planning" => Some(ExecutionState::Planning),
            "planned" => Some(ExecutionState::Planned),
            "executing" => Some(ExecutionState::Executing),
            "synthesizing" => Some(ExecutionState::Synthesizing),
            "completed" => Some(ExecutionState::Completed),
            "failed" => Some(ExecutionState::Failed),
            "cancelled" => Some(ExecutionState::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One research request's persisted lifecycle record.
///
/// Sub-executions (the planner's own tracking record, one per research
/// thread) link back to their parent via `parent_id` and must be created
/// after the parent exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    /// Unique identifier (UUID v4).
    pub id: String,
    /// Identifier of the owning user.
    pub user_id: String,
    /// Parent execution id for nested sub-executions.
    pub parent_id: Option<String>,
    /// Current lifecycle state.
    pub state: ExecutionState,
    /// Free-form metadata object (plan, thread counts, timing, sources).
    pub metadata: serde_json::Value,
    /// Final output text, set once synthesis completes.
    pub output: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Completion timestamp, set when a terminal state is entered.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Execution {
    /// Read the planned thread count from metadata, if planning has run.
    pub fn thread_count(&self) -> Option<usize> {
        self.metadata
            .get("thread_count")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
    }

    /// Read a metadata field as a string.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}
