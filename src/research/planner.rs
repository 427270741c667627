//! Plan generation phase.
//!
//! Invokes the planning backend, resolves its response into a typed
//! [`ResearchPlan`] (via structured parsing or the deterministic fallback
//! parser), and commits the plan into the parent execution's metadata. The
//! planning call itself is tracked by a child execution. A backend failure
//! is fatal to the whole workflow: both executions are marked failed and
//! the error is re-raised, but an error-strategy plan is stored first so
//! the failure is inspectable.

use std::sync::Arc;
use std::time::Instant;

use crate::research::backend::{BackendContext, ResearchBackend};
use crate::research::execution::ExecutionState;
use crate::research::plan::{fallback_plan, PlanResponse, ResearchPlan};
use crate::store::executions::ExecutionStore;
use crate::types::{AppError, Result};

/// Runs the planning phase for an execution.
pub struct PlanGenerator {
    executions: Arc<ExecutionStore>,
    backend: Arc<dyn ResearchBackend>,
}

impl PlanGenerator {
    /// Create a generator over shared store and backend handles.
    pub fn new(executions: Arc<ExecutionStore>, backend: Arc<dyn ResearchBackend>) -> Self {
        Self {
            executions,
            backend,
        }
    }

    /// Generate and commit a plan for `query`.
    ///
    /// On success the execution is `planned` with the plan, thread count,
    /// and elapsed planning time merged into its metadata. On backend
    /// failure an error-strategy plan is stored, the execution and its
    /// planning child are marked `failed`, and the error propagates.
    pub async fn generate(
        &self,
        execution_id: &str,
        query: &str,
        ctx: &BackendContext,
    ) -> Result<ResearchPlan> {
        self.executions
            .transition(execution_id, ExecutionState::Planning)
            .await?;

        let child = self
            .executions
            .create(&ctx.user_id, Some(execution_id))
            .await?;
        self.executions
            .merge_metadata(&child.id, &serde_json::json!({ "phase": "planning" }))
            .await?;

        let started = Instant::now();

        let response = match self.backend.plan(query, ctx).await {
            Ok(response) => response,
            Err(e) => {
                let message = e.to_string();
                tracing::error!(execution_id, error = %message, "Planning backend failed");

                // Store *some* plan before failing so the record is inspectable.
                let error_plan = ResearchPlan::error_plan(query, &message);
                if let Err(store_err) = self
                    .executions
                    .merge_metadata(
                        execution_id,
                        &serde_json::json!({ "plan": error_plan }),
                    )
                    .await
                {
                    tracing::warn!(execution_id, error = %store_err, "Could not store error plan");
                }

                self.executions.mark_failed(&child.id, &message).await?;
                self.executions.mark_failed(execution_id, &message).await?;
                return Err(AppError::Planning(message));
            }
        };

        let (plan, raw_output) = match response {
            PlanResponse::Structured(plan) => {
                let plan = plan.normalized();
                let raw = serde_json::to_string(&plan)
                    .map_err(|e| AppError::Internal(format!("Serialize plan: {}", e)))?;
                (plan, raw)
            }
            PlanResponse::Raw(text) => {
                tracing::info!(execution_id, "Structured parse failed; using fallback plan parser");
                (fallback_plan(&text, query), text)
            }
        };

        let planning_ms = started.elapsed().as_millis() as u64;
        self.executions
            .merge_metadata(
                execution_id,
                &serde_json::json!({
                    "plan": plan,
                    "thread_count": plan.thread_count(),
                    "planning_ms": planning_ms,
                }),
            )
            .await?;
        self.executions
            .transition(execution_id, ExecutionState::Planned)
            .await?;
        self.executions
            .complete_with_output(&child.id, &raw_output)
            .await?;

        tracing::info!(
            execution_id,
            strategy = plan.strategy.as_str(),
            thread_count = plan.thread_count(),
            planning_ms,
            "Plan committed"
        );

        Ok(plan)
    }
}
