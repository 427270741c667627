//! Workflow driver: sequences the plan, execute, and synthesize phases.
//!
//! Phases communicate only through the persisted execution record and the
//! result store; the driver itself holds no mutable workflow state, so any
//! number of executions can run concurrently over shared handles.

use std::sync::Arc;
use std::time::Duration;

use crate::research::backend::{BackendContext, ResearchBackend};
use crate::research::planner::PlanGenerator;
use crate::research::synthesis::{SynthesisEngine, SynthesisReport};
use crate::research::threads::ThreadCoordinator;
use crate::store::executions::ExecutionStore;
use crate::store::results::ResultStore;
use crate::types::Result;

/// Tunables for one workflow instance.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Initial TTL on thread results. Must survive a deferred synthesis.
    pub result_ttl: Duration,
    /// TTL applied to results once synthesis has claimed them.
    pub claimed_ttl: Duration,
    /// Interval between settle polls.
    pub settle_poll_interval: Duration,
    /// Maximum time to wait for threads before declaring them missing.
    pub settle_max_wait: Duration,
    /// Per-thread findings character budget in the fallback digest.
    pub digest_budget: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            result_ttl: Duration::from_secs(24 * 60 * 60),
            claimed_ttl: Duration::from_secs(60 * 60),
            settle_poll_interval: Duration::from_millis(500),
            settle_max_wait: Duration::from_secs(15 * 60),
            digest_budget: 1500,
        }
    }
}

/// Composes the phase components over shared store and backend handles.
pub struct ResearchWorkflow {
    executions: Arc<ExecutionStore>,
    planner: PlanGenerator,
    coordinator: ThreadCoordinator,
    engine: SynthesisEngine,
    config: WorkflowConfig,
}

impl ResearchWorkflow {
    /// Build a workflow from its collaborators.
    pub fn new(
        executions: Arc<ExecutionStore>,
        results: Arc<dyn ResultStore>,
        backend: Arc<dyn ResearchBackend>,
        config: WorkflowConfig,
    ) -> Self {
        let planner = PlanGenerator::new(executions.clone(), backend.clone());
        let coordinator = ThreadCoordinator::new(
            executions.clone(),
            results.clone(),
            backend.clone(),
            config.result_ttl,
        );
        let engine = SynthesisEngine::new(
            executions.clone(),
            results,
            backend,
            config.claimed_ttl,
            config.digest_budget,
        );

        Self {
            executions,
            planner,
            coordinator,
            engine,
            config,
        }
    }

    /// Run the full pipeline for one execution.
    ///
    /// Returns `Ok(None)` when the execution was already terminal before a
    /// phase could run (cooperative cancellation). Planning failures and
    /// non-parsing-class synthesis failures mark the execution `failed` and
    /// propagate; everything else degrades into the report.
    pub async fn execute(
        &self,
        execution_id: &str,
        query: &str,
        ctx: &BackendContext,
    ) -> Result<Option<SynthesisReport>> {
        let execution = self.executions.get(execution_id).await?;
        if execution.state.is_terminal() {
            tracing::info!(
                execution_id,
                state = %execution.state,
                "Execution already terminal; not starting workflow"
            );
            return Ok(None);
        }

        let plan = self.planner.generate(execution_id, query, ctx).await?;

        // The plan is fully committed before any thread is dispatched.
        let execution = self.executions.get(execution_id).await?;
        if execution.state.is_terminal() {
            return Ok(None);
        }
        self.coordinator.dispatch(&execution, &plan);

        let settle = self
            .coordinator
            .await_settled(
                execution_id,
                plan.thread_count(),
                self.config.settle_poll_interval,
                self.config.settle_max_wait,
            )
            .await;
        tracing::info!(
            execution_id,
            present = settle.present,
            expected = settle.expected,
            timed_out = settle.timed_out,
            "Threads settled"
        );

        self.engine.synthesize(execution_id).await
    }

    /// Spawn `execute` fire-and-forget, for callers that must not block.
    pub fn start(self: &Arc<Self>, execution_id: String, query: String, ctx: BackendContext) {
        let workflow = self.clone();
        tokio::spawn(async move {
            if let Err(e) = workflow.execute(&execution_id, &query, &ctx).await {
                tracing::error!(execution_id = %execution_id, error = %e, "Research workflow failed");
            }
        });
    }
}
