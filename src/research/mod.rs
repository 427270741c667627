//! Multi-Phase Research Workflow Coordination
//!
//! This module turns a single natural-language query into a three-phase
//! pipeline: plan generation, parallel sub-query execution, and result
//! synthesis, reconciled across independently scheduled asynchronous units
//! of work.
//!
//! # Architecture
//!
//! - [`execution`] - Persistent lifecycle state machine for one request
//! - [`planner`] / [`plan`] - Plan generation with a deterministic fallback parser
//! - [`threads`] - Fan-out of one detached task per sub-query
//! - [`synthesis`] - Partial-failure-tolerant fan-in and fallback digest
//! - [`sources`] - URL/citation extraction shared by the phases
//! - [`backend`] - Contracts for the external planning/research/synthesis backends
//! - [`workflow`] - Driver that sequences the phases
//!
//! Phases communicate only through the persisted execution record and the
//! TTL-bounded result store; no shared-memory threading is assumed between
//! them.
//!
//! # Usage
//!
//! ```ignore
//! use noesis::research::workflow::{ResearchWorkflow, WorkflowConfig};
//! use noesis::research::backend::BackendContext;
//!
//! let workflow = ResearchWorkflow::new(executions, results, backend, WorkflowConfig::default());
//!
//! let execution = executions.create("user-1", None).await?;
//! let report = workflow
//!     .execute(&execution.id, "What is new in quantum computing?", &BackendContext::for_user("user-1"))
//!     .await?;
//! ```

/// External backend contracts and the LLM-backed implementation.
pub mod backend;
/// Execution record and lifecycle state machine.
pub mod execution;
/// Research plan types and the deterministic fallback parser.
pub mod plan;
/// Plan generation phase.
pub mod planner;
/// URL and citation extraction.
pub mod sources;
/// Synthesis engine and fallback digest.
pub mod synthesis;
/// Parallel thread coordination.
pub mod threads;
/// Workflow driver sequencing the phases.
pub mod workflow;

pub use backend::{BackendContext, LlmResearchBackend, ResearchBackend};
pub use execution::{Execution, ExecutionState};
pub use plan::{fallback_plan, PlanResponse, PlanStrategy, ResearchPlan};
pub use planner::PlanGenerator;
pub use sources::{count_sources, extract_urls, SourceLink, SourceOrigin};
pub use synthesis::{SynthesisEngine, SynthesisReport};
pub use threads::{SettleStatus, ThreadCoordinator, ThreadResult};
pub use workflow::{ResearchWorkflow, WorkflowConfig};
