//! # Noesis - Multi-Phase Research Server
//!
//! An asynchronous research workflow server built in Rust: one query is
//! decomposed into a plan of sub-queries, the sub-queries are researched in
//! parallel by independent LLM-backed threads, and the thread findings are
//! synthesized into a single cited answer.
//!
//! ## Overview
//!
//! Noesis can be used in two ways:
//!
//! 1. **As a standalone server** - Run the `noesis-server` binary
//! 2. **As a library** - Import the workflow components into your own project
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use noesis::{
//!     llm::Provider,
//!     research::{backend::LlmResearchBackend, workflow::{ResearchWorkflow, WorkflowConfig}},
//!     store::{executions::ExecutionStore, results::MemoryResultStore},
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let executions = Arc::new(ExecutionStore::new_memory().await?);
//!     let results = Arc::new(MemoryResultStore::new());
//!
//!     let provider = Provider::Ollama {
//!         base_url: "http://localhost:11434".to_string(),
//!         model: "llama3.2".to_string(),
//!     };
//!     let client: Arc<dyn noesis::LLMClient> = Arc::from(provider.create_client().await?);
//!     let backend = Arc::new(LlmResearchBackend::with_single_client(client));
//!
//!     let workflow = Arc::new(ResearchWorkflow::new(
//!         executions.clone(),
//!         results,
//!         backend,
//!         WorkflowConfig::default(),
//!     ));
//!
//!     let execution = executions.create("user-1", None).await?;
//!     let report = workflow
//!         .execute(
//!             &execution.id,
//!             "What is the current state of solid-state batteries?",
//!             &noesis::research::backend::BackendContext::for_user("user-1"),
//!         )
//!         .await?;
//!     println!("{:?}", report);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ollama` | Ollama local inference (default) |
//! | `openai` | OpenAI-compatible API support |
//! | `local-db` | File-backed SQLite execution store (default) |
//! | `turso` | Remote Turso execution store |
//! | `swagger-ui` | Interactive OpenAPI documentation |
//!
//! ## Modules
//!
//! - [`api`] - REST API handlers and routes
//! - [`llm`] - LLM provider clients and abstractions
//! - [`research`] - Plan, execute, and synthesize phases
//! - [`store`] - Execution store and TTL-bounded result store
//! - [`types`] - Common types and error handling
//! - [`utils`] - Environment-based configuration

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// HTTP API handlers and routes.
pub mod api;
/// LLM provider clients and abstractions.
pub mod llm;
/// Research workflow: planning, parallel execution, synthesis.
pub mod research;
/// Execution store and TTL-bounded result store.
pub mod store;
/// Core types (requests, responses, errors).
pub mod types;
/// Configuration utilities.
pub mod utils;

// Re-export commonly used types
pub use llm::{LLMClient, Provider};
pub use research::backend::{LlmResearchBackend, ResearchBackend};
pub use research::workflow::{ResearchWorkflow, WorkflowConfig};
pub use store::executions::{DatabaseProvider, ExecutionStore};
pub use store::results::{MemoryResultStore, ResultStore};
pub use types::{AppError, Result};
pub use utils::Config;

use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Environment-based configuration
    pub config: Arc<Config>,
    /// Execution lifecycle store
    pub executions: Arc<ExecutionStore>,
    /// TTL-bounded thread result store
    pub results: Arc<dyn ResultStore>,
    /// The research workflow orchestrator
    pub workflow: Arc<ResearchWorkflow>,
}
