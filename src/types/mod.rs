//! Core types: API request/response shapes, error handling, and the
//! crate-wide [`Result`] alias.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ============= API Request/Response Types =============

/// Request body for starting a research workflow.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StartResearchRequest {
    /// The natural-language query to research.
    pub query: String,
    /// Identifier of the user owning this execution.
    pub user_id: String,
}

/// Execution identifier and state, returned by the start and cancel
/// endpoints.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StartResearchResponse {
    /// Identifier of the execution.
    pub execution_id: String,
    /// Execution state after the operation.
    pub state: String,
}

/// Status of a research execution.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResearchStatusResponse {
    /// Execution identifier.
    pub id: String,
    /// Current lifecycle state.
    pub state: String,
    /// Final answer text, present once synthesis has completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    /// Whether one or more threads never produced a result.
    pub partial_result: bool,
    /// Number of sub-query threads planned for this execution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_count: Option<usize>,
    /// Threads that completed successfully.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_threads: Option<usize>,
    /// Threads that ran but reported a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_threads: Option<usize>,
    /// Threads that never wrote a result before the deadline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_threads: Option<usize>,
    /// Unique citation count across thread findings and the final answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_sources: Option<usize>,
    /// Citations collected during synthesis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<serde_json::Value>,
    /// Human-readable reason when the execution failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Unix timestamp of creation.
    pub created_at: i64,
    /// Unix timestamp of completion, once terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

/// Per-thread status exposed by the thread inspection endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ThreadStatusResponse {
    /// 0-based thread index matching plan order.
    pub thread_index: usize,
    /// The sub-query this thread researched.
    pub sub_query: String,
    /// Whether a result has been written to the result store.
    pub present: bool,
    /// Whether the thread ran and reported a failure.
    pub error: bool,
    /// Number of sources counted in this thread's findings.
    pub source_count: usize,
}

// ============= Error Types =============

/// Application-wide error type.
///
/// The variants map the workflow's failure taxonomy: `Planning` is fatal to
/// the whole workflow, `ResponseParse` is the recoverable parsing-class error
/// that makes fallback synthesis eligible, and `InvalidTransition` signals
/// state machine misuse. A missing thread result is *not* an error; it is a
/// flag on the thread result, surfaced via `partial_result`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// LLM backend or transport failure.
    #[error("LLM error: {0}")]
    LLM(String),

    /// The planning backend failed; fatal to the whole workflow.
    #[error("Planning failed: {0}")]
    Planning(String),

    /// Backend output could not be parsed; eligible for fallback handling.
    #[error("Response parse error: {0}")]
    ResponseParse(String),

    /// The execution state graph does not permit this transition.
    #[error("Invalid transition from '{from}' to '{to}'")]
    InvalidTransition {
        /// Committed state at the time of the attempt.
        from: String,
        /// Requested target state.
        to: String,
    },

    /// The referenced entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed or unacceptable caller input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invariant violation or other internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::Database(msg) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::LLM(msg) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::Planning(msg) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::ResponseParse(msg) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::InvalidTransition { from, to } => (
                axum::http::StatusCode::CONFLICT,
                format!("Invalid transition from '{}' to '{}'", from, to),
            ),
            AppError::NotFound(msg) => (axum::http::StatusCode::NOT_FOUND, msg),
            AppError::InvalidInput(msg) => (axum::http::StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, AppError>;
