//! HTTP API handlers and routes, built on Axum.
//!
//! # Endpoints
//!
//! - `POST /api/research` - Start a research workflow (returns `202 Accepted`)
//! - `GET /api/research/{id}` - Execution status and final answer
//! - `GET /api/research/{id}/threads` - Per-thread result inspection
//! - `POST /api/research/{id}/cancel` - Cooperative cancellation
//! - `GET /api/health` - Health check
//!
//! Research runs asynchronously: starting an execution returns immediately
//! with its id, and clients poll for progress. The status endpoint reads
//! only committed execution state, so it is safe to poll at any frequency.
//!
//! # OpenAPI Documentation
//!
//! When the `swagger-ui` feature is enabled, interactive API documentation
//! is available at `/swagger-ui/`.

/// Request and response handlers for all API endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;
