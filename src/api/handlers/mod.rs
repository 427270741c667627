//! API request handlers.

/// Health check handler.
pub mod health;
/// Research workflow handlers (start, status, threads, cancel).
pub mod research;
