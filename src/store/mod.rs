//! Persistence: the execution entity store and the ephemeral result store.
//!
//! - [`executions`] - libsql-backed CRUD and state-machine enforcement for
//!   execution records (in-memory, local SQLite, or remote Turso)
//! - [`results`] - TTL-bounded key/value handoff between the execute and
//!   synthesize phases

/// libsql-backed execution entity store.
pub mod executions;
/// TTL-bounded result store.
pub mod results;

pub use executions::{DatabaseProvider, ExecutionStore};
pub use results::{thread_result_key, MemoryResultStore, ResultStore, ResultStoreStats};
