//! libsql-backed execution entity store.
//!
//! Every state mutation is persisted immediately; the state machine is
//! enforced here with a compare-and-swap update because executions are
//! mutated by independently scheduled processes. Metadata writes go through
//! a single-statement `json_patch` merge so two phases racing on metadata
//! resolve to last-writer-wins without partial-field corruption.

use chrono::{DateTime, Utc};
use libsql::{Builder, Connection, Database};

use crate::research::execution::{Execution, ExecutionState};
use crate::types::{AppError, Result};

/// Database provider configuration.
#[derive(Debug, Clone, Default)]
pub enum DatabaseProvider {
    /// In-memory SQLite database (ephemeral, lost on restart).
    #[default]
    Memory,
    /// File-based SQLite database.
    #[cfg(feature = "local-db")]
    SQLite {
        /// Path to the SQLite database file.
        path: String,
    },
    /// Remote Turso database (requires network access).
    #[cfg(feature = "turso")]
    Turso {
        /// The Turso database URL (e.g., `libsql://your-db.turso.io`).
        url: String,
        /// Authentication token for the Turso database.
        auth_token: String,
    },
}

impl DatabaseProvider {
    /// Create an execution store from this provider configuration.
    pub async fn create_store(&self) -> Result<ExecutionStore> {
        match self {
            DatabaseProvider::Memory => ExecutionStore::new_memory().await,
            #[cfg(feature = "local-db")]
            DatabaseProvider::SQLite { path } => ExecutionStore::new_local(path).await,
            #[cfg(feature = "turso")]
            DatabaseProvider::Turso { url, auth_token } => {
                ExecutionStore::new_remote(url.clone(), auth_token.clone()).await
            }
        }
    }

    /// Create from environment variables or use defaults.
    pub fn from_env() -> Self {
        #[cfg(feature = "turso")]
        {
            if let (Ok(url), Ok(token)) = (
                std::env::var("TURSO_DATABASE_URL"),
                std::env::var("TURSO_AUTH_TOKEN"),
            ) {
                if !url.is_empty() && !token.is_empty() {
                    return DatabaseProvider::Turso {
                        url,
                        auth_token: token,
                    };
                }
            }
        }

        #[cfg(feature = "local-db")]
        if let Ok(path) = std::env::var("DATABASE_PATH") {
            if !path.is_empty() && path != ":memory:" {
                return DatabaseProvider::SQLite { path };
            }
        }

        DatabaseProvider::Memory
    }
}

/// CRUD and state-machine operations over persisted executions.
pub struct ExecutionStore {
    db: Database,
    // Opened once and cloned per call: for `:memory:` databases each fresh
    // `Database::connect` opens a separate empty database, so every handle
    // must share this connection to see the same data.
    conn: Connection,
}

impl ExecutionStore {
    /// Create a store backed by an in-memory database.
    pub async fn new_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| AppError::Database(format!("Failed to open in-memory database: {}", e)))?;

        let conn = db
            .connect()
            .map_err(|e| AppError::Database(format!("Failed to get connection: {}", e)))?;
        let store = Self { db, conn };
        store.initialize_schema().await?;
        Ok(store)
    }

    /// Create a store backed by a local SQLite file.
    #[cfg(feature = "local-db")]
    pub async fn new_local(path: &str) -> Result<Self> {
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| AppError::Database(format!("Failed to open database '{}': {}", path, e)))?;

        let conn = db
            .connect()
            .map_err(|e| AppError::Database(format!("Failed to get connection: {}", e)))?;
        let store = Self { db, conn };
        store.initialize_schema().await?;
        Ok(store)
    }

    /// Create a store backed by a remote Turso database.
    #[cfg(feature = "turso")]
    pub async fn new_remote(url: String, auth_token: String) -> Result<Self> {
        let db = Builder::new_remote(url, auth_token)
            .build()
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Turso: {}", e)))?;

        let conn = db
            .connect()
            .map_err(|e| AppError::Database(format!("Failed to get connection: {}", e)))?;
        let store = Self { db, conn };
        store.initialize_schema().await?;
        Ok(store)
    }

    /// Get a connection to the underlying database.
    pub fn connection(&self) -> Result<Connection> {
        Ok(self.conn.clone())
    }

    async fn initialize_schema(&self) -> Result<()> {
        let conn = self.connection()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS executions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                parent_id TEXT,
                state TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                output TEXT,
                created_at INTEGER NOT NULL,
                completed_at INTEGER,
                FOREIGN KEY (parent_id) REFERENCES executions(id)
            )",
            (),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to create executions table: {}", e)))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_executions_parent ON executions(parent_id)",
            (),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to create parent index: {}", e)))?;

        Ok(())
    }

    /// Create a new execution in `pending` state.
    ///
    /// The parent, when given, must already exist.
    pub async fn create(&self, user_id: &str, parent_id: Option<&str>) -> Result<Execution> {
        let conn = self.connection()?;

        if let Some(parent) = parent_id {
            let mut rows = conn
                .query("SELECT 1 FROM executions WHERE id = ?", [parent])
                .await
                .map_err(|e| AppError::Database(format!("Failed to check parent: {}", e)))?;
            if rows
                .next()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?
                .is_none()
            {
                return Err(AppError::NotFound(format!(
                    "Parent execution '{}' does not exist",
                    parent
                )));
            }
        }

        let execution = Execution {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            parent_id: parent_id.map(|s| s.to_string()),
            state: ExecutionState::Pending,
            metadata: serde_json::json!({}),
            output: None,
            created_at: Utc::now(),
            completed_at: None,
        };

        conn.execute(
            "INSERT INTO executions (id, user_id, parent_id, state, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                execution.id.clone(),
                execution.user_id.clone(),
                execution.parent_id.clone(),
                execution.state.as_str(),
                execution.metadata.to_string(),
                execution.created_at.timestamp(),
            ),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to create execution: {}", e)))?;

        Ok(execution)
    }

    /// Load the committed state of an execution.
    pub async fn get(&self, id: &str) -> Result<Execution> {
        let conn = self.connection()?;

        let mut rows = conn
            .query(
                "SELECT id, user_id, parent_id, state, metadata, output, created_at, completed_at
                 FROM executions WHERE id = ?",
                [id],
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to query execution: {}", e)))?;

        match rows
            .next()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
        {
            Some(row) => execution_from_row(&row),
            None => Err(AppError::NotFound(format!("Execution '{}' not found", id))),
        }
    }

    /// List all child executions of a parent, in creation order.
    pub async fn find_by_parent(&self, parent_id: &str) -> Result<Vec<Execution>> {
        let conn = self.connection()?;

        let mut rows = conn
            .query(
                "SELECT id, user_id, parent_id, state, metadata, output, created_at, completed_at
                 FROM executions WHERE parent_id = ? ORDER BY created_at ASC",
                [parent_id],
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to query children: {}", e)))?;

        let mut executions = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
        {
            executions.push(execution_from_row(&row)?);
        }

        Ok(executions)
    }

    /// Advance an execution along the state graph.
    ///
    /// Re-entering the current state is a no-op success. The update is
    /// compare-and-swap on the committed state; when a concurrent caller
    /// wins the race to the same target the call still succeeds.
    pub async fn transition(&self, id: &str, target: ExecutionState) -> Result<ExecutionState> {
        let current = self.get(id).await?.state;

        if current == target {
            return Ok(current);
        }
        if !current.can_transition_to(target) {
            return Err(AppError::InvalidTransition {
                from: current.as_str().to_string(),
                to: target.as_str().to_string(),
            });
        }

        let conn = self.connection()?;
        let completed_at: Option<i64> = if target.is_terminal() {
            Some(Utc::now().timestamp())
        } else {
            None
        };

        let changed = conn
            .execute(
                "UPDATE executions
                 SET state = ?, completed_at = COALESCE(?, completed_at)
                 WHERE id = ? AND state = ?",
                (target.as_str(), completed_at, id, current.as_str()),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to transition execution: {}", e)))?;

        if changed == 0 {
            // Lost the race; accept if someone else committed the same target.
            let now = self.get(id).await?.state;
            if now == target {
                return Ok(now);
            }
            return Err(AppError::InvalidTransition {
                from: now.as_str().to_string(),
                to: target.as_str().to_string(),
            });
        }

        Ok(target)
    }

    /// Move an execution to `failed` regardless of its current state,
    /// recording the reason in metadata. The escape hatch for exception
    /// handling paths; always succeeds.
    pub async fn mark_failed(&self, id: &str, reason: &str) -> Result<()> {
        let conn = self.connection()?;
        let patch = serde_json::json!({ "failure_reason": reason });

        conn.execute(
            "UPDATE executions
             SET state = 'failed',
                 completed_at = COALESCE(completed_at, ?),
                 metadata = json_patch(metadata, ?)
             WHERE id = ?",
            (Utc::now().timestamp(), patch.to_string(), id),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to mark execution failed: {}", e)))?;

        Ok(())
    }

    /// Cooperatively cancel an execution. Fails with `InvalidTransition`
    /// when the execution is already terminal.
    pub async fn mark_cancelled(&self, id: &str) -> Result<ExecutionState> {
        self.transition(id, ExecutionState::Cancelled).await
    }

    /// Complete a tracking sub-execution with its output.
    ///
    /// Sub-executions record single backend calls and do not walk the phase
    /// graph; they move straight from `pending` to `completed`. Rejected for
    /// already-terminal records.
    pub async fn complete_with_output(&self, id: &str, output: &str) -> Result<()> {
        let current = self.get(id).await?.state;
        if current.is_terminal() {
            return Err(AppError::InvalidTransition {
                from: current.as_str().to_string(),
                to: ExecutionState::Completed.as_str().to_string(),
            });
        }

        let conn = self.connection()?;
        conn.execute(
            "UPDATE executions SET state = 'completed', output = ?, completed_at = ? WHERE id = ?",
            (output, Utc::now().timestamp(), id),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to complete execution: {}", e)))?;

        Ok(())
    }

    /// Merge a JSON object into the execution's metadata.
    ///
    /// Single-statement `json_patch`, so concurrent merges resolve to
    /// last-writer-wins per key. `thread_count`, once set by planning, is
    /// immutable and attempts to change it are rejected.
    pub async fn merge_metadata(&self, id: &str, patch: &serde_json::Value) -> Result<()> {
        if !patch.is_object() {
            return Err(AppError::InvalidInput(
                "Metadata patch must be a JSON object".to_string(),
            ));
        }

        if let Some(new_count) = patch.get("thread_count") {
            let existing = self.get(id).await?;
            if let Some(current) = existing.metadata.get("thread_count") {
                if current != new_count {
                    return Err(AppError::InvalidInput(format!(
                        "thread_count is immutable once set (currently {})",
                        current
                    )));
                }
            }
        }

        let conn = self.connection()?;
        let changed = conn
            .execute(
                "UPDATE executions SET metadata = json_patch(metadata, ?) WHERE id = ?",
                (patch.to_string(), id),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to merge metadata: {}", e)))?;

        if changed == 0 {
            return Err(AppError::NotFound(format!("Execution '{}' not found", id)));
        }

        Ok(())
    }

    /// Persist the final answer, merge the synthesis metadata patch, and
    /// move to `completed`, all in one compare-and-swap update against
    /// `synthesizing`.
    ///
    /// Returns `false` without writing anything when the execution is no
    /// longer `synthesizing` (a concurrent cancel or failure won the race),
    /// so a cancelled execution never carries a final answer.
    pub async fn commit_synthesis(
        &self,
        id: &str,
        output: &str,
        patch: &serde_json::Value,
    ) -> Result<bool> {
        if !patch.is_object() {
            return Err(AppError::InvalidInput(
                "Metadata patch must be a JSON object".to_string(),
            ));
        }

        let conn = self.connection()?;
        let changed = conn
            .execute(
                "UPDATE executions
                 SET state = 'completed',
                     output = ?,
                     metadata = json_patch(metadata, ?),
                     completed_at = ?
                 WHERE id = ? AND state = 'synthesizing'",
                (output, patch.to_string(), Utc::now().timestamp(), id),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit synthesis: {}", e)))?;

        if changed == 0 {
            // NotFound propagates; otherwise the execution left
            // `synthesizing` and the answer is discarded.
            self.get(id).await?;
            return Ok(false);
        }

        Ok(true)
    }
}

fn execution_from_row(row: &libsql::Row) -> Result<Execution> {
    let state_str: String = row.get(3).map_err(|e| AppError::Database(e.to_string()))?;
    let state = ExecutionState::parse(&state_str).ok_or_else(|| {
        AppError::Database(format!("Unknown execution state '{}' in database", state_str))
    })?;

    let metadata_str: String = row.get(4).map_err(|e| AppError::Database(e.to_string()))?;
    let metadata: serde_json::Value = serde_json::from_str(&metadata_str)
        .map_err(|e| AppError::Database(format!("Corrupt execution metadata: {}", e)))?;

    let created_at = timestamp_to_datetime(
        row.get::<i64>(6)
            .map_err(|e| AppError::Database(e.to_string()))?,
    )?;
    let completed_at = row
        .get::<Option<i64>>(7)
        .map_err(|e| AppError::Database(e.to_string()))?
        .map(timestamp_to_datetime)
        .transpose()?;

    Ok(Execution {
        id: row.get(0).map_err(|e| AppError::Database(e.to_string()))?,
        user_id: row.get(1).map_err(|e| AppError::Database(e.to_string()))?,
        parent_id: row
            .get::<Option<String>>(2)
            .map_err(|e| AppError::Database(e.to_string()))?,
        state,
        metadata,
        output: row
            .get::<Option<String>>(5)
            .map_err(|e| AppError::Database(e.to_string()))?,
        created_at,
        completed_at,
    })
}

fn timestamp_to_datetime(ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
        .ok_or_else(|| AppError::Database(format!("Invalid timestamp {} in database", ts)))
}
