//! Storage contract for checkpoint backends
//!
//! [`CheckpointStore`] is the abstraction the graph runtime persists paused
//! runs through. The in-memory implementation in [`crate::memory`] is the
//! reference; downstream projects can back the same trait with PostgreSQL,
//! Redis, SQLite, S3, or anything else that can store and list the
//! serialized [`Checkpoint`] records.
//!
//! # Implementation requirements
//!
//! - `save` must be atomic per checkpoint id: a reader never observes a
//!   partially written checkpoint. Concurrent saves to the same id are
//!   last-writer-wins unless the backend documents stronger semantics.
//! - `load` returns `Ok(None)` (not an error) for an unknown id.
//! - `list_by_run` returns checkpoints for one run ordered by creation time.
//! - Implementations must be `Send + Sync`; stores are shared across
//!   concurrent runs.
//!
//! # Example backend skeleton
//!
//! ```rust,ignore
//! use agentgraph_checkpoint::{Checkpoint, CheckpointStore, Result};
//! use async_trait::async_trait;
//!
//! struct PostgresCheckpointStore { pool: sqlx::PgPool }
//!
//! #[async_trait]
//! impl CheckpointStore for PostgresCheckpointStore {
//!     async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
//!         let payload = serde_json::to_value(&checkpoint)?;
//!         sqlx::query("INSERT INTO checkpoints (id, run_id, data) VALUES ($1, $2, $3) \
//!                      ON CONFLICT (id) DO UPDATE SET data = $3")
//!             .bind(&checkpoint.id)
//!             .bind(&checkpoint.run_id)
//!             .bind(&payload)
//!             .execute(&self.pool)
//!             .await
//!             .map_err(|e| agentgraph_checkpoint::CheckpointError::storage(e.to_string()))?;
//!         Ok(())
//!     }
//!
//!     // ... load / list_by_run / delete / delete_by_run / cleanup_expired ...
//! }
//! ```

use crate::checkpoint::Checkpoint;
use crate::error::Result;
use async_trait::async_trait;

/// Persistence contract for paused graph runs
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Store a checkpoint, replacing any existing checkpoint with the same id
    ///
    /// Must be atomic with respect to the checkpoint id.
    async fn save(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Load a checkpoint by id; `Ok(None)` when it does not exist
    async fn load(&self, id: &str) -> Result<Option<Checkpoint>>;

    /// List all checkpoints for a run, ordered by creation time
    async fn list_by_run(&self, run_id: &str) -> Result<Vec<Checkpoint>>;

    /// Delete a checkpoint by id; deleting a missing checkpoint is not an error
    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete every checkpoint belonging to a run
    async fn delete_by_run(&self, run_id: &str) -> Result<()>;

    /// Remove all expired checkpoints, returning how many were deleted
    async fn cleanup_expired(&self) -> Result<usize>;
}
