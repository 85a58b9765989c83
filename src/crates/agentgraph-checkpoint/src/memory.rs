//! In-memory checkpoint store for development and testing
//!
//! [`InMemoryCheckpointStore`] keeps all checkpoints in a
//! `tokio::sync::RwLock<HashMap>`. It implements the full
//! [`CheckpointStore`] contract and is the store the integration tests run
//! against; data does not survive a process restart, so production
//! deployments should use a database-backed implementation instead.
//!
//! # Example
//!
//! ```rust
//! use agentgraph_checkpoint::{Checkpoint, CheckpointStore, InMemoryCheckpointStore};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> agentgraph_checkpoint::Result<()> {
//! let store = InMemoryCheckpointStore::new();
//!
//! let checkpoint = Checkpoint::new("run-1", "graph-1", "review", json!({}));
//! let id = checkpoint.id.clone();
//! store.save(checkpoint).await?;
//!
//! assert!(store.load(&id).await?.is_some());
//! assert_eq!(store.list_by_run("run-1").await?.len(), 1);
//!
//! store.delete(&id).await?;
//! assert!(store.load(&id).await?.is_none());
//! # Ok(())
//! # }
//! ```

use crate::checkpoint::Checkpoint;
use crate::error::Result;
use crate::traits::CheckpointStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Thread-safe in-memory [`CheckpointStore`]
///
/// Clones share the same underlying storage.
#[derive(Clone, Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: Arc<RwLock<HashMap<String, Checkpoint>>>,
}

impl InMemoryCheckpointStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of checkpoints currently held
    pub async fn checkpoint_count(&self) -> usize {
        self.checkpoints.read().await.len()
    }

    /// Remove every checkpoint; intended for test isolation
    pub async fn clear(&self) {
        self.checkpoints.write().await.clear();
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.insert(checkpoint.id.clone(), checkpoint);
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Checkpoint>> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints.get(id).cloned())
    }

    async fn list_by_run(&self, run_id: &str) -> Result<Vec<Checkpoint>> {
        let checkpoints = self.checkpoints.read().await;
        let mut matching: Vec<Checkpoint> = checkpoints
            .values()
            .filter(|c| c.run_id == run_id)
            .cloned()
            .collect();
        matching.sort_by_key(|c| c.created_at);
        Ok(matching)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.remove(id);
        Ok(())
    }

    async fn delete_by_run(&self, run_id: &str) -> Result<()> {
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.retain(|_, c| c.run_id != run_id);
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        let mut checkpoints = self.checkpoints.write().await;
        let before = checkpoints.len();
        checkpoints.retain(|_, c| !c.is_expired());
        Ok(before - checkpoints.len())
    }
}

impl std::fmt::Debug for InMemoryCheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCheckpointStore").finish()
    }
}
