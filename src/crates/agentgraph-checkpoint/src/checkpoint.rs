//! Checkpoint data structures for pausing and resuming graph runs
//!
//! A [`Checkpoint`] is a complete snapshot of a paused run: the message the
//! run was carrying when it stopped, the node it stopped at, and (for
//! human-in-the-loop pauses) the interaction the run is waiting on. The
//! runtime serializes its own message and interaction types into
//! [`serde_json::Value`] payloads, so this crate stays storage-generic and
//! any backend that can round-trip bytes can hold a checkpoint.
//!
//! # Lifecycle
//!
//! 1. The runner pauses (human node, error with `save_on_error`, or a
//!    periodic `save_every_n_nodes` snapshot) and calls
//!    [`CheckpointStore::save`](crate::traits::CheckpointStore::save).
//! 2. The caller later loads the checkpoint by id and resumes the run.
//! 3. With `auto_cleanup` enabled, the checkpoint is deleted once the
//!    resumed run completes successfully.
//!
//! # Example
//!
//! ```rust
//! use agentgraph_checkpoint::{Checkpoint, CheckpointConfig};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! let checkpoint = Checkpoint::new(
//!     "run-1",
//!     "support-flow",
//!     "review",
//!     json!({"content": "draft", "state": "waiting"}),
//! )
//! .with_ttl(Duration::from_secs(3600));
//!
//! assert!(!checkpoint.is_expired());
//!
//! let config = CheckpointConfig::default().with_auto_cleanup(true);
//! assert!(config.auto_cleanup);
//! ```

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Checkpoint id type
pub type CheckpointId = String;

/// Snapshot of a paused graph run
///
/// The `message` payload is the full serialized run message, including its
/// state map and history; `pending_interaction` is present when the run
/// paused on a human node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique checkpoint id
    pub id: CheckpointId,

    /// Run this checkpoint belongs to; checkpoints are listable per run
    pub run_id: String,

    /// Graph the run was executing
    pub graph_id: String,

    /// Node the run was paused at
    pub current_node_id: String,

    /// Serialized message at the pause point (state map and history included)
    pub message: serde_json::Value,

    /// Serialized pending human interaction, if the pause is a HITL pause
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_interaction: Option<serde_json::Value>,

    /// When the checkpoint was created
    pub created_at: DateTime<Utc>,

    /// When the checkpoint expires; `None` means it never expires
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    /// Create a new checkpoint with a generated id
    pub fn new(
        run_id: impl Into<String>,
        graph_id: impl Into<String>,
        current_node_id: impl Into<String>,
        message: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.into(),
            graph_id: graph_id.into(),
            current_node_id: current_node_id.into(),
            message,
            pending_interaction: None,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Attach a serialized pending interaction
    pub fn with_pending_interaction(mut self, interaction: serde_json::Value) -> Self {
        self.pending_interaction = Some(interaction);
        self
    }

    /// Set an absolute expiry time
    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Set expiry relative to the creation time
    ///
    /// TTLs beyond the representable range leave the checkpoint without an
    /// expiry rather than truncating it.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expires_at = ChronoDuration::from_std(ttl)
            .ok()
            .map(|d| self.created_at + d);
        self
    }

    /// Whether the checkpoint's TTL has elapsed
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at < Utc::now(),
            None => false,
        }
    }
}

/// Checkpointing behavior for a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Time-to-live applied to saved checkpoints; `None` disables expiry
    pub ttl: Option<Duration>,

    /// Delete the checkpoint once the resumed run completes successfully
    pub auto_cleanup: bool,

    /// Also persist a checkpoint when a node fails
    pub save_on_error: bool,

    /// Persist a rolling checkpoint every N successfully executed nodes
    pub save_every_n_nodes: Option<u32>,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            ttl: None,
            auto_cleanup: true,
            save_on_error: false,
            save_every_n_nodes: None,
        }
    }
}

impl CheckpointConfig {
    /// Create a config with defaults (auto-cleanup on, no TTL)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the checkpoint TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Enable or disable auto-cleanup after successful resume
    pub fn with_auto_cleanup(mut self, auto_cleanup: bool) -> Self {
        self.auto_cleanup = auto_cleanup;
        self
    }

    /// Enable or disable checkpointing on node failure
    pub fn with_save_on_error(mut self, save_on_error: bool) -> Self {
        self.save_on_error = save_on_error;
        self
    }

    /// Persist a rolling checkpoint every `n` nodes
    pub fn with_save_every_n_nodes(mut self, n: u32) -> Self {
        self.save_every_n_nodes = Some(n);
        self
    }
}
