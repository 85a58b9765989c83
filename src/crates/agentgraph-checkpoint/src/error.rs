//! Error types for checkpoint storage operations

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur while saving, loading, or cleaning up checkpoints
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// No checkpoint exists under the requested id
    #[error("checkpoint '{0}' not found")]
    NotFound(String),

    /// The checkpoint exists but its TTL has elapsed
    #[error("checkpoint '{0}' has expired")]
    Expired(String),

    /// The backing store failed (I/O, connection, corruption)
    #[error("checkpoint storage error: {0}")]
    Storage(String),

    /// Checkpoint payload could not be serialized or deserialized
    #[error("checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CheckpointError {
    /// Create a storage error with context
    pub fn storage(error: impl Into<String>) -> Self {
        Self::Storage(error.into())
    }
}
