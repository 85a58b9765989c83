//! Error types for graph construction and execution
//!
//! Every fallible operation in the engine returns [`Result`] with
//! [`GraphError`]. Node panics and collaborator failures are converted into
//! [`GraphError::NodeExecution`] by the runner so callers always see the
//! failing node id; checkpoint and serialization errors are wrapped at the
//! crate boundary via `#[from]`.

use crate::message::ExecutionState;
use thiserror::Error;

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors produced while validating or executing a graph
#[derive(Debug, Error)]
pub enum GraphError {
    /// The graph structure is invalid (dangling edges, missing entry, cycle)
    #[error("graph validation failed: {0}")]
    Validation(String),

    /// A node's `run` failed; carries the node id and the underlying cause
    #[error("node '{node}' failed: {error}")]
    NodeExecution {
        /// Id of the failing node
        node: String,
        /// Underlying error message
        error: String,
    },

    /// A required execution-context key was absent
    #[error("missing required context key '{0}'")]
    MissingContext(String),

    /// A message attempted an illegal execution-state transition
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// State the message was in
        from: ExecutionState,
        /// State the transition targeted
        to: ExecutionState,
    },

    /// Checkpoint persistence failed or the checkpoint is missing/corrupt
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] agentgraph_checkpoint::CheckpointError),

    /// A human response was rejected by the node's validator
    #[error("human response rejected: {0}")]
    ResponseRejected(String),

    /// An operation exceeded its deadline (HITL expiry, middleware timeout)
    #[error("operation timed out after {duration_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out
        operation: String,
        /// Deadline in milliseconds
        duration_ms: u64,
    },

    /// The run was cancelled through the ambient context
    #[error("run cancelled")]
    Cancelled,

    /// A cyclic run exceeded its step budget
    #[error("step budget exceeded: {steps} steps in graph '{graph}'")]
    StepBudgetExceeded {
        /// Graph that exceeded the budget
        graph: String,
        /// Number of steps executed before the run was stopped
        steps: usize,
    },

    /// Event bus publish/subscribe failure; observable, never fails a run
    #[error("event bus error: {0}")]
    Bus(String),

    /// An unknown tool, agent, graph, or node id was referenced
    #[error("{kind} '{id}' not found")]
    NotFound {
        /// Kind of entity (tool, agent, node, checkpoint)
        kind: &'static str,
        /// The id that failed to resolve
        id: String,
    },

    /// State or payload serialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GraphError {
    /// Create a node execution error with context
    pub fn node_execution(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            error: error.into(),
        }
    }

    /// Create a not-found error for a node
    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "node",
            id: id.into(),
        }
    }
}
