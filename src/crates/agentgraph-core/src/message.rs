//! The immutable message driven through a graph
//!
//! A [`Message`] is the single unit of state a run carries: content, role,
//! a persistent [`StateMap`] of data, the execution state machine, and a
//! history of every mutation. Messages are never modified in place — every
//! `with_*` method clones, applies the change, and appends a
//! [`Transition`] to the history, so earlier versions stay valid and
//! `history.len()` strictly increases across mutations.
//!
//! Tool calls requested by an agent live inside `data["tool_calls"]` as an
//! ordered list of [`ToolCall`](crate::tool::ToolCall) values and are read
//! back through [`Message::tool_calls`]. Older producers used a `toolCalls`
//! key; [`Message::cleanup_legacy_fields`] migrates it idempotently.

use crate::error::{GraphError, Result};
use crate::state::StateMap;
use crate::tool::ToolCall;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Canonical data key holding the ordered tool-call list
pub const TOOL_CALLS_KEY: &str = "tool_calls";

/// Legacy data key migrated by [`Message::cleanup_legacy_fields`]
pub const LEGACY_TOOL_CALLS_KEY: &str = "toolCalls";

/// Role of the message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

/// Execution state of a run, carried on its message
///
/// Transitions follow a fixed machine:
///
/// ```text
/// Created ──▶ Running ──▶ Completed
///                │  ▲
///                ▼  │
///             Waiting ──▶ Failed
///                            ▲
/// (any non-terminal) ────────┘ / Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Created,
    Running,
    Waiting,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionState {
    /// Whether the state machine permits moving to `next`
    pub fn can_transition_to(self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        match self {
            Created => matches!(next, Running | Cancelled),
            Running => matches!(next, Waiting | Completed | Failed | Cancelled),
            Waiting => matches!(next, Running | Failed | Cancelled),
            Completed | Failed | Cancelled => false,
        }
    }

    /// Whether no further transitions are possible
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionState::Completed | ExecutionState::Failed | ExecutionState::Cancelled
        )
    }
}

/// One recorded mutation of a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    /// When the mutation happened
    pub at: DateTime<Utc>,

    /// Node responsible for the mutation, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,

    /// What changed (e.g. `state:running`, `data`, `node:greeter`)
    pub change: String,

    /// Execution state after the mutation
    pub state: ExecutionState,
}

/// Immutable message record driven through a graph run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id
    pub id: String,

    /// Textual content
    pub content: String,

    /// Author role
    pub role: MessageRole,

    /// Sender identifier
    pub from: String,

    /// Recipient identifier, when addressed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,

    /// Persistent data map (node outputs, tool calls, propagated metadata)
    pub data: StateMap,

    /// Execution state of the run carrying this message
    pub state: ExecutionState,

    /// Node the message is currently at, when inside a run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,

    /// Every mutation applied to this message lineage
    pub history: Vec<Transition>,

    /// When the message was created
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn create(role: MessageRole, content: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            role,
            from: from.into(),
            to: None,
            data: StateMap::new(),
            state: ExecutionState::Created,
            node_id: None,
            history: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>, from: impl Into<String>) -> Self {
        Self::create(MessageRole::User, content, from)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>, from: impl Into<String>) -> Self {
        Self::create(MessageRole::Assistant, content, from)
    }

    /// Create a system message
    pub fn system(content: impl Into<String>, from: impl Into<String>) -> Self {
        Self::create(MessageRole::System, content, from)
    }

    /// Create a tool message
    pub fn tool(content: impl Into<String>, from: impl Into<String>) -> Self {
        Self::create(MessageRole::Tool, content, from)
    }

    fn record(mut self, node_id: Option<String>, change: impl Into<String>) -> Self {
        self.history.push(Transition {
            at: Utc::now(),
            node_id,
            change: change.into(),
            state: self.state,
        });
        self
    }

    /// New message with the recipient set
    pub fn with_to(self, to: impl Into<String>) -> Self {
        let mut next = self;
        next.to = Some(to.into());
        next.record(None, "to")
    }

    /// New message with the content replaced
    pub fn with_content(self, content: impl Into<String>) -> Self {
        let mut next = self;
        next.content = content.into();
        next.record(None, "content")
    }

    /// New message with one data entry added or replaced
    pub fn with_data(self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        let mut next = self;
        next.data = next.data.insert(key.clone(), value);
        next.record(None, format!("data:{key}"))
    }

    /// New message with the whole data map replaced
    pub fn with_data_map(self, data: StateMap) -> Self {
        let node_id = self.node_id.clone();
        let mut next = self;
        next.data = data;
        next.record(node_id, "data")
    }

    /// New message positioned at the given node
    pub fn at_node(self, node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        let mut next = self;
        next.node_id = Some(node_id.clone());
        next.record(Some(node_id), "node")
    }

    /// New message transitioned to `state`
    ///
    /// Fails with [`GraphError::InvalidTransition`] when the state machine
    /// does not permit the move. Transitioning to the current state is a
    /// no-op.
    pub fn transition_to(self, state: ExecutionState) -> Result<Self> {
        if self.state == state {
            return Ok(self);
        }
        if !self.state.can_transition_to(state) {
            return Err(GraphError::InvalidTransition {
                from: self.state,
                to: state,
            });
        }
        let node_id = self.node_id.clone();
        let mut next = self;
        next.state = state;
        Ok(next.record(node_id, format!("state:{state:?}").to_lowercase()))
    }

    /// New message with a tool call appended to `data["tool_calls"]`
    pub fn with_tool_call(self, tool_call: ToolCall) -> Self {
        let mut calls = self.tool_calls();
        calls.push(tool_call);
        let encoded = serde_json::to_value(&calls).unwrap_or(Value::Array(Vec::new()));
        self.with_data(TOOL_CALLS_KEY, encoded)
    }

    /// The ordered tool calls carried in `data["tool_calls"]`
    ///
    /// Entries that fail to decode are skipped.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.data
            .get(TOOL_CALLS_KEY)
            .and_then(Value::as_array)
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|c| serde_json::from_value(c.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether any tool calls are present
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }

    /// Migrate the legacy `toolCalls` data key into `tool_calls`
    ///
    /// Legacy entries are appended after any canonical entries and the
    /// legacy key is removed. Running the migration twice is a no-op.
    pub fn cleanup_legacy_fields(self) -> Self {
        let Some(legacy) = self.data.get(LEGACY_TOOL_CALLS_KEY).cloned() else {
            return self;
        };

        let mut calls = self.tool_calls();
        if let Some(entries) = legacy.as_array() {
            calls.extend(
                entries
                    .iter()
                    .filter_map(|c| serde_json::from_value::<ToolCall>(c.clone()).ok()),
            );
        }
        let encoded = serde_json::to_value(&calls).unwrap_or(Value::Array(Vec::new()));

        let mut next = self;
        next.data = next
            .data
            .remove(LEGACY_TOOL_CALLS_KEY)
            .insert(TOOL_CALLS_KEY, encoded);
        next.record(None, "migrate:tool_calls")
    }
}
