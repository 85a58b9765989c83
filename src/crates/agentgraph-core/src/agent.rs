//! Agent collaborator contract
//!
//! An [`Agent`] is an external collaborator consumed by agent nodes: it
//! receives the run's current [`Message`] and returns a reply message.
//! Concrete LLM-backed implementations (wire formats, prompt assembly,
//! provider clients) live outside this crate; the engine only depends on
//! this trait.

use crate::error::Result;
use crate::message::Message;
use crate::tool::ToolSchema;
use async_trait::async_trait;

/// Processes messages on behalf of an agent node
///
/// A reply's `content` becomes the node's data; entries in the reply's
/// `data` map (including `tool_calls`) are propagated into the run state
/// for downstream nodes.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable agent id
    fn id(&self) -> &str;

    /// Human-readable name; defaults to the id
    fn name(&self) -> &str {
        self.id()
    }

    /// What the agent does
    fn description(&self) -> &str {
        ""
    }

    /// Capability tags used for routing and discovery
    fn capabilities(&self) -> Vec<String> {
        Vec::new()
    }

    /// Whether this agent can handle the given message
    fn can_handle(&self, _message: &Message) -> bool {
        true
    }

    /// Schemas of the tools this agent may request calls for
    fn tools(&self) -> Vec<ToolSchema> {
        Vec::new()
    }

    /// Whether the agent is ready to process messages
    fn is_ready(&self) -> bool {
        true
    }

    /// Process a message and produce a reply
    async fn process_message(&self, message: &Message) -> Result<Message>;
}
