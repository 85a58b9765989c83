//! # agentgraph-core - Graph execution engine for multi-agent orchestration
//!
//! `agentgraph-core` drives a single immutable message through a directed
//! graph of heterogeneous processing nodes: LLM agents, tools, decisions,
//! human-approval pauses, and outputs. It provides:
//!
//! - **Graph model & validation** - typed edges with condition predicates,
//!   priorities, and fallbacks; structural validation before any node runs
//! - **One-node-at-a-time execution** - deterministic traversal given node
//!   outputs, with a step budget bounding cyclic graphs
//! - **Immutable state** - a persistent copy-on-write state map and a
//!   message whose every mutation is recorded in its history
//! - **Middleware onion** - `on_start`/`on_node`/`on_finish` composition
//!   with retry, skip, continue, logging, and timeout built-ins
//! - **Pause/resume (HITL)** - human nodes pause the run into a checkpoint;
//!   resuming merges the human response and continues at the successor
//! - **Event bus contract** - schema-checked typed channels, dead letter
//!   queue, and runner lifecycle events
//! - **Tool registry** - namespaced catalog exporting OpenAI function specs
//!
//! ## Quick start
//!
//! ```rust
//! use agentgraph_core::{
//!     Agent, ExecutionContext, Graph, GraphRunner, Message, Node, Result,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! struct Greeter;
//!
//! #[async_trait::async_trait]
//! impl Agent for Greeter {
//!     fn id(&self) -> &str {
//!         "greeter"
//!     }
//!
//!     async fn process_message(&self, message: &Message) -> Result<Message> {
//!         Ok(Message::assistant(format!("Hello, {}!", message.content), self.id()))
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<()> {
//! let graph = Graph::builder("greeting")
//!     .add_node(Node::agent("greeter", Arc::new(Greeter)))
//!     .add_node(Node::output("result", |state| state.get("greeter").cloned()))
//!     .add_edge(agentgraph_core::Edge::direct("greeter", "result"))
//!     .entry_point("greeter")
//!     .build()?;
//!
//! let report = GraphRunner::new()
//!     .run(&graph, json!({"input": "World"}), ExecutionContext::new())
//!     .await?;
//!
//! assert_eq!(report.result, Some(json!("Hello, World!")));
//! # Ok(())
//! # }
//! ```
//!
//! ## Module organization
//!
//! - [`graph`] / [`validate`] - graph structure, edges, builder, validation
//! - [`runner`] - execution, pause/resume, run reports
//! - [`node`] - the sealed node taxonomy and [`NodeResult`]
//! - [`message`] / [`state`] / [`context`] - the immutable data model
//! - [`middleware`] - the interception onion and built-ins
//! - [`hitl`] - human interactions, responses, validators
//! - [`agent`] / [`tool`] - external collaborator contracts and registry
//! - [`bus`] / [`lifecycle`] - event bus contract and run lifecycle events
//!
//! Checkpoint persistence lives in the `agentgraph-checkpoint` crate; its
//! main types are re-exported here.

pub mod agent;
pub mod bus;
pub mod context;
pub mod error;
pub mod graph;
pub mod hitl;
pub mod lifecycle;
pub mod message;
pub mod middleware;
pub mod node;
pub mod runner;
pub mod state;
pub mod tool;
pub mod validate;

pub use agent::Agent;
pub use bus::{
    BusError, ChannelConfig, DeadLetter, DeadLetterQueue, DlqStats, EventBus, EventBusExt,
    EventBusStats, EventChannel, EventEnvelope, EventMetadata, InMemoryDeadLetterQueue,
    InMemoryEventBus, SchemaRegistry, TypedEvent,
};
pub use context::ExecutionContext;
pub use error::{GraphError, Result};
pub use graph::{Edge, EdgeCondition, Graph, GraphBuilder};
pub use hitl::{HumanInteraction, HumanNodeConfig, HumanOption, HumanResponse, ResponseValidator};
pub use lifecycle::{RunEvent, LIFECYCLE_CHANNEL, LIFECYCLE_SCHEMA_VERSION};
pub use message::{ExecutionState, Message, MessageRole, Transition};
pub use middleware::{
    Backoff, ErrorDecision, ErrorPolicyMiddleware, LoggingMiddleware, Middleware, NodeChain,
    NodeInvocation, RetryPolicy, RunContext, StartChain, TimeoutMiddleware,
};
pub use node::{
    DecisionBranch, DecisionEngine, DecisionResult, Node, NodeContext, NodeId, NodeKind,
    NodeResult, NodeResultBuilder,
};
pub use runner::{GraphRunner, NodeReport, NodeStatus, RunReport, RunStatus, RunnerConfig};
pub use state::StateMap;
pub use validate::{Severity, ValidationIssue, ValidationReport};
pub use tool::{
    ParameterKind, ReplacePolicy, Tool, ToolCall, ToolContext, ToolKey, ToolParameter,
    ToolRegistration, ToolRegistry, ToolResult, ToolSchema,
};

pub use agentgraph_checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointError, CheckpointStore, InMemoryCheckpointStore,
};
