//! Node taxonomy and per-node execution
//!
//! Nodes are a sealed set of variants dispatched by kind, not a trait
//! object hierarchy: [`Node::run`] matches on the variant and produces a
//! [`NodeResult`]. All node kinds are pure with respect to the run — they
//! read an immutable [`NodeContext`] and return a result; the runner owns
//! state propagation, pausing, and checkpointing.
//!
//! [`NodeResult`] has no public constructor other than
//! [`NodeResult::builder`], which requires a `NodeContext`. The builder
//! seeds the result's metadata with the context's tenant and correlation
//! ids, so a node cannot accidentally drop them from the propagation
//! chain.

use crate::agent::Agent;
use crate::context::{ExecutionContext, CORRELATION_ID, TENANT_ID};
use crate::error::{GraphError, Result};
use crate::hitl::HumanNodeConfig;
use crate::message::Message;
use crate::state::StateMap;
use crate::tool::{Tool, ToolContext};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Node identifier
pub type NodeId = String;

/// State key: output of the previous node
pub const PREVIOUS_KEY: &str = "_previous";
/// State key: full previous message, for metadata chaining across agents
pub const PREVIOUS_MESSAGE_KEY: &str = "_previousMessage";
/// State/data key: branch target chosen by a decision node
pub const SELECTED_BRANCH_KEY: &str = "_selectedBranch";
/// State/data key: id of the decision node that chose the branch
pub const DECISION_NODE_KEY: &str = "_decisionNodeId";
/// State/data key: name of the chosen branch
pub const BRANCH_NAME_KEY: &str = "_branchName";
/// State/data key: result id produced by an engine decision node
pub const DECISION_RESULT_KEY: &str = "_decisionResult";
/// State/data key: full human response merged on resume
pub const HUMAN_RESPONSE_KEY: &str = "_humanResponse";
/// State/data key: option selected by the human
pub const SELECTED_OPTION_KEY: &str = "_selectedOption";
/// State/data key: free-text answer from the human
pub const HUMAN_TEXT_KEY: &str = "_humanText";

/// Metadata key signalling the run should pause
pub const EXECUTION_STATE_KEY: &str = "execution_state";
/// Metadata value of [`EXECUTION_STATE_KEY`] requesting a pause
pub const WAITING: &str = "waiting";
/// Metadata key carrying the serialized pending interaction
pub const PENDING_INTERACTION_KEY: &str = "_pendingInteraction";

/// Immutable per-node execution context
///
/// Built by the runner for every step; carries the caller's
/// [`ExecutionContext`] unchanged.
#[derive(Debug, Clone)]
pub struct NodeContext {
    /// Graph being executed
    pub graph_id: String,

    /// Current run
    pub run_id: String,

    /// The message the run is carrying
    pub message: Message,

    /// Accumulated run state (node outputs plus propagated metadata)
    pub state: StateMap,

    /// Ambient caller context
    pub context: ExecutionContext,
}

/// Result of one node execution
///
/// Constructed only through [`NodeResult::builder`]; fields are read back
/// through accessors.
#[derive(Debug, Clone)]
pub struct NodeResult {
    data: Option<Value>,
    metadata: HashMap<String, Value>,
    next_edges: Option<Vec<String>>,
}

impl NodeResult {
    /// Start building a result for the given context
    ///
    /// The builder seeds metadata with `tenant_id` and `correlation_id`
    /// from the context when present.
    pub fn builder(ctx: &NodeContext) -> NodeResultBuilder {
        let mut metadata = HashMap::new();
        if let Some(tenant) = ctx.context.tenant_id() {
            metadata.insert(TENANT_ID.to_string(), Value::String(tenant));
        }
        if let Some(correlation) = ctx.context.correlation_id() {
            metadata.insert(CORRELATION_ID.to_string(), Value::String(correlation));
        }
        NodeResultBuilder {
            data: None,
            metadata,
            next_edges: None,
        }
    }

    /// The node's output payload
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Metadata the runner merges into the successor's state
    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    /// Reserved multi-successor hint; unused by the runner
    pub fn next_edges(&self) -> Option<&[String]> {
        self.next_edges.as_deref()
    }

    /// Look up a value, checking the data object first, then metadata
    ///
    /// Edge conditions use this to match on either source.
    pub fn value_of(&self, key: &str) -> Option<&Value> {
        self.data
            .as_ref()
            .and_then(|d| d.get(key))
            .or_else(|| self.metadata.get(key))
    }

    /// Whether the result requests a pause
    pub fn is_waiting(&self) -> bool {
        self.metadata
            .get(EXECUTION_STATE_KEY)
            .and_then(Value::as_str)
            == Some(WAITING)
    }
}

/// Builder returned by [`NodeResult::builder`]
#[derive(Debug)]
pub struct NodeResultBuilder {
    data: Option<Value>,
    metadata: HashMap<String, Value>,
    next_edges: Option<Vec<String>>,
}

impl NodeResultBuilder {
    /// Set the output payload
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Merge several metadata entries
    pub fn with_metadata_entries<I>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.metadata.extend(entries);
        self
    }

    /// Set the reserved multi-successor hint
    pub fn with_next_edges(mut self, edges: Vec<String>) -> Self {
        self.next_edges = Some(edges);
        self
    }

    /// Finish building
    pub fn build(self) -> NodeResult {
        NodeResult {
            data: self.data,
            metadata: self.metadata,
            next_edges: self.next_edges,
        }
    }
}

/// Extracts tool parameters from the run state
pub type StateExtractor = Arc<dyn Fn(&StateMap) -> Value + Send + Sync>;

/// Selects the terminal result of an output node from the run state
pub type OutputSelector = Arc<dyn Fn(&StateMap) -> Option<Value> + Send + Sync>;

/// Predicate a decision branch applies to the current message
pub type BranchPredicate = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// One branch of a decision node, matched in declaration order
#[derive(Clone)]
pub struct DecisionBranch {
    /// Branch name, recorded in `data["_branchName"]`
    pub name: String,

    /// Target node the matching edge should route to
    pub target: NodeId,

    /// Predicate over the current message
    pub predicate: BranchPredicate,
}

impl DecisionBranch {
    /// Create a branch
    pub fn new(
        name: impl Into<String>,
        target: impl Into<String>,
        predicate: impl Fn(&Message) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            predicate: Arc::new(predicate),
        }
    }
}

impl std::fmt::Debug for DecisionBranch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionBranch")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("predicate", &"<function>")
            .finish()
    }
}

/// Outcome of an injected decision engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionResult {
    /// Stable result id; edges match on `state["_decisionResult"]`
    pub result_id: String,

    /// Optional explanation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Policy engine consumed by engine-decision nodes
#[async_trait::async_trait]
pub trait DecisionEngine: Send + Sync {
    /// Decide a routing outcome for the given context
    async fn decide(&self, ctx: &NodeContext) -> Result<DecisionResult>;
}

/// Node kind, for reports and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Agent,
    Tool,
    Output,
    Decision,
    EngineDecision,
    Human,
}

/// A processing node in a graph
///
/// The set of kinds is closed; the runner dispatches on the variant.
#[derive(Clone)]
pub enum Node {
    /// Delegates to an [`Agent`] with the current message
    Agent {
        id: NodeId,
        agent: Arc<dyn Agent>,
    },
    /// Invokes a [`Tool`] with parameters extracted from state
    Tool {
        id: NodeId,
        tool: Arc<dyn Tool>,
        extractor: StateExtractor,
    },
    /// Terminal node computing the run result from state
    Output {
        id: NodeId,
        selector: OutputSelector,
    },
    /// Routes by evaluating branches against the current message
    Decision {
        id: NodeId,
        branches: Vec<DecisionBranch>,
        otherwise: Option<NodeId>,
    },
    /// Routes through an injected [`DecisionEngine`]
    EngineDecision {
        id: NodeId,
        engine: Arc<dyn DecisionEngine>,
    },
    /// Pauses the run for a human response
    Human {
        id: NodeId,
        config: HumanNodeConfig,
    },
}

impl Node {
    /// Create an agent node
    pub fn agent(id: impl Into<String>, agent: Arc<dyn Agent>) -> Self {
        Node::Agent {
            id: id.into(),
            agent,
        }
    }

    /// Create a tool node
    pub fn tool(
        id: impl Into<String>,
        tool: Arc<dyn Tool>,
        extractor: impl Fn(&StateMap) -> Value + Send + Sync + 'static,
    ) -> Self {
        Node::Tool {
            id: id.into(),
            tool,
            extractor: Arc::new(extractor),
        }
    }

    /// Create an output node
    pub fn output(
        id: impl Into<String>,
        selector: impl Fn(&StateMap) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        Node::Output {
            id: id.into(),
            selector: Arc::new(selector),
        }
    }

    /// Create a decision node
    pub fn decision(id: impl Into<String>, branches: Vec<DecisionBranch>) -> Self {
        Node::Decision {
            id: id.into(),
            branches,
            otherwise: None,
        }
    }

    /// Create a decision node with a default branch
    pub fn decision_with_otherwise(
        id: impl Into<String>,
        branches: Vec<DecisionBranch>,
        otherwise: impl Into<String>,
    ) -> Self {
        Node::Decision {
            id: id.into(),
            branches,
            otherwise: Some(otherwise.into()),
        }
    }

    /// Create an engine-decision node
    pub fn engine_decision(id: impl Into<String>, engine: Arc<dyn DecisionEngine>) -> Self {
        Node::EngineDecision {
            id: id.into(),
            engine,
        }
    }

    /// Create a human node
    pub fn human(id: impl Into<String>, config: HumanNodeConfig) -> Self {
        Node::Human {
            id: id.into(),
            config,
        }
    }

    /// The node's id
    pub fn id(&self) -> &str {
        match self {
            Node::Agent { id, .. }
            | Node::Tool { id, .. }
            | Node::Output { id, .. }
            | Node::Decision { id, .. }
            | Node::EngineDecision { id, .. }
            | Node::Human { id, .. } => id,
        }
    }

    /// The node's kind
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Agent { .. } => NodeKind::Agent,
            Node::Tool { .. } => NodeKind::Tool,
            Node::Output { .. } => NodeKind::Output,
            Node::Decision { .. } => NodeKind::Decision,
            Node::EngineDecision { .. } => NodeKind::EngineDecision,
            Node::Human { .. } => NodeKind::Human,
        }
    }

    /// Whether the node terminates a run (no outgoing edges allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Node::Output { .. })
    }

    /// Execute the node against the given context
    pub async fn run(&self, ctx: &NodeContext) -> Result<NodeResult> {
        match self {
            Node::Agent { id, agent } => run_agent(id, agent.as_ref(), ctx).await,
            Node::Tool {
                id,
                tool,
                extractor,
            } => run_tool(id, tool.as_ref(), extractor, ctx).await,
            Node::Output { selector, .. } => {
                let mut builder = NodeResult::builder(ctx);
                if let Some(value) = selector(&ctx.state) {
                    builder = builder.with_data(value);
                }
                Ok(builder.build())
            }
            Node::Decision {
                id,
                branches,
                otherwise,
            } => run_decision(id, branches, otherwise.as_deref(), ctx),
            Node::EngineDecision { id, engine } => {
                let decision = engine
                    .decide(ctx)
                    .await
                    .map_err(|e| GraphError::node_execution(id, e.to_string()))?;
                let mut builder = NodeResult::builder(ctx)
                    .with_data(json!({ (DECISION_RESULT_KEY): decision.result_id }))
                    .with_metadata(DECISION_RESULT_KEY, Value::String(decision.result_id));
                if let Some(reason) = decision.reason {
                    builder = builder.with_metadata("_decisionReason", Value::String(reason));
                }
                Ok(builder.build())
            }
            Node::Human { id, config } => {
                let interaction = config.interaction(id);
                let encoded = serde_json::to_value(&interaction)?;
                Ok(NodeResult::builder(ctx)
                    .with_metadata(EXECUTION_STATE_KEY, Value::String(WAITING.to_string()))
                    .with_metadata(PENDING_INTERACTION_KEY, encoded)
                    .build())
            }
        }
    }
}

async fn run_agent(id: &str, agent: &dyn Agent, ctx: &NodeContext) -> Result<NodeResult> {
    let reply = agent
        .process_message(&ctx.message)
        .await
        .map_err(|e| GraphError::node_execution(id, e.to_string()))?;

    let mut builder = NodeResult::builder(ctx)
        .with_data(Value::String(reply.content.clone()))
        // Reply data propagates to downstream state without parameter threading.
        .with_metadata_entries(reply.data.iter().map(|(k, v)| (k.clone(), v.clone())));

    let tool_calls = reply.tool_calls();
    if !tool_calls.is_empty() {
        builder = builder
            .with_metadata("tool_calls", serde_json::to_value(&tool_calls)?)
            .with_metadata("has_tool_calls", Value::Bool(true))
            .with_metadata("tool_call_count", json!(tool_calls.len()));
    }

    builder = builder.with_metadata(PREVIOUS_MESSAGE_KEY, serde_json::to_value(&reply)?);
    Ok(builder.build())
}

async fn run_tool(
    id: &str,
    tool: &dyn Tool,
    extractor: &StateExtractor,
    ctx: &NodeContext,
) -> Result<NodeResult> {
    let params = extractor(&ctx.state);
    tool.validate_params(&params)
        .map_err(|e| GraphError::node_execution(id, e.to_string()))?;

    let tool_ctx = ToolContext::new(ctx.context.clone()).with_run(&ctx.run_id, &ctx.graph_id);
    let outcome = tool
        .execute(params, &tool_ctx)
        .await
        .map_err(|e| GraphError::node_execution(id, e.to_string()))?;

    if !outcome.success {
        return Err(GraphError::node_execution(
            id,
            outcome
                .error
                .unwrap_or_else(|| format!("tool '{}' failed", tool.name())),
        ));
    }

    let mut builder = NodeResult::builder(ctx)
        .with_metadata("tool_name", Value::String(tool.name().to_string()))
        .with_metadata_entries(outcome.metadata);
    if let Some(result) = outcome.result {
        builder = builder.with_data(result);
    }
    Ok(builder.build())
}

fn run_decision(
    id: &str,
    branches: &[DecisionBranch],
    otherwise: Option<&str>,
    ctx: &NodeContext,
) -> Result<NodeResult> {
    let chosen = branches
        .iter()
        .find(|b| (b.predicate)(&ctx.message))
        .map(|b| (b.name.clone(), b.target.clone()))
        .or_else(|| otherwise.map(|t| ("otherwise".to_string(), t.to_string())));

    let Some((name, target)) = chosen else {
        return Err(GraphError::node_execution(
            id,
            "no decision branch matched and no otherwise branch exists",
        ));
    };

    tracing::debug!(node_id = id, branch = %name, target = %target, "decision branch selected");

    Ok(NodeResult::builder(ctx)
        .with_data(json!({
            (SELECTED_BRANCH_KEY): target,
            (DECISION_NODE_KEY): id,
            (BRANCH_NAME_KEY): name,
        }))
        .with_metadata(SELECTED_BRANCH_KEY, Value::String(target))
        .with_metadata(DECISION_NODE_KEY, Value::String(id.to_string()))
        .with_metadata(BRANCH_NAME_KEY, Value::String(name))
        .build())
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hitl::HumanOption;
    use crate::tool::{ParameterKind, ToolParameter, ToolResult, ToolSchema};

    fn test_ctx(message: Message, state: StateMap) -> NodeContext {
        NodeContext {
            graph_id: "graph-1".to_string(),
            run_id: "run-1".to_string(),
            message,
            state,
            context: ExecutionContext::new()
                .with(TENANT_ID, "acme")
                .with(CORRELATION_ID, "corr-7"),
        }
    }

    struct UppercaseAgent;

    #[async_trait::async_trait]
    impl Agent for UppercaseAgent {
        fn id(&self) -> &str {
            "upper"
        }

        async fn process_message(&self, message: &Message) -> Result<Message> {
            Ok(Message::assistant(message.content.to_uppercase(), self.id())
                .with_data("mood", json!("loud")))
        }
    }

    struct AddTool;

    #[async_trait::async_trait]
    impl Tool for AddTool {
        fn name(&self) -> &str {
            "add"
        }

        fn description(&self) -> &str {
            "Add two numbers"
        }

        fn schema(&self) -> ToolSchema {
            ToolSchema::new("add", "Add two numbers")
                .with_parameter(ToolParameter::required("a", ParameterKind::Number, "Left"))
                .with_parameter(ToolParameter::required("b", ParameterKind::Number, "Right"))
        }

        async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<ToolResult> {
            let a = params["a"].as_f64().unwrap_or(0.0);
            let b = params["b"].as_f64().unwrap_or(0.0);
            Ok(ToolResult::ok(json!(a + b)))
        }
    }

    #[test]
    fn test_builder_seeds_context_ids() {
        let ctx = test_ctx(Message::user("hi", "caller"), StateMap::new());
        let result = NodeResult::builder(&ctx).with_data(json!(1)).build();

        assert_eq!(result.metadata()[TENANT_ID], json!("acme"));
        assert_eq!(result.metadata()[CORRELATION_ID], json!("corr-7"));
    }

    #[tokio::test]
    async fn test_agent_node_propagates_reply_data() {
        let ctx = test_ctx(Message::user("hello", "caller"), StateMap::new());
        let node = Node::agent("upper", Arc::new(UppercaseAgent));

        let result = node.run(&ctx).await.unwrap();
        assert_eq!(result.data(), Some(&json!("HELLO")));
        assert_eq!(result.metadata()["mood"], json!("loud"));
        assert!(result.metadata().contains_key(PREVIOUS_MESSAGE_KEY));
        assert!(!result.metadata().contains_key("has_tool_calls"));
    }

    #[tokio::test]
    async fn test_agent_node_surfaces_tool_calls() {
        struct ToolCallingAgent;

        #[async_trait::async_trait]
        impl Agent for ToolCallingAgent {
            fn id(&self) -> &str {
                "caller"
            }

            async fn process_message(&self, _message: &Message) -> Result<Message> {
                Ok(Message::assistant("calling", self.id()).with_tool_call(
                    crate::tool::ToolCall {
                        id: "c1".to_string(),
                        name: "search".to_string(),
                        arguments: json!({}),
                    },
                ))
            }
        }

        let ctx = test_ctx(Message::user("go", "caller"), StateMap::new());
        let result = Node::agent("a", Arc::new(ToolCallingAgent))
            .run(&ctx)
            .await
            .unwrap();

        assert_eq!(result.metadata()["has_tool_calls"], json!(true));
        assert_eq!(result.metadata()["tool_call_count"], json!(1));
        assert!(result.metadata().contains_key("tool_calls"));
    }

    #[tokio::test]
    async fn test_tool_node_extracts_params_from_state() {
        let state = StateMap::new().insert("a", json!(2)).insert("b", json!(3));
        let ctx = test_ctx(Message::user("", "caller"), state);
        let node = Node::tool("adder", Arc::new(AddTool), |state| {
            json!({"a": state.get("a").cloned(), "b": state.get("b").cloned()})
        });

        let result = node.run(&ctx).await.unwrap();
        assert_eq!(result.data(), Some(&json!(5.0)));
        assert_eq!(result.metadata()["tool_name"], json!("add"));
    }

    #[tokio::test]
    async fn test_tool_failure_becomes_node_error() {
        struct FailingTool;

        #[async_trait::async_trait]
        impl Tool for FailingTool {
            fn name(&self) -> &str {
                "broken"
            }

            fn description(&self) -> &str {
                ""
            }

            fn schema(&self) -> ToolSchema {
                ToolSchema::new("broken", "")
            }

            async fn execute(&self, _params: Value, _ctx: &ToolContext) -> Result<ToolResult> {
                Ok(ToolResult::err("backend unavailable"))
            }
        }

        let ctx = test_ctx(Message::user("", "caller"), StateMap::new());
        let node = Node::tool("t", Arc::new(FailingTool), |_| json!({}));

        let err = node.run(&ctx).await.unwrap_err();
        assert!(matches!(err, GraphError::NodeExecution { node, .. } if node == "t"));
    }

    #[tokio::test]
    async fn test_decision_first_match_wins() {
        let msg = Message::user("hi", "caller").with_data("category", json!("billing"));
        let ctx = test_ctx(msg, StateMap::new());
        let node = Node::decision(
            "classify",
            vec![
                DecisionBranch::new("tech", "technical", |m| {
                    m.data.get_str("category") == Some("technical")
                }),
                DecisionBranch::new("bill", "billing", |m| {
                    m.data.get_str("category") == Some("billing")
                }),
            ],
        );

        let result = node.run(&ctx).await.unwrap();
        assert_eq!(result.value_of(SELECTED_BRANCH_KEY), Some(&json!("billing")));
        assert_eq!(result.value_of(BRANCH_NAME_KEY), Some(&json!("bill")));
        assert_eq!(result.value_of(DECISION_NODE_KEY), Some(&json!("classify")));
    }

    #[tokio::test]
    async fn test_decision_without_match_fails() {
        let ctx = test_ctx(Message::user("hi", "caller"), StateMap::new());
        let node = Node::decision(
            "classify",
            vec![DecisionBranch::new("never", "nowhere", |_| false)],
        );

        assert!(node.run(&ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_decision_otherwise_branch() {
        let ctx = test_ctx(Message::user("hi", "caller"), StateMap::new());
        let node = Node::decision_with_otherwise(
            "classify",
            vec![DecisionBranch::new("never", "nowhere", |_| false)],
            "default_handler",
        );

        let result = node.run(&ctx).await.unwrap();
        assert_eq!(
            result.value_of(SELECTED_BRANCH_KEY),
            Some(&json!("default_handler"))
        );
        assert_eq!(result.value_of(BRANCH_NAME_KEY), Some(&json!("otherwise")));
    }

    #[tokio::test]
    async fn test_engine_decision_sets_result_id() {
        struct StaticEngine;

        #[async_trait::async_trait]
        impl DecisionEngine for StaticEngine {
            async fn decide(&self, _ctx: &NodeContext) -> Result<DecisionResult> {
                Ok(DecisionResult {
                    result_id: "route-a".to_string(),
                    reason: Some("score above threshold".to_string()),
                })
            }
        }

        let ctx = test_ctx(Message::user("hi", "caller"), StateMap::new());
        let result = Node::engine_decision("router", Arc::new(StaticEngine))
            .run(&ctx)
            .await
            .unwrap();

        assert_eq!(result.value_of(DECISION_RESULT_KEY), Some(&json!("route-a")));
    }

    #[tokio::test]
    async fn test_human_node_requests_pause_without_blocking() {
        let ctx = test_ctx(Message::user("draft", "caller"), StateMap::new());
        let node = Node::human(
            "review",
            HumanNodeConfig::new("Approve?")
                .with_options(vec![HumanOption::new("approve"), HumanOption::new("reject")]),
        );

        let result = node.run(&ctx).await.unwrap();
        assert!(result.is_waiting());

        let interaction: crate::hitl::HumanInteraction =
            serde_json::from_value(result.metadata()[PENDING_INTERACTION_KEY].clone()).unwrap();
        assert_eq!(interaction.node_id, "review");
        assert_eq!(interaction.options.len(), 2);
    }

    #[tokio::test]
    async fn test_output_node_selects_from_state() {
        let state = StateMap::new().insert("greeter", json!("Hello, World!"));
        let ctx = test_ctx(Message::user("", "caller"), state);
        let node = Node::output("result", |state| state.get("greeter").cloned());

        let result = node.run(&ctx).await.unwrap();
        assert_eq!(result.data(), Some(&json!("Hello, World!")));
        assert!(node.is_terminal());
    }
}
