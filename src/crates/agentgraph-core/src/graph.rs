//! Graph structure: nodes, typed edges, and the builder
//!
//! A [`Graph`] is a directed graph of [`Node`]s connected by [`Edge`]s.
//! Edges carry a condition over the source node's [`NodeResult`], an
//! ascending priority, and an optional fallback flag; the runner evaluates
//! a node's outgoing edges in priority order (declaration order breaks
//! ties) and takes the first whose condition holds, consulting fallback
//! edges only when no regular edge matched.
//!
//! Graphs are built through [`GraphBuilder`], which validates the
//! structure before handing back a `Graph`:
//!
//! ```rust
//! use agentgraph_core::graph::{Edge, Graph};
//! use agentgraph_core::node::Node;
//!
//! let graph = Graph::builder("greeting")
//!     .add_node(Node::output("result", |state| state.get("input").cloned()))
//!     .entry_point("result")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(graph.id, "greeting");
//! # let _ = Edge::direct("a", "b");
//! ```

use crate::bus::EventBus;
use crate::error::{GraphError, Result};
use crate::middleware::Middleware;
use crate::node::{Node, NodeId, NodeResult, DECISION_RESULT_KEY, SELECTED_BRANCH_KEY, SELECTED_OPTION_KEY};
use crate::validate::{self, ValidationReport};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Predicate over a source node's result deciding whether an edge is taken
pub type EdgeCondition = Arc<dyn Fn(&NodeResult) -> bool + Send + Sync>;

/// Directed transition between two nodes
#[derive(Clone)]
pub struct Edge {
    /// Source node id
    pub from: NodeId,

    /// Target node id
    pub to: NodeId,

    /// Condition over the source node's result
    pub condition: EdgeCondition,

    /// Ascending priority; lower values are evaluated first
    pub priority: i32,

    /// Fallback edges are consulted only when no regular edge matched
    pub is_fallback: bool,

    /// Optional display name
    pub name: Option<String>,
}

impl Edge {
    /// Unconditional edge
    pub fn direct(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: Arc::new(|_| true),
            priority: 0,
            is_fallback: false,
            name: None,
        }
    }

    /// Conditional edge
    pub fn when(
        from: impl Into<String>,
        to: impl Into<String>,
        condition: impl Fn(&NodeResult) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            condition: Arc::new(condition),
            ..Self::direct(from, to)
        }
    }

    /// Fallback edge, taken only when no regular edge matched
    pub fn fallback(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            is_fallback: true,
            ..Self::direct(from, to)
        }
    }

    /// Edge matching the branch a decision node selected
    ///
    /// Matches when `result["_selectedBranch"]` equals this edge's target.
    pub fn on_branch(from: impl Into<String>, to: impl Into<String>) -> Self {
        let to = to.into();
        let target = to.clone();
        Self::when(from, to, move |result| {
            result.value_of(SELECTED_BRANCH_KEY).and_then(Value::as_str) == Some(target.as_str())
        })
    }

    /// Edge matching an engine decision's stable result id
    pub fn on_decision(
        from: impl Into<String>,
        to: impl Into<String>,
        result_id: impl Into<String>,
    ) -> Self {
        let result_id = result_id.into();
        Self::when(from, to, move |result| {
            result.value_of(DECISION_RESULT_KEY).and_then(Value::as_str)
                == Some(result_id.as_str())
        })
    }

    /// Edge matching the option a human selected on resume
    pub fn on_option(
        from: impl Into<String>,
        to: impl Into<String>,
        option: impl Into<String>,
    ) -> Self {
        let option = option.into();
        Self::when(from, to, move |result| {
            result.value_of(SELECTED_OPTION_KEY).and_then(Value::as_str) == Some(option.as_str())
        })
    }

    /// Set the priority (ascending; lower evaluates first)
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Edge")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("priority", &self.priority)
            .field("is_fallback", &self.is_fallback)
            .field("name", &self.name)
            .finish()
    }
}

/// Directed graph of processing nodes
///
/// Built through [`Graph::builder`]; a successfully built graph has passed
/// structural validation.
#[derive(Clone)]
pub struct Graph {
    /// Graph id, used in reports and lifecycle events
    pub id: String,

    /// Nodes keyed by id
    pub nodes: HashMap<NodeId, Node>,

    /// Edges in declaration order
    pub edges: Vec<Edge>,

    /// Node execution starts from
    pub entry_point: NodeId,

    /// Middleware in declaration order (first registered wraps outermost)
    pub middleware: Vec<Arc<dyn Middleware>>,

    /// Whether cycles are permitted (bounded by the runner's step budget)
    pub allow_cycles: bool,

    /// Bus lifecycle events are published to, when attached
    pub event_bus: Option<Arc<dyn EventBus>>,
}

impl Graph {
    /// Start building a graph
    pub fn builder(id: impl Into<String>) -> GraphBuilder {
        GraphBuilder {
            id: id.into(),
            nodes: HashMap::new(),
            duplicate_ids: Vec::new(),
            edges: Vec::new(),
            entry_point: None,
            middleware: Vec::new(),
            allow_cycles: false,
            event_bus: None,
        }
    }

    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Outgoing edges of a node, in declaration order
    pub fn edges_from(&self, id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.from == id).collect()
    }

    /// Structural validation; pure, and safe to call repeatedly
    pub fn validate(&self) -> ValidationReport {
        validate::validate(self)
    }

    /// Whether the edge set forms a directed acyclic graph
    ///
    /// Defined independently of [`allow_cycles`](Self::allow_cycles).
    pub fn is_dag(&self) -> bool {
        validate::is_dag(self)
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut node_ids: Vec<&String> = self.nodes.keys().collect();
        node_ids.sort();
        f.debug_struct("Graph")
            .field("id", &self.id)
            .field("nodes", &node_ids)
            .field("edges", &self.edges.len())
            .field("entry_point", &self.entry_point)
            .field("allow_cycles", &self.allow_cycles)
            .field("has_event_bus", &self.event_bus.is_some())
            .finish()
    }
}

/// Builder for [`Graph`]
pub struct GraphBuilder {
    id: String,
    nodes: HashMap<NodeId, Node>,
    duplicate_ids: Vec<String>,
    edges: Vec<Edge>,
    entry_point: Option<NodeId>,
    middleware: Vec<Arc<dyn Middleware>>,
    allow_cycles: bool,
    event_bus: Option<Arc<dyn EventBus>>,
}

impl GraphBuilder {
    /// Add a node; duplicate ids are reported at build time
    pub fn add_node(mut self, node: Node) -> Self {
        let id = node.id().to_string();
        if self.nodes.insert(id.clone(), node).is_some() {
            self.duplicate_ids.push(id);
        }
        self
    }

    /// Add an edge
    pub fn add_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Set the entry point
    pub fn entry_point(mut self, id: impl Into<String>) -> Self {
        self.entry_point = Some(id.into());
        self
    }

    /// Register middleware; first registered wraps outermost
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Permit cycles (bounded by the runner's step budget)
    pub fn allow_cycles(mut self, allow: bool) -> Self {
        self.allow_cycles = allow;
        self
    }

    /// Attach an event bus for lifecycle events
    pub fn event_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Validate and build the graph
    ///
    /// Errors aggregate every structural problem found; warnings (such as
    /// unreachable nodes) are logged but do not fail the build.
    pub fn build(self) -> Result<Graph> {
        let graph = Graph {
            id: self.id,
            nodes: self.nodes,
            edges: self.edges,
            entry_point: self.entry_point.unwrap_or_default(),
            middleware: self.middleware,
            allow_cycles: self.allow_cycles,
            event_bus: self.event_bus,
        };

        let mut report = graph.validate();
        for id in &self.duplicate_ids {
            report.push_error(format!("duplicate node id '{id}'"));
        }

        for warning in report.warnings() {
            tracing::warn!(graph_id = %graph.id, "{warning}");
        }
        if !report.is_valid() {
            return Err(GraphError::Validation(report.error_summary()));
        }
        Ok(graph)
    }
}
