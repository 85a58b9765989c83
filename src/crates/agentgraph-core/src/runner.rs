//! Graph execution: traversal, state propagation, pause/resume
//!
//! [`GraphRunner`] drives one immutable [`Message`] through a validated
//! [`Graph`]: it wraps each node in the middleware onion, folds the node's
//! data and metadata into the next state snapshot, evaluates outgoing
//! edges in ascending priority (declaration order breaks ties, fallback
//! edges never preempt a regular match), and produces a [`RunReport`].
//!
//! A node signalling `execution_state = waiting` — every human node does —
//! pauses the run: the message transitions to `Waiting`, a checkpoint is
//! persisted when a store is configured, and the caller gets a `Paused`
//! report carrying the checkpoint id. [`GraphRunner::resume`] merges the
//! human response, re-enters at the paused node's matching successor edge,
//! and continues.
//!
//! Node failures produce a `Failed` report (the failing node and cause are
//! recorded); structural failures — invalid graph, missing or expired
//! checkpoint, rejected human response — surface as `Err`.
//!
//! One node executes at a time per run; concurrent runs share only the
//! thread-safe stores, registries, and buses.

use crate::context::ExecutionContext;
use crate::error::{GraphError, Result};
use crate::graph::{Edge, Graph};
use crate::hitl::{HumanInteraction, HumanResponse};
use crate::lifecycle::{self, RunEvent};
use crate::message::{ExecutionState, Message};
use crate::middleware::{self, Middleware, NodeInvocation, RunContext};
use crate::node::{
    Node, NodeContext, NodeId, NodeResult, HUMAN_RESPONSE_KEY, HUMAN_TEXT_KEY,
    PENDING_INTERACTION_KEY, PREVIOUS_KEY, SELECTED_OPTION_KEY,
};
use crate::state::StateMap;
use agentgraph_checkpoint::{Checkpoint, CheckpointConfig, CheckpointError, CheckpointStore};
use chrono::Utc;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Terminal status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run reached a terminal node
    Success,
    /// The run is waiting on a human response
    Paused,
    /// A node failed, an edge did not match, or the step budget ran out
    Failed,
    /// The caller cancelled through the ambient context
    Cancelled,
}

/// Outcome of one node execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Completed,
    Failed,
}

/// Record of one executed node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeReport {
    /// Node that executed
    pub node_id: String,

    /// Whether it completed or failed
    pub status: NodeStatus,

    /// Wall-clock execution time, middleware included
    pub duration: Duration,

    /// The node's data output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    /// Metadata the node contributed to the successor state
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata_delta: HashMap<String, Value>,

    /// Error message when the node failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Final report of a run (or of a run segment ending in a pause)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Graph that was executed
    pub graph_id: String,

    /// Run id; stable across pause and resume
    pub run_id: String,

    /// How the run ended
    pub status: RunStatus,

    /// Terminal result, present on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Checkpoint persisted for this run segment, when any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,

    /// Error description when the run failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Executed nodes in execution order
    pub node_reports: Vec<NodeReport>,
}

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Maximum nodes executed per run segment; guards cyclic graphs
    pub step_budget: usize,
}

struct Persistence {
    store: Arc<dyn CheckpointStore>,
    config: CheckpointConfig,
}

struct DriveInput {
    run_id: String,
    message: Message,
    state: StateMap,
    start_node: NodeId,
    resumed_from: Option<String>,
}

/// Executes graphs
///
/// Stateless apart from configuration; one runner can serve many
/// concurrent runs.
#[derive(Debug, Default, Clone)]
pub struct GraphRunner {
    config: RunnerConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { step_budget: 10_000 }
    }
}

impl GraphRunner {
    /// Runner with the default step budget
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner with explicit configuration
    pub fn with_config(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Execute a graph from its entry point until terminal or paused
    ///
    /// Without a store, a pause still yields a `Paused` report, but
    /// nothing is persisted and the run cannot be resumed.
    pub async fn run(
        &self,
        graph: &Graph,
        input: Value,
        ctx: ExecutionContext,
    ) -> Result<RunReport> {
        self.start(graph, input, ctx, None).await
    }

    /// Execute with checkpoint persistence on pause (and optionally on
    /// error or every N nodes, per the config)
    pub async fn run_with_checkpoint(
        &self,
        graph: &Graph,
        input: Value,
        ctx: ExecutionContext,
        store: Arc<dyn CheckpointStore>,
        config: CheckpointConfig,
    ) -> Result<RunReport> {
        self.start(graph, input, ctx, Some(Persistence { store, config }))
            .await
    }

    async fn start(
        &self,
        graph: &Graph,
        input: Value,
        ctx: ExecutionContext,
        persistence: Option<Persistence>,
    ) -> Result<RunReport> {
        let validation = graph.validate();
        if !validation.is_valid() {
            return Err(GraphError::Validation(validation.error_summary()));
        }

        let message = initial_message(input).transition_to(ExecutionState::Running)?;
        let state = message.data.clone();
        let input = DriveInput {
            run_id: Uuid::new_v4().to_string(),
            message,
            state,
            start_node: graph.entry_point.clone(),
            resumed_from: None,
        };

        ExecutionContext::scope(
            ctx.clone(),
            self.drive(graph, ctx, persistence.as_ref(), input),
        )
        .await
    }

    /// Resume a paused run from a checkpoint
    ///
    /// A [`HumanResponse`] is validated by the paused node's validator (a
    /// response with neither selection nor text is rejected unless the
    /// validator accepts it) and merged into the message before the paused
    /// node's outgoing edges are evaluated. Resuming an expired checkpoint
    /// fails with [`GraphError::Timeout`] and marks the checkpoint failed.
    pub async fn resume(
        &self,
        graph: &Graph,
        checkpoint_id: &str,
        store: Arc<dyn CheckpointStore>,
        config: CheckpointConfig,
        response: Option<HumanResponse>,
        ctx: Option<ExecutionContext>,
    ) -> Result<RunReport> {
        let validation = graph.validate();
        if !validation.is_valid() {
            return Err(GraphError::Validation(validation.error_summary()));
        }

        let checkpoint = store
            .load(checkpoint_id)
            .await?
            .ok_or_else(|| CheckpointError::NotFound(checkpoint_id.to_string()))?;

        let interaction: Option<HumanInteraction> = checkpoint
            .pending_interaction
            .clone()
            .map(serde_json::from_value)
            .transpose()?;

        let expired_at = checkpoint
            .expires_at
            .filter(|_| checkpoint.is_expired())
            .or_else(|| {
                interaction
                    .as_ref()
                    .filter(|i| i.is_expired())
                    .and_then(|i| i.expires_at)
            });
        if let Some(expired_at) = expired_at {
            self.mark_checkpoint_failed(&store, checkpoint).await;
            let overdue_ms = (Utc::now() - expired_at).num_milliseconds().max(0) as u64;
            return Err(GraphError::Timeout {
                operation: format!("resume of checkpoint '{checkpoint_id}'"),
                duration_ms: overdue_ms,
            });
        }

        let mut message: Message = serde_json::from_value(checkpoint.message.clone())?;
        if message.state != ExecutionState::Waiting {
            return Err(GraphError::Validation(format!(
                "checkpoint '{checkpoint_id}' is not paused (state {:?})",
                message.state
            )));
        }

        let node = graph
            .node(&checkpoint.current_node_id)
            .ok_or_else(|| GraphError::node_not_found(&checkpoint.current_node_id))?;

        // Validate and merge the human response before edges are evaluated.
        let mut response_entries: Vec<(String, Value)> = Vec::new();
        if let Some(response) = &response {
            let validator = match node {
                Node::Human { config, .. } => config.validator.clone(),
                _ => None,
            };
            let accepted = match &validator {
                Some(validator) => validator(response),
                None => !response.is_empty(),
            };
            if !accepted {
                return Err(GraphError::ResponseRejected(format!(
                    "response to node '{}' was rejected",
                    node.id()
                )));
            }

            response_entries.push((HUMAN_RESPONSE_KEY.to_string(), serde_json::to_value(response)?));
            if let Some(option) = &response.selected_option {
                response_entries.push((
                    SELECTED_OPTION_KEY.to_string(),
                    Value::String(option.clone()),
                ));
            }
            if let Some(text) = &response.text {
                response_entries.push((HUMAN_TEXT_KEY.to_string(), Value::String(text.clone())));
            }
        }

        let state = message.data.clone().merge(response_entries.clone());
        message = message
            .with_data_map(state.clone())
            .transition_to(ExecutionState::Running)?;

        let ctx = ctx.unwrap_or_default();
        let run_id = checkpoint.run_id.clone();

        // Pick the successor by evaluating the paused node's edges against
        // a result carrying the merged response and the full state.
        let node_ctx = NodeContext {
            graph_id: graph.id.clone(),
            run_id: run_id.clone(),
            message: message.clone(),
            state: state.clone(),
            context: ctx.clone(),
        };
        let continuation = NodeResult::builder(&node_ctx)
            .with_data(Value::Object(response_entries.into_iter().collect()))
            .with_metadata_entries(state.iter().map(|(k, v)| (k.clone(), v.clone())))
            .build();

        let outgoing = graph.edges_from(node.id());
        let next = if outgoing.is_empty() {
            None
        } else {
            match select_edge(&outgoing, &continuation) {
                Some(edge) => Some(edge.to.clone()),
                None => {
                    let error = format!(
                        "no outgoing edge of node '{}' matched the resume response",
                        node.id()
                    );
                    message.clone().transition_to(ExecutionState::Failed)?;
                    let report = RunReport {
                        graph_id: graph.id.clone(),
                        run_id,
                        status: RunStatus::Failed,
                        result: None,
                        checkpoint_id: Some(checkpoint_id.to_string()),
                        error: Some(error),
                        node_reports: Vec::new(),
                    };
                    self.finish(graph, &ctx, &report).await;
                    return Ok(report);
                }
            }
        };

        let Some(next) = next else {
            // Paused node is terminal: the resume completes the run.
            let message = message.transition_to(ExecutionState::Completed)?;
            let report = RunReport {
                graph_id: graph.id.clone(),
                run_id,
                status: RunStatus::Success,
                result: message.data.get(PREVIOUS_KEY).cloned(),
                checkpoint_id: Some(checkpoint_id.to_string()),
                error: None,
                node_reports: Vec::new(),
            };
            if config.auto_cleanup {
                store.delete(checkpoint_id).await?;
            }
            self.finish(graph, &ctx, &report).await;
            return Ok(report);
        };

        if let Some(bus) = &graph.event_bus {
            lifecycle::publish(
                bus.as_ref(),
                &ctx,
                RunEvent::RunResumed {
                    graph_id: graph.id.clone(),
                    run_id: run_id.clone(),
                    node_id: node.id().to_string(),
                    checkpoint_id: checkpoint_id.to_string(),
                },
            )
            .await;
        }

        let persistence = Persistence { store, config };
        let input = DriveInput {
            run_id,
            message,
            state,
            start_node: next,
            resumed_from: Some(checkpoint_id.to_string()),
        };
        ExecutionContext::scope(
            ctx.clone(),
            self.drive(graph, ctx, Some(&persistence), input),
        )
        .await
    }

    /// The pending interactions stored with a checkpoint (zero or one)
    pub async fn pending_interactions(
        &self,
        checkpoint_id: &str,
        store: &dyn CheckpointStore,
    ) -> Result<Vec<HumanInteraction>> {
        let checkpoint = store
            .load(checkpoint_id)
            .await?
            .ok_or_else(|| CheckpointError::NotFound(checkpoint_id.to_string()))?;
        Ok(checkpoint
            .pending_interaction
            .map(serde_json::from_value::<HumanInteraction>)
            .transpose()?
            .into_iter()
            .collect())
    }

    async fn drive(
        &self,
        graph: &Graph,
        ctx: ExecutionContext,
        persistence: Option<&Persistence>,
        input: DriveInput,
    ) -> Result<RunReport> {
        let DriveInput {
            run_id,
            mut message,
            mut state,
            start_node,
            resumed_from,
        } = input;

        let run_ctx = RunContext {
            graph_id: graph.id.clone(),
            run_id: run_id.clone(),
            context: ctx.clone(),
        };
        middleware::run_start_chain(&graph.middleware, &run_ctx).await?;

        if resumed_from.is_none() {
            if let Some(bus) = &graph.event_bus {
                lifecycle::publish(
                    bus.as_ref(),
                    &ctx,
                    RunEvent::GraphStarted {
                        graph_id: graph.id.clone(),
                        run_id: run_id.clone(),
                    },
                )
                .await;
            }
        }

        let mut node_reports: Vec<NodeReport> = Vec::new();
        let mut current = start_node;
        let mut steps = 0usize;
        let mut nodes_since_checkpoint = 0u32;

        loop {
            if ctx.is_cancelled() {
                message.transition_to(ExecutionState::Cancelled)?;
                let report = RunReport {
                    graph_id: graph.id.clone(),
                    run_id,
                    status: RunStatus::Cancelled,
                    result: None,
                    checkpoint_id: None,
                    error: Some(GraphError::Cancelled.to_string()),
                    node_reports,
                };
                self.finish(graph, &ctx, &report).await;
                return Ok(report);
            }

            if steps >= self.config.step_budget {
                let error = GraphError::StepBudgetExceeded {
                    graph: graph.id.clone(),
                    steps,
                };
                return self
                    .fail_run(graph, &ctx, persistence, run_id, message, node_reports, error)
                    .await;
            }

            let Some(node) = graph.node(&current) else {
                return Err(GraphError::node_not_found(current));
            };
            steps += 1;
            message = message.at_node(node.id());

            if let Some(bus) = &graph.event_bus {
                lifecycle::publish(
                    bus.as_ref(),
                    &ctx,
                    RunEvent::NodeStarted {
                        graph_id: graph.id.clone(),
                        run_id: run_id.clone(),
                        node_id: node.id().to_string(),
                    },
                )
                .await;
            }

            let node_ctx = NodeContext {
                graph_id: graph.id.clone(),
                run_id: run_id.clone(),
                message: message.clone(),
                state: state.clone(),
                context: ctx.clone(),
            };
            let started = Instant::now();
            let outcome = run_node_through_middleware(&graph.middleware, node, &node_ctx).await;
            let duration = started.elapsed();

            match outcome {
                Ok(result) => {
                    node_reports.push(NodeReport {
                        node_id: node.id().to_string(),
                        status: NodeStatus::Completed,
                        duration,
                        output: result.data().cloned(),
                        metadata_delta: result.metadata().clone(),
                        error: None,
                    });
                    if let Some(bus) = &graph.event_bus {
                        lifecycle::publish(
                            bus.as_ref(),
                            &ctx,
                            RunEvent::NodeFinished {
                                graph_id: graph.id.clone(),
                                run_id: run_id.clone(),
                                node_id: node.id().to_string(),
                                status: "completed".to_string(),
                                duration_ms: duration.as_millis() as u64,
                            },
                        )
                        .await;
                    }

                    // Fold the result into the next state snapshot:
                    // state[node] and _previous first, then every metadata
                    // key (metadata-to-state auto-propagation).
                    let data = result.data().cloned().unwrap_or(Value::Null);
                    state = state
                        .insert(node.id(), data.clone())
                        .insert(PREVIOUS_KEY, data)
                        .merge(result.metadata().iter().map(|(k, v)| (k.clone(), v.clone())));
                    message = message.with_data_map(state.clone());

                    if result.is_waiting() || matches!(node, Node::Human { .. }) {
                        return self
                            .pause_run(
                                graph,
                                &ctx,
                                persistence,
                                run_id,
                                node.id(),
                                message,
                                &result,
                                node_reports,
                            )
                            .await;
                    }

                    if let Some(p) = persistence {
                        if let Some(every) = p.config.save_every_n_nodes {
                            nodes_since_checkpoint += 1;
                            if nodes_since_checkpoint >= every {
                                nodes_since_checkpoint = 0;
                                let rolling = self.build_checkpoint(
                                    p,
                                    &run_id,
                                    &graph.id,
                                    node.id(),
                                    &message,
                                    None,
                                )?;
                                p.store.save(rolling).await?;
                            }
                        }
                    }

                    let outgoing = graph.edges_from(node.id());
                    if outgoing.is_empty() {
                        message.transition_to(ExecutionState::Completed)?;
                        let report = RunReport {
                            graph_id: graph.id.clone(),
                            run_id,
                            status: RunStatus::Success,
                            result: result.data().cloned(),
                            checkpoint_id: resumed_from.clone(),
                            error: None,
                            node_reports,
                        };
                        if let (Some(p), Some(resumed)) = (persistence, &resumed_from) {
                            if p.config.auto_cleanup {
                                p.store.delete(resumed).await?;
                            }
                        }
                        self.finish(graph, &ctx, &report).await;
                        return Ok(report);
                    }

                    match select_edge(&outgoing, &result) {
                        Some(edge) => {
                            tracing::debug!(
                                from = %edge.from,
                                to = %edge.to,
                                priority = edge.priority,
                                fallback = edge.is_fallback,
                                "edge taken"
                            );
                            current = edge.to.clone();
                        }
                        None => {
                            let error = GraphError::node_execution(
                                node.id(),
                                "no outgoing edge condition matched",
                            );
                            return self
                                .fail_run(
                                    graph,
                                    &ctx,
                                    persistence,
                                    run_id,
                                    message,
                                    node_reports,
                                    error,
                                )
                                .await;
                        }
                    }
                }
                Err(error) => {
                    let error = match error {
                        e @ (GraphError::NodeExecution { .. }
                        | GraphError::Timeout { .. }
                        | GraphError::Cancelled) => e,
                        other => GraphError::node_execution(node.id(), other.to_string()),
                    };
                    node_reports.push(NodeReport {
                        node_id: node.id().to_string(),
                        status: NodeStatus::Failed,
                        duration,
                        output: None,
                        metadata_delta: HashMap::new(),
                        error: Some(error.to_string()),
                    });
                    if let Some(bus) = &graph.event_bus {
                        lifecycle::publish(
                            bus.as_ref(),
                            &ctx,
                            RunEvent::NodeFinished {
                                graph_id: graph.id.clone(),
                                run_id: run_id.clone(),
                                node_id: node.id().to_string(),
                                status: "failed".to_string(),
                                duration_ms: duration.as_millis() as u64,
                            },
                        )
                        .await;
                    }
                    return self
                        .fail_run(graph, &ctx, persistence, run_id, message, node_reports, error)
                        .await;
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn pause_run(
        &self,
        graph: &Graph,
        ctx: &ExecutionContext,
        persistence: Option<&Persistence>,
        run_id: String,
        node_id: &str,
        message: Message,
        result: &NodeResult,
        node_reports: Vec<NodeReport>,
    ) -> Result<RunReport> {
        let message = message.transition_to(ExecutionState::Waiting)?;
        let interaction = result.metadata().get(PENDING_INTERACTION_KEY).cloned();

        let mut checkpoint_id = None;
        if let Some(p) = persistence {
            let checkpoint =
                self.build_checkpoint(p, &run_id, &graph.id, node_id, &message, interaction)?;
            checkpoint_id = Some(checkpoint.id.clone());
            p.store.save(checkpoint).await?;
        }

        if let Some(bus) = &graph.event_bus {
            lifecycle::publish(
                bus.as_ref(),
                ctx,
                RunEvent::RunPaused {
                    graph_id: graph.id.clone(),
                    run_id: run_id.clone(),
                    node_id: node_id.to_string(),
                    checkpoint_id: checkpoint_id.clone(),
                },
            )
            .await;
        }

        tracing::info!(
            graph_id = %graph.id,
            run_id = %run_id,
            node_id,
            checkpoint_id = checkpoint_id.as_deref().unwrap_or("<none>"),
            "run paused"
        );

        // on_finish does not fire for paused runs; resume starts a fresh
        // on_start/on_finish pair.
        Ok(RunReport {
            graph_id: graph.id.clone(),
            run_id,
            status: RunStatus::Paused,
            result: None,
            checkpoint_id,
            error: None,
            node_reports,
        })
    }

    async fn fail_run(
        &self,
        graph: &Graph,
        ctx: &ExecutionContext,
        persistence: Option<&Persistence>,
        run_id: String,
        message: Message,
        node_reports: Vec<NodeReport>,
        error: GraphError,
    ) -> Result<RunReport> {
        let message = message.transition_to(ExecutionState::Failed)?;

        let mut checkpoint_id = None;
        if let Some(p) = persistence {
            if p.config.save_on_error {
                let node_id = message.node_id.clone().unwrap_or_default();
                let checkpoint =
                    self.build_checkpoint(p, &run_id, &graph.id, &node_id, &message, None)?;
                checkpoint_id = Some(checkpoint.id.clone());
                p.store.save(checkpoint).await?;
            }
        }

        let report = RunReport {
            graph_id: graph.id.clone(),
            run_id,
            status: RunStatus::Failed,
            result: None,
            checkpoint_id,
            error: Some(error.to_string()),
            node_reports,
        };
        self.finish(graph, ctx, &report).await;
        Ok(report)
    }

    fn build_checkpoint(
        &self,
        persistence: &Persistence,
        run_id: &str,
        graph_id: &str,
        node_id: &str,
        message: &Message,
        interaction: Option<Value>,
    ) -> Result<Checkpoint> {
        let mut checkpoint =
            Checkpoint::new(run_id, graph_id, node_id, serde_json::to_value(message)?);
        if let Some(interaction) = interaction {
            checkpoint = checkpoint.with_pending_interaction(interaction);
        }
        if let Some(ttl) = persistence.config.ttl {
            checkpoint = checkpoint.with_ttl(ttl);
        }
        Ok(checkpoint)
    }

    async fn mark_checkpoint_failed(&self, store: &Arc<dyn CheckpointStore>, checkpoint: Checkpoint) {
        let mut failed = checkpoint;
        if let Ok(message) = serde_json::from_value::<Message>(failed.message.clone()) {
            if let Ok(message) = message.transition_to(ExecutionState::Failed) {
                if let Ok(encoded) = serde_json::to_value(&message) {
                    failed.message = encoded;
                }
            }
        }
        if let Err(error) = store.save(failed).await {
            tracing::warn!(%error, "could not mark expired checkpoint as failed");
        }
    }

    async fn finish(&self, graph: &Graph, ctx: &ExecutionContext, report: &RunReport) {
        for mw in &graph.middleware {
            mw.on_finish(report).await;
        }
        if let Some(bus) = &graph.event_bus {
            let event = match report.status {
                RunStatus::Success => RunEvent::RunCompleted {
                    graph_id: report.graph_id.clone(),
                    run_id: report.run_id.clone(),
                },
                RunStatus::Failed | RunStatus::Cancelled => RunEvent::RunFailed {
                    graph_id: report.graph_id.clone(),
                    run_id: report.run_id.clone(),
                    node_id: report
                        .node_reports
                        .iter()
                        .rev()
                        .find(|r| r.status == NodeStatus::Failed)
                        .map(|r| r.node_id.clone()),
                    error: report.error.clone().unwrap_or_default(),
                },
                RunStatus::Paused => return,
            };
            lifecycle::publish(bus.as_ref(), ctx, event).await;
        }
    }
}

async fn run_node_through_middleware(
    middleware: &[Arc<dyn Middleware>],
    node: &Node,
    node_ctx: &NodeContext,
) -> Result<NodeResult> {
    let invocation = NodeInvocation {
        node_id: node.id(),
        ctx: node_ctx,
    };
    let terminal = boxed_node_run(node, node_ctx);
    middleware::run_node_chain(middleware, &invocation, &terminal).await
}

fn boxed_node_run<'a>(
    node: &'a Node,
    ctx: &'a NodeContext,
) -> impl Fn() -> BoxFuture<'a, Result<NodeResult>> + Send + Sync + 'a {
    move || Box::pin(node.run(ctx))
}

/// Pick the edge to take: regular edges by ascending priority (stable on
/// declaration order), fallback edges only when no regular edge matched
fn select_edge<'a>(edges: &[&'a Edge], result: &NodeResult) -> Option<&'a Edge> {
    let by_priority = |group: Vec<&'a Edge>| {
        let mut group = group;
        group.sort_by_key(|e| e.priority);
        group
    };

    let regular = by_priority(edges.iter().filter(|e| !e.is_fallback).copied().collect());
    if let Some(edge) = regular.into_iter().find(|e| (e.condition)(result)) {
        return Some(edge);
    }
    let fallback = by_priority(edges.iter().filter(|e| e.is_fallback).copied().collect());
    fallback.into_iter().find(|e| (e.condition)(result))
}

fn initial_message(input: Value) -> Message {
    match input {
        Value::Object(map) => {
            let content = map
                .get("content")
                .or_else(|| map.get("input"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Message::user(content, "caller").with_data_map(StateMap::from(map))
        }
        Value::String(text) => {
            let data = StateMap::new().insert("input", Value::String(text.clone()));
            Message::user(text, "caller").with_data_map(data)
        }
        Value::Null => Message::user("", "caller"),
        other => {
            let data = StateMap::new().insert("input", other);
            Message::user("", "caller").with_data_map(data)
        }
    }
}
