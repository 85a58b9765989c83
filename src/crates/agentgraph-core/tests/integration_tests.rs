//! End-to-end runner scenarios: linear chains, decision routing, HITL
//! pause/resume, metadata propagation, cycle budgets, and lifecycle events.

use agentgraph_core::{
    Agent, CheckpointConfig, CheckpointStore, Edge, ExecutionContext, ExecutionState, Graph,
    GraphError, GraphRunner, HumanNodeConfig, HumanOption, HumanResponse, InMemoryCheckpointStore,
    InMemoryEventBus, Message, Middleware, Node, NodeChain, NodeInvocation, Result, RunEvent,
    RunReport, RunStatus, RunnerConfig, StartChain, ToolCall,
};
use agentgraph_core::lifecycle::lifecycle_channel;
use agentgraph_core::EventBusExt;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

struct GreeterAgent;

#[async_trait]
impl Agent for GreeterAgent {
    fn id(&self) -> &str {
        "greeter"
    }

    async fn process_message(&self, message: &Message) -> Result<Message> {
        Ok(Message::assistant(
            format!("Hello, {}!", message.content),
            self.id(),
        ))
    }
}

/// Replies with fixed data entries, echoing the incoming content.
struct DataAgent {
    id: &'static str,
    data: Vec<(&'static str, Value)>,
}

#[async_trait]
impl Agent for DataAgent {
    fn id(&self) -> &str {
        self.id
    }

    async fn process_message(&self, message: &Message) -> Result<Message> {
        let mut reply = Message::assistant(message.content.clone(), self.id);
        for (key, value) in &self.data {
            reply = reply.with_data(*key, value.clone());
        }
        Ok(reply)
    }
}

/// Reads a key from the incoming message's data and echoes it as content.
struct ReaderAgent {
    id: &'static str,
    key: &'static str,
}

#[async_trait]
impl Agent for ReaderAgent {
    fn id(&self) -> &str {
        self.id
    }

    async fn process_message(&self, message: &Message) -> Result<Message> {
        let seen = message
            .data
            .get(self.key)
            .and_then(Value::as_str)
            .unwrap_or("<missing>")
            .to_string();
        Ok(Message::assistant(seen, self.id))
    }
}

fn review_node() -> Node {
    Node::human(
        "review",
        HumanNodeConfig::new("Approve the draft?")
            .with_options(vec![HumanOption::new("approve"), HumanOption::new("reject")]),
    )
}

fn approval_graph() -> Graph {
    Graph::builder("approval")
        .add_node(Node::agent(
            "draft",
            Arc::new(DataAgent {
                id: "draft",
                data: vec![("draft_text", json!("the draft"))],
            }),
        ))
        .add_node(review_node())
        .add_node(Node::agent(
            "publish",
            Arc::new(DataAgent {
                id: "publish",
                data: vec![("published", json!(true))],
            }),
        ))
        .add_node(Node::output("done", |state| state.get("published").cloned()))
        .add_edge(Edge::direct("draft", "review"))
        .add_edge(Edge::on_option("review", "publish", "approve"))
        .add_edge(Edge::direct("publish", "done"))
        .entry_point("draft")
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_linear_chain() {
    let graph = Graph::builder("greeting")
        .add_node(Node::agent("greeter", Arc::new(GreeterAgent)))
        .add_node(Node::output("result", |state| state.get("greeter").cloned()))
        .add_edge(Edge::direct("greeter", "result"))
        .entry_point("greeter")
        .build()
        .unwrap();

    let report = GraphRunner::new()
        .run(&graph, json!({"input": "World"}), ExecutionContext::new())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.result, Some(json!("Hello, World!")));
    assert_eq!(report.node_reports.len(), 2);
    assert_eq!(report.node_reports[0].node_id, "greeter");
    assert_eq!(report.node_reports[1].node_id, "result");
}

#[tokio::test]
async fn test_decision_routing_by_priority() {
    let graph = Graph::builder("support")
        .add_node(Node::agent(
            "classifier",
            Arc::new(DataAgent {
                id: "classifier",
                data: vec![("category", json!("billing"))],
            }),
        ))
        .add_node(Node::output("technical", |_| Some(json!("tech queue"))))
        .add_node(Node::output("billing", |_| Some(json!("billing queue"))))
        .add_edge(
            Edge::when("classifier", "technical", |r| {
                r.value_of("category").and_then(Value::as_str) == Some("technical")
            })
            .with_priority(1),
        )
        .add_edge(
            Edge::when("classifier", "billing", |r| {
                r.value_of("category").and_then(Value::as_str) == Some("billing")
            })
            .with_priority(2),
        )
        .entry_point("classifier")
        .build()
        .unwrap();

    let report = GraphRunner::new()
        .run(&graph, json!({"input": "my invoice is wrong"}), ExecutionContext::new())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Success);
    let executed: Vec<&str> = report
        .node_reports
        .iter()
        .map(|r| r.node_id.as_str())
        .collect();
    assert_eq!(executed, vec!["classifier", "billing"]);
}

#[tokio::test]
async fn test_hitl_pause_and_approve() {
    let graph = approval_graph();
    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let runner = GraphRunner::new();

    let paused = runner
        .run_with_checkpoint(
            &graph,
            json!({"content": "Draft"}),
            ExecutionContext::new(),
            Arc::clone(&store),
            CheckpointConfig::new(),
        )
        .await
        .unwrap();

    assert_eq!(paused.status, RunStatus::Paused);
    let checkpoint_id = paused.checkpoint_id.clone().unwrap();
    assert_eq!(
        paused
            .node_reports
            .iter()
            .map(|r| r.node_id.as_str())
            .collect::<Vec<_>>(),
        vec!["draft", "review"]
    );

    let interactions = runner
        .pending_interactions(&checkpoint_id, store.as_ref())
        .await
        .unwrap();
    assert_eq!(interactions.len(), 1);
    assert_eq!(interactions[0].node_id, "review");
    assert_eq!(interactions[0].options.len(), 2);

    let resumed = runner
        .resume(
            &graph,
            &checkpoint_id,
            Arc::clone(&store),
            CheckpointConfig::new(),
            Some(HumanResponse::new("review").with_selected_option("approve")),
            None,
        )
        .await
        .unwrap();

    assert_eq!(resumed.status, RunStatus::Success);
    assert_eq!(resumed.result, Some(json!(true)));
    assert_eq!(resumed.run_id, paused.run_id);
    // auto_cleanup removed the checkpoint after the successful resume.
    assert!(store.load(&checkpoint_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_hitl_reject_without_matching_edge_fails() {
    let graph = approval_graph();
    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let runner = GraphRunner::new();

    let paused = runner
        .run_with_checkpoint(
            &graph,
            json!({"content": "Draft"}),
            ExecutionContext::new(),
            Arc::clone(&store),
            CheckpointConfig::new(),
        )
        .await
        .unwrap();
    let checkpoint_id = paused.checkpoint_id.unwrap();

    let rejected = runner
        .resume(
            &graph,
            &checkpoint_id,
            Arc::clone(&store),
            CheckpointConfig::new(),
            Some(HumanResponse::new("review").with_selected_option("reject")),
            None,
        )
        .await
        .unwrap();

    assert_eq!(rejected.status, RunStatus::Failed);
    assert!(rejected.error.unwrap().contains("no outgoing edge"));
}

#[tokio::test]
async fn test_pause_without_store_persists_nothing() {
    let graph = approval_graph();
    let report = GraphRunner::new()
        .run(&graph, json!({"content": "Draft"}), ExecutionContext::new())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Paused);
    assert!(report.checkpoint_id.is_none());
}

#[tokio::test]
async fn test_metadata_propagates_across_agents() {
    let graph = Graph::builder("handoff")
        .add_node(Node::agent(
            "first",
            Arc::new(DataAgent {
                id: "first",
                data: vec![("sessionId", json!("s-1"))],
            }),
        ))
        .add_node(Node::agent(
            "second",
            Arc::new(ReaderAgent {
                id: "second",
                key: "sessionId",
            }),
        ))
        .add_node(Node::output("out", |state| state.get("second").cloned()))
        .add_edge(Edge::direct("first", "second"))
        .add_edge(Edge::direct("second", "out"))
        .entry_point("first")
        .build()
        .unwrap();

    let report = GraphRunner::new()
        .run(&graph, json!({"input": "hi"}), ExecutionContext::new())
        .await
        .unwrap();

    // The second agent saw the first agent's data with no explicit threading.
    assert_eq!(report.result, Some(json!("s-1")));
}

#[tokio::test]
async fn test_tool_calls_reach_successor_state() {
    struct ToolCallingAgent;

    #[async_trait]
    impl Agent for ToolCallingAgent {
        fn id(&self) -> &str {
            "planner"
        }

        async fn process_message(&self, _message: &Message) -> Result<Message> {
            Ok(Message::assistant("plan", self.id()).with_tool_call(ToolCall {
                id: "c1".to_string(),
                name: "search".to_string(),
                arguments: json!({"q": "docs"}),
            }))
        }
    }

    let graph = Graph::builder("planning")
        .add_node(Node::agent("planner", Arc::new(ToolCallingAgent)))
        .add_node(Node::output("out", |state| state.get("tool_calls").cloned()))
        .add_edge(Edge::direct("planner", "out"))
        .entry_point("planner")
        .build()
        .unwrap();

    let report = GraphRunner::new()
        .run(&graph, json!({"input": "go"}), ExecutionContext::new())
        .await
        .unwrap();

    let calls = report.result.unwrap();
    assert_eq!(calls[0]["name"], json!("search"));
    assert_eq!(calls[0]["id"], json!("c1"));
}

#[tokio::test]
async fn test_cycle_exhausts_step_budget() {
    let graph = Graph::builder("looper")
        .add_node(Node::agent(
            "loop",
            Arc::new(DataAgent {
                id: "loop",
                data: vec![("continue", json!(true))],
            }),
        ))
        .add_node(Node::output("done", |_| Some(json!("finished"))))
        .add_edge(Edge::when("loop", "loop", |r| {
            r.value_of("continue").and_then(Value::as_bool) == Some(true)
        }))
        .add_edge(Edge::fallback("loop", "done"))
        .entry_point("loop")
        .allow_cycles(true)
        .build()
        .unwrap();

    let runner = GraphRunner::with_config(RunnerConfig { step_budget: 5 });
    let report = runner
        .run(&graph, json!({"input": "start"}), ExecutionContext::new())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert!(report.error.unwrap().contains("step budget exceeded"));
    assert_eq!(report.node_reports.len(), 5);
    assert!(report.node_reports.iter().all(|r| r.node_id == "loop"));
}

#[tokio::test]
async fn test_validator_rejects_then_accepts() {
    let graph = Graph::builder("validated-approval")
        .add_node(Node::agent(
            "draft",
            Arc::new(DataAgent {
                id: "draft",
                data: vec![],
            }),
        ))
        .add_node(Node::human(
            "review",
            HumanNodeConfig::new("Approve?")
                .with_options(vec![HumanOption::new("approve"), HumanOption::new("reject")])
                .with_validator(|r| {
                    matches!(r.selected_option.as_deref(), Some("approve" | "reject"))
                }),
        ))
        .add_node(Node::output("done", |state| {
            state.get("_selectedOption").cloned()
        }))
        .add_edge(Edge::direct("draft", "review"))
        .add_edge(Edge::on_option("review", "done", "approve"))
        .entry_point("draft")
        .build()
        .unwrap();

    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let runner = GraphRunner::new();

    let paused = runner
        .run_with_checkpoint(
            &graph,
            json!({"content": "Draft"}),
            ExecutionContext::new(),
            Arc::clone(&store),
            CheckpointConfig::new(),
        )
        .await
        .unwrap();
    let checkpoint_id = paused.checkpoint_id.unwrap();

    let err = runner
        .resume(
            &graph,
            &checkpoint_id,
            Arc::clone(&store),
            CheckpointConfig::new(),
            Some(HumanResponse::new("review").with_selected_option("maybe")),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::ResponseRejected(_)));

    // The checkpoint is untouched; a valid response still works.
    assert!(store.load(&checkpoint_id).await.unwrap().is_some());
    let resumed = runner
        .resume(
            &graph,
            &checkpoint_id,
            Arc::clone(&store),
            CheckpointConfig::new(),
            Some(HumanResponse::new("review").with_selected_option("approve")),
            None,
        )
        .await
        .unwrap();
    assert_eq!(resumed.status, RunStatus::Success);
    assert_eq!(resumed.result, Some(json!("approve")));
}

#[tokio::test]
async fn test_empty_response_is_rejected_without_validator() {
    let graph = approval_graph();
    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let runner = GraphRunner::new();

    let paused = runner
        .run_with_checkpoint(
            &graph,
            json!({"content": "Draft"}),
            ExecutionContext::new(),
            Arc::clone(&store),
            CheckpointConfig::new(),
        )
        .await
        .unwrap();

    let err = runner
        .resume(
            &graph,
            &paused.checkpoint_id.unwrap(),
            Arc::clone(&store),
            CheckpointConfig::new(),
            Some(HumanResponse::new("review")),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::ResponseRejected(_)));
}

#[tokio::test]
async fn test_resume_expired_checkpoint_times_out() {
    let graph = approval_graph();
    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let runner = GraphRunner::new();

    let paused = runner
        .run_with_checkpoint(
            &graph,
            json!({"content": "Draft"}),
            ExecutionContext::new(),
            Arc::clone(&store),
            CheckpointConfig::new().with_ttl(std::time::Duration::from_millis(1)),
        )
        .await
        .unwrap();
    let checkpoint_id = paused.checkpoint_id.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let err = runner
        .resume(
            &graph,
            &checkpoint_id,
            Arc::clone(&store),
            CheckpointConfig::new(),
            Some(HumanResponse::new("review").with_selected_option("approve")),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Timeout { .. }));

    // The stored checkpoint was transitioned to failed.
    let stored = store.load(&checkpoint_id).await.unwrap().unwrap();
    let message: Message = serde_json::from_value(stored.message).unwrap();
    assert_eq!(message.state, ExecutionState::Failed);
}

#[tokio::test]
async fn test_decision_without_matching_branch_fails_run() {
    let graph = Graph::builder("routing")
        .add_node(Node::decision(
            "route",
            vec![agentgraph_core::DecisionBranch::new("never", "target", |_| false)],
        ))
        .add_node(Node::output("target", |_| None))
        .add_edge(Edge::on_branch("route", "target"))
        .entry_point("route")
        .build()
        .unwrap();

    let report = GraphRunner::new()
        .run(&graph, json!({"input": "x"}), ExecutionContext::new())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert!(report.error.unwrap().contains("route"));
}

#[tokio::test]
async fn test_empty_graph_rejected() {
    let err = Graph::builder("empty").build().unwrap_err();
    assert!(matches!(err, GraphError::Validation(_)));
}

struct CountingMiddleware {
    starts: AtomicU32,
    nodes: AtomicU32,
    finishes: AtomicU32,
    tenants: Mutex<Vec<Option<String>>>,
}

impl CountingMiddleware {
    fn new() -> Self {
        Self {
            starts: AtomicU32::new(0),
            nodes: AtomicU32::new(0),
            finishes: AtomicU32::new(0),
            tenants: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Middleware for CountingMiddleware {
    async fn on_start(
        &self,
        _ctx: &agentgraph_core::RunContext,
        next: StartChain<'_>,
    ) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        next.run().await
    }

    async fn on_node(
        &self,
        invocation: &NodeInvocation<'_>,
        next: NodeChain<'_, '_>,
    ) -> Result<agentgraph_core::NodeResult> {
        self.nodes.fetch_add(1, Ordering::SeqCst);
        self.tenants
            .lock()
            .unwrap()
            .push(invocation.ctx.context.tenant_id());
        next.run().await
    }

    async fn on_finish(&self, _report: &RunReport) {
        self.finishes.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_middleware_pairing_across_pause_and_resume() {
    let counters = Arc::new(CountingMiddleware::new());
    let graph = Graph::builder("counted-approval")
        .add_node(Node::agent(
            "draft",
            Arc::new(DataAgent {
                id: "draft",
                data: vec![],
            }),
        ))
        .add_node(review_node())
        .add_node(Node::output("done", |_| Some(json!("ok"))))
        .add_edge(Edge::direct("draft", "review"))
        .add_edge(Edge::on_option("review", "done", "approve"))
        .entry_point("draft")
        .middleware(counters.clone())
        .build()
        .unwrap();

    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let runner = GraphRunner::new();
    let ctx = ExecutionContext::new().with("tenant_id", "acme");

    let paused = runner
        .run_with_checkpoint(
            &graph,
            json!({"content": "Draft"}),
            ctx.clone(),
            Arc::clone(&store),
            CheckpointConfig::new(),
        )
        .await
        .unwrap();
    assert_eq!(paused.status, RunStatus::Paused);

    // Paused runs do not fire on_finish.
    assert_eq!(counters.starts.load(Ordering::SeqCst), 1);
    assert_eq!(counters.nodes.load(Ordering::SeqCst), 2);
    assert_eq!(counters.finishes.load(Ordering::SeqCst), 0);

    let resumed = runner
        .resume(
            &graph,
            &paused.checkpoint_id.unwrap(),
            Arc::clone(&store),
            CheckpointConfig::new(),
            Some(HumanResponse::new("review").with_selected_option("approve")),
            Some(ctx),
        )
        .await
        .unwrap();
    assert_eq!(resumed.status, RunStatus::Success);

    // Resume opened a fresh on_start/on_finish pair.
    assert_eq!(counters.starts.load(Ordering::SeqCst), 2);
    assert_eq!(counters.nodes.load(Ordering::SeqCst), 3);
    assert_eq!(counters.finishes.load(Ordering::SeqCst), 1);

    // Every node saw the caller's context unchanged.
    let tenants = counters.tenants.lock().unwrap();
    assert!(tenants.iter().all(|t| t.as_deref() == Some("acme")));
}

#[tokio::test]
async fn test_cancellation_between_nodes() {
    struct CancellingAgent;

    #[async_trait]
    impl Agent for CancellingAgent {
        fn id(&self) -> &str {
            "canceller"
        }

        async fn process_message(&self, message: &Message) -> Result<Message> {
            // Signals cancellation through the ambient context; the runner
            // aborts after this node completes.
            if let Some(ctx) = ExecutionContext::current() {
                ctx.cancel();
            }
            Ok(Message::assistant(message.content.clone(), self.id()))
        }
    }

    let graph = Graph::builder("cancellable")
        .add_node(Node::agent("canceller", Arc::new(CancellingAgent)))
        .add_node(Node::output("out", |_| Some(json!("never reached"))))
        .add_edge(Edge::direct("canceller", "out"))
        .entry_point("canceller")
        .build()
        .unwrap();

    let report = GraphRunner::new()
        .run(&graph, json!({"input": "x"}), ExecutionContext::new())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Cancelled);
    assert_eq!(report.node_reports.len(), 1);
}

#[tokio::test]
async fn test_lifecycle_events_published_to_bus() {
    let bus = InMemoryEventBus::new();
    let channel = lifecycle_channel(&bus).unwrap();
    let mut events = bus.subscribe(&channel, |_: &RunEvent| true).unwrap();

    let graph = Graph::builder("observed")
        .add_node(Node::agent("greeter", Arc::new(GreeterAgent)))
        .add_node(Node::output("result", |state| state.get("greeter").cloned()))
        .add_edge(Edge::direct("greeter", "result"))
        .entry_point("greeter")
        .event_bus(Arc::new(bus.clone()))
        .build()
        .unwrap();

    let report = GraphRunner::new()
        .run(&graph, json!({"input": "World"}), ExecutionContext::new())
        .await
        .unwrap();
    assert_eq!(report.status, RunStatus::Success);

    let mut kinds = Vec::new();
    for _ in 0..6 {
        let event = events.next().await.unwrap().event;
        kinds.push(match event {
            RunEvent::GraphStarted { .. } => "graph_started",
            RunEvent::NodeStarted { .. } => "node_started",
            RunEvent::NodeFinished { .. } => "node_finished",
            RunEvent::RunCompleted { .. } => "run_completed",
            _ => "other",
        });
    }
    assert_eq!(
        kinds,
        vec![
            "graph_started",
            "node_started",
            "node_finished",
            "node_started",
            "node_finished",
            "run_completed",
        ]
    );
}

#[tokio::test]
async fn test_save_every_n_nodes_rolling_checkpoints() {
    let graph = Graph::builder("rolling")
        .add_node(Node::agent(
            "a",
            Arc::new(DataAgent { id: "a", data: vec![] }),
        ))
        .add_node(Node::agent(
            "b",
            Arc::new(DataAgent { id: "b", data: vec![] }),
        ))
        .add_node(Node::agent(
            "c",
            Arc::new(DataAgent { id: "c", data: vec![] }),
        ))
        .add_node(Node::output("out", |_| Some(json!("done"))))
        .add_edge(Edge::direct("a", "b"))
        .add_edge(Edge::direct("b", "c"))
        .add_edge(Edge::direct("c", "out"))
        .entry_point("a")
        .build()
        .unwrap();

    let store = Arc::new(InMemoryCheckpointStore::new());
    let report = GraphRunner::new()
        .run_with_checkpoint(
            &graph,
            json!({"input": "x"}),
            ExecutionContext::new(),
            store.clone() as Arc<dyn CheckpointStore>,
            CheckpointConfig::new().with_save_every_n_nodes(2),
        )
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Success);
    // Four nodes executed with a snapshot every second node.
    let checkpoints = store.list_by_run(&report.run_id).await.unwrap();
    assert_eq!(checkpoints.len(), 2);
}

#[tokio::test]
async fn test_save_on_error_persists_failed_state() {
    struct FailingAgent;

    #[async_trait]
    impl Agent for FailingAgent {
        fn id(&self) -> &str {
            "broken"
        }

        async fn process_message(&self, _message: &Message) -> Result<Message> {
            Err(GraphError::node_execution("broken", "upstream 500"))
        }
    }

    let graph = Graph::builder("fragile")
        .add_node(Node::agent("broken", Arc::new(FailingAgent)))
        .add_node(Node::output("out", |_| None))
        .add_edge(Edge::direct("broken", "out"))
        .entry_point("broken")
        .build()
        .unwrap();

    let store = Arc::new(InMemoryCheckpointStore::new());
    let report = GraphRunner::new()
        .run_with_checkpoint(
            &graph,
            json!({"input": "x"}),
            ExecutionContext::new(),
            store.clone() as Arc<dyn CheckpointStore>,
            CheckpointConfig::new().with_save_on_error(true),
        )
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert!(report.error.as_ref().unwrap().contains("broken"));

    let checkpoint_id = report.checkpoint_id.unwrap();
    let stored = store.load(&checkpoint_id).await.unwrap().unwrap();
    let message: Message = serde_json::from_value(stored.message).unwrap();
    assert_eq!(message.state, ExecutionState::Failed);
}
