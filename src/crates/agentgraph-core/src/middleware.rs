//! Cross-cutting middleware around runs and node executions
//!
//! Middleware composes as an onion by function composition: the first
//! registered middleware wraps the second, which wraps the third, and the
//! innermost layer is the node itself. `on_start` forms one nested chain
//! entered before the first node, `on_node` wraps every node execution,
//! and `on_finish` is called in declaration order (no wrapping) once the
//! run reaches a terminal state — it does not fire for paused runs;
//! resuming starts a fresh `on_start`/`on_finish` pair.
//!
//! A middleware decides what happens when the inner chain fails:
//! propagate (default), retry with backoff, skip the node, or continue
//! with the last-known data. [`ErrorPolicyMiddleware`] packages those
//! choices; [`LoggingMiddleware`] and [`TimeoutMiddleware`] cover the
//! other common cross-cutting concerns.

use crate::context::ExecutionContext;
use crate::error::{GraphError, Result};
use crate::node::{NodeContext, NodeResult, PREVIOUS_KEY};
use crate::runner::RunReport;
use async_trait::async_trait;
use futures::future::BoxFuture;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Run-level context handed to `on_start`
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Graph being executed
    pub graph_id: String,

    /// Current run
    pub run_id: String,

    /// Ambient caller context
    pub context: ExecutionContext,
}

/// Node-level request handed to `on_node`
#[derive(Debug)]
pub struct NodeInvocation<'a> {
    /// Node about to execute
    pub node_id: &'a str,

    /// Context the node will execute with
    pub ctx: &'a NodeContext,
}

/// Innermost layer of a node chain: the node's own `run`
///
/// `'a` bounds the reference to the closure itself; `'b` bounds the
/// future it produces, which may be tied to data that outlives the
/// reference (e.g. when the reference is a short-lived borrow taken
/// just to make the call).
pub type NodeRunFn<'a, 'b> = &'a (dyn Fn() -> BoxFuture<'b, Result<NodeResult>> + Send + Sync + 'a);

/// Remaining layers of the `on_node` onion
///
/// `Copy`, so a middleware may invoke the inner chain more than once
/// (retries re-enter every inner layer).
#[derive(Clone, Copy)]
pub struct NodeChain<'a, 'b> {
    pub(crate) middleware: &'a [Arc<dyn Middleware>],
    pub(crate) invocation: &'a NodeInvocation<'a>,
    pub(crate) terminal: NodeRunFn<'a, 'b>,
}

impl<'a, 'b> NodeChain<'a, 'b> {
    /// Invoke the rest of the chain
    pub fn run(self) -> BoxFuture<'a, Result<NodeResult>>
    where
        'b: 'a,
    {
        Box::pin(async move {
            match self.middleware.split_first() {
                None => (self.terminal)().await,
                Some((head, rest)) => {
                    head.on_node(
                        self.invocation,
                        NodeChain {
                            middleware: rest,
                            ..self
                        },
                    )
                    .await
                }
            }
        })
    }
}

/// Remaining layers of the `on_start` onion
#[derive(Clone, Copy)]
pub struct StartChain<'a> {
    pub(crate) middleware: &'a [Arc<dyn Middleware>],
    pub(crate) ctx: &'a RunContext,
}

impl<'a> StartChain<'a> {
    /// Invoke the rest of the chain
    pub fn run(self) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match self.middleware.split_first() {
                None => Ok(()),
                Some((head, rest)) => {
                    head.on_start(
                        self.ctx,
                        StartChain {
                            middleware: rest,
                            ctx: self.ctx,
                        },
                    )
                    .await
                }
            }
        })
    }
}

/// Cross-cutting interceptor around run and node execution
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Wraps the start of a run; failing here aborts the run
    async fn on_start(&self, _ctx: &RunContext, next: StartChain<'_>) -> Result<()> {
        next.run().await
    }

    /// Wraps one node execution
    async fn on_node(
        &self,
        _invocation: &NodeInvocation<'_>,
        next: NodeChain<'_, '_>,
    ) -> Result<NodeResult> {
        next.run().await
    }

    /// Observes the finished run; called once per terminal run, in
    /// declaration order
    async fn on_finish(&self, _report: &RunReport) {}
}

pub(crate) async fn run_start_chain(
    middleware: &[Arc<dyn Middleware>],
    ctx: &RunContext,
) -> Result<()> {
    StartChain { middleware, ctx }.run().await
}

pub(crate) async fn run_node_chain<'a, 'b>(
    middleware: &'a [Arc<dyn Middleware>],
    invocation: &'a NodeInvocation<'a>,
    terminal: NodeRunFn<'a, 'b>,
) -> Result<NodeResult>
where
    'b: 'a,
{
    NodeChain {
        middleware,
        invocation,
        terminal,
    }
    .run()
    .await
}

/// Delay strategy between retry attempts
#[derive(Debug, Clone)]
pub enum Backoff {
    /// Same delay every attempt
    Fixed(Duration),
    /// Delay grows by a constant increment, capped
    Linear {
        initial: Duration,
        increment: Duration,
        cap: Duration,
    },
    /// Delay multiplies by a factor, capped
    Exponential {
        initial: Duration,
        factor: f64,
        cap: Duration,
    },
}

impl Backoff {
    /// Delay before retrying after `attempt` failures (zero-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Fixed(delay) => *delay,
            Backoff::Linear {
                initial,
                increment,
                cap,
            } => (*initial + *increment * attempt).min(*cap),
            Backoff::Exponential {
                initial,
                factor,
                cap,
            } => {
                let scaled = initial.as_secs_f64() * factor.powi(attempt as i32);
                Duration::from_secs_f64(scaled.min(cap.as_secs_f64()))
            }
        }
    }
}

/// Retry policy for transient node failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Delay strategy between attempts
    pub backoff: Backoff,

    /// Randomize delays by 0.5x-1.5x to avoid retry stampedes
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Exponential {
                initial: Duration::from_millis(500),
                factor: 2.0,
                cap: Duration::from_secs(30),
            },
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy with the given attempt budget and default backoff
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Set the backoff strategy
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Whether another attempt is allowed after `attempts` tries
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before the next attempt, with jitter applied when enabled
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.backoff.delay(attempt);
        if !self.jitter {
            return base;
        }
        let factor = rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_secs_f64(base.as_secs_f64() * factor)
    }
}

/// What to do when the inner node chain fails
#[derive(Debug, Clone, Default)]
pub enum ErrorDecision {
    /// Surface the error to the runner (default)
    #[default]
    Propagate,
    /// Re-run the inner chain per the policy, then propagate
    Retry(RetryPolicy),
    /// Treat the failure as success with empty data
    Skip,
    /// Treat the failure as success carrying the last-known data
    Continue,
}

/// Middleware applying an [`ErrorDecision`] to node failures
#[derive(Debug, Default)]
pub struct ErrorPolicyMiddleware {
    decision: ErrorDecision,
}

impl ErrorPolicyMiddleware {
    /// Apply the given decision to every node failure
    pub fn new(decision: ErrorDecision) -> Self {
        Self { decision }
    }

    /// Shorthand for [`ErrorDecision::Retry`]
    pub fn retry(policy: RetryPolicy) -> Self {
        Self::new(ErrorDecision::Retry(policy))
    }
}

#[async_trait]
impl Middleware for ErrorPolicyMiddleware {
    async fn on_node(
        &self,
        invocation: &NodeInvocation<'_>,
        next: NodeChain<'_, '_>,
    ) -> Result<NodeResult> {
        match &self.decision {
            ErrorDecision::Propagate => next.run().await,
            ErrorDecision::Retry(policy) => {
                let mut attempts = 0;
                loop {
                    match next.run().await {
                        Ok(result) => return Ok(result),
                        Err(error) => {
                            attempts += 1;
                            if !policy.should_retry(attempts) {
                                return Err(error);
                            }
                            let delay = policy.delay(attempts - 1);
                            tracing::warn!(
                                node_id = invocation.node_id,
                                attempts,
                                ?delay,
                                %error,
                                "retrying node after failure"
                            );
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
            ErrorDecision::Skip => match next.run().await {
                Ok(result) => Ok(result),
                Err(error) => {
                    tracing::warn!(node_id = invocation.node_id, %error, "skipping failed node");
                    Ok(NodeResult::builder(invocation.ctx).build())
                }
            },
            ErrorDecision::Continue => match next.run().await {
                Ok(result) => Ok(result),
                Err(error) => {
                    tracing::warn!(
                        node_id = invocation.node_id,
                        %error,
                        "continuing with last-known data after failure"
                    );
                    let mut builder = NodeResult::builder(invocation.ctx);
                    if let Some(previous) = invocation.ctx.state.get(PREVIOUS_KEY) {
                        builder = builder.with_data(previous.clone());
                    }
                    Ok(builder.build())
                }
            },
        }
    }
}

/// Middleware emitting tracing events for run and node lifecycle
#[derive(Debug, Default)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    /// Create the middleware
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn on_start(&self, ctx: &RunContext, next: StartChain<'_>) -> Result<()> {
        tracing::info!(graph_id = %ctx.graph_id, run_id = %ctx.run_id, "run started");
        next.run().await
    }

    async fn on_node(
        &self,
        invocation: &NodeInvocation<'_>,
        next: NodeChain<'_, '_>,
    ) -> Result<NodeResult> {
        tracing::debug!(node_id = invocation.node_id, "node starting");
        let started = Instant::now();
        let result = next.run().await;
        let elapsed = started.elapsed();
        match &result {
            Ok(_) => {
                tracing::info!(node_id = invocation.node_id, ?elapsed, "node completed");
            }
            Err(error) => {
                tracing::error!(node_id = invocation.node_id, ?elapsed, %error, "node failed");
            }
        }
        result
    }

    async fn on_finish(&self, report: &RunReport) {
        tracing::info!(
            graph_id = %report.graph_id,
            run_id = %report.run_id,
            status = ?report.status,
            nodes = report.node_reports.len(),
            "run finished"
        );
    }
}

/// Middleware imposing a per-node deadline
#[derive(Debug)]
pub struct TimeoutMiddleware {
    per_node: Duration,
}

impl TimeoutMiddleware {
    /// Fail any node that runs longer than `per_node`
    pub fn new(per_node: Duration) -> Self {
        Self { per_node }
    }
}

#[async_trait]
impl Middleware for TimeoutMiddleware {
    async fn on_node(
        &self,
        invocation: &NodeInvocation<'_>,
        next: NodeChain<'_, '_>,
    ) -> Result<NodeResult> {
        tokio::time::timeout(self.per_node, next.run())
            .await
            .map_err(|_| GraphError::Timeout {
                operation: format!("node '{}'", invocation.node_id),
                duration_ms: self.per_node.as_millis() as u64,
            })?
    }
}
