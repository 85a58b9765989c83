//! Run lifecycle events published to an attached event bus
//!
//! When a graph carries an event bus, the runner publishes a [`RunEvent`]
//! for every significant transition: run start/finish, node start/finish,
//! and HITL pause/resume. Publishing is strictly best-effort — failures
//! are logged and never affect the run.

use crate::bus::{BusError, ChannelConfig, EventBus, EventBusExt, EventChannel, EventMetadata};
use crate::context::ExecutionContext;
use serde::{Deserialize, Serialize};

/// Channel lifecycle events are published on
pub const LIFECYCLE_CHANNEL: &str = "graph.lifecycle";

/// Schema version of [`RunEvent`]
pub const LIFECYCLE_SCHEMA_VERSION: u32 = 1;

/// Lifecycle event emitted by the runner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    GraphStarted {
        graph_id: String,
        run_id: String,
    },
    NodeStarted {
        graph_id: String,
        run_id: String,
        node_id: String,
    },
    NodeFinished {
        graph_id: String,
        run_id: String,
        node_id: String,
        status: String,
        duration_ms: u64,
    },
    RunPaused {
        graph_id: String,
        run_id: String,
        node_id: String,
        checkpoint_id: Option<String>,
    },
    RunResumed {
        graph_id: String,
        run_id: String,
        node_id: String,
        checkpoint_id: String,
    },
    RunCompleted {
        graph_id: String,
        run_id: String,
    },
    RunFailed {
        graph_id: String,
        run_id: String,
        node_id: Option<String>,
        error: String,
    },
}

/// Register the lifecycle schema and obtain the channel handle
pub fn lifecycle_channel(bus: &dyn EventBus) -> Result<EventChannel<RunEvent>, BusError> {
    bus.schema_registry()
        .register::<RunEvent>(LIFECYCLE_CHANNEL, LIFECYCLE_SCHEMA_VERSION);
    bus.channel::<RunEvent>(
        LIFECYCLE_CHANNEL,
        LIFECYCLE_SCHEMA_VERSION,
        ChannelConfig::new().with_history(64),
    )
}

/// Publish a lifecycle event, logging (not propagating) any failure
pub(crate) async fn publish(bus: &dyn EventBus, ctx: &ExecutionContext, event: RunEvent) {
    let channel = match lifecycle_channel(bus) {
        Ok(channel) => channel,
        Err(error) => {
            tracing::warn!(%error, "could not open lifecycle channel");
            return;
        }
    };
    if let Err(error) = bus
        .publish(&channel, &event, EventMetadata::from_context(ctx))
        .await
    {
        tracing::warn!(%error, ?event, "lifecycle event publish failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryEventBus;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_lifecycle_events_round_trip() {
        let bus = InMemoryEventBus::new();
        let channel = lifecycle_channel(&bus).unwrap();
        let mut stream = bus.subscribe(&channel, |_: &RunEvent| true).unwrap();

        let ctx = ExecutionContext::new().with("correlation_id", "corr-9");
        publish(
            &bus,
            &ctx,
            RunEvent::GraphStarted {
                graph_id: "g".to_string(),
                run_id: "r".to_string(),
            },
        )
        .await;

        let received = stream.next().await.unwrap();
        assert_eq!(
            received.event,
            RunEvent::GraphStarted {
                graph_id: "g".to_string(),
                run_id: "r".to_string(),
            }
        );
        assert_eq!(
            received.envelope.metadata.correlation_id.as_deref(),
            Some("corr-9")
        );
    }

    #[tokio::test]
    async fn test_filtered_subscription_by_event_kind() {
        let bus = InMemoryEventBus::new();
        let channel = lifecycle_channel(&bus).unwrap();
        let mut paused_only = bus
            .subscribe(&channel, |e: &RunEvent| {
                matches!(e, RunEvent::RunPaused { .. })
            })
            .unwrap();

        let ctx = ExecutionContext::new();
        publish(
            &bus,
            &ctx,
            RunEvent::NodeStarted {
                graph_id: "g".to_string(),
                run_id: "r".to_string(),
                node_id: "n".to_string(),
            },
        )
        .await;
        publish(
            &bus,
            &ctx,
            RunEvent::RunPaused {
                graph_id: "g".to_string(),
                run_id: "r".to_string(),
                node_id: "review".to_string(),
                checkpoint_id: Some("cp-1".to_string()),
            },
        )
        .await;

        let received = paused_only.next().await.unwrap();
        assert!(matches!(received.event, RunEvent::RunPaused { .. }));
    }
}
