//! Typed event bus contract and in-memory reference implementation
//!
//! The bus moves [`EventEnvelope`]s: an id, a channel name, an event type,
//! a schema version, an opaque JSON payload, and correlation metadata.
//! Typed access sits on top — an [`EventChannel<T>`] handle is only issued
//! once a schema for `(event type, version)` is registered in the bus's
//! [`SchemaRegistry`], and [`EventBusExt`] provides `publish`/`subscribe`
//! that serialize and deserialize `T` at the edge.
//!
//! Envelopes that fail to deserialize never reach subscribers; they are
//! routed to the bus's [`DeadLetterQueue`] with a reason and cause.
//! Delivery is at-least-once for implementations with ack semantics; the
//! in-memory bus is best-effort with per-channel replay of the last N
//! envelopes when history is configured. Slow subscribers drop oldest
//! events rather than blocking publishers.
//!
//! The graph runtime publishes lifecycle events through this contract when
//! a bus is attached to a graph (see [`crate::lifecycle`]); runtime
//! correctness never depends on the bus.

use crate::context::ExecutionContext;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

/// Errors surfaced by bus operations
#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// No schema registered for the channel's event type and version
    #[error("no schema registered for '{name}' version {version}")]
    SchemaNotRegistered { name: String, version: u32 },

    /// The bus has been closed
    #[error("event bus is closed")]
    Closed,

    /// Payload serialization failed on publish
    #[error("event serialization failed: {0}")]
    Serialization(String),

    /// Publishing failed for a transport-specific reason
    #[error("publish failed: {0}")]
    Publish(String),
}

/// Correlation metadata carried on every envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Correlation id linking events of one logical flow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// Id of the event that caused this one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,

    /// Free-form attributes
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attrs: HashMap<String, String>,
}

impl EventMetadata {
    /// Empty metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata seeded from an execution context's correlation id
    pub fn from_context(ctx: &ExecutionContext) -> Self {
        Self {
            correlation_id: ctx.correlation_id(),
            causation_id: None,
            attrs: HashMap::new(),
        }
    }

    /// Set the correlation id
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Set the causation id
    pub fn with_causation_id(mut self, id: impl Into<String>) -> Self {
        self.causation_id = Some(id.into());
        self
    }

    /// Attach an attribute
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }
}

/// Wire-level event record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event id
    pub id: String,

    /// Channel the event was published to
    pub channel_name: String,

    /// Registered event type name
    pub event_type: String,

    /// Schema version the payload was serialized with
    pub schema_version: u32,

    /// Opaque JSON payload
    pub payload: String,

    /// Correlation metadata
    pub metadata: EventMetadata,

    /// Publish time
    pub timestamp: DateTime<Utc>,
}

/// A decoded event together with its envelope
#[derive(Debug, Clone)]
pub struct TypedEvent<T> {
    /// The decoded event
    pub event: T,

    /// The envelope it arrived in
    pub envelope: EventEnvelope,
}

/// Typed handle to a channel; issued only for registered schemas
#[derive(Debug, Clone)]
pub struct EventChannel<T> {
    name: String,
    version: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> EventChannel<T> {
    pub(crate) fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            _marker: PhantomData,
        }
    }

    /// Channel name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schema version this handle publishes and consumes
    pub fn version(&self) -> u32 {
        self.version
    }
}

#[derive(Debug, Clone)]
struct SchemaInfo {
    type_name: &'static str,
}

/// Registry of `(event type name, version)` pairs with their Rust types
///
/// Serde supplies the actual serializer for a registered type; the
/// registry enforces that channels are only opened for schemas that were
/// registered up front.
#[derive(Default)]
pub struct SchemaRegistry {
    entries: RwLock<HashMap<(String, u32), SchemaInfo>>,
}

impl SchemaRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `(name, version)`; idempotent
    pub fn register<T: Serialize + DeserializeOwned + 'static>(
        &self,
        name: impl Into<String>,
        version: u32,
    ) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            (name.into(), version),
            SchemaInfo {
                type_name: std::any::type_name::<T>(),
            },
        );
    }

    /// Whether `(name, version)` is registered
    pub fn is_registered(&self, name: &str, version: u32) -> bool {
        self.entries
            .read()
            .unwrap()
            .contains_key(&(name.to_string(), version))
    }

    /// The Rust type name registered for `(name, version)`
    pub fn type_name(&self, name: &str, version: u32) -> Option<&'static str> {
        self.entries
            .read()
            .unwrap()
            .get(&(name.to_string(), version))
            .map(|info| info.type_name)
    }

    /// Number of registered schemas
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.read().unwrap();
        let mut keys: Vec<String> = entries
            .keys()
            .map(|(name, version)| format!("{name}@{version}"))
            .collect();
        keys.sort();
        f.debug_struct("SchemaRegistry").field("schemas", &keys).finish()
    }
}

/// An envelope that could not be delivered
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// The undeliverable envelope
    pub envelope: EventEnvelope,

    /// Why it was dead-lettered
    pub reason: String,

    /// Underlying cause, when available
    pub cause: Option<String>,

    /// When it was dead-lettered
    pub at: DateTime<Utc>,
}

/// Counters exposed by a dead letter queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DlqStats {
    /// Envelopes received so far
    pub received: u64,
}

/// Sink for envelopes that failed deserialization or delivery
#[async_trait]
pub trait DeadLetterQueue: Send + Sync {
    /// Record an undeliverable envelope
    async fn send(&self, envelope: EventEnvelope, reason: String, cause: Option<String>);

    /// Counters for inspection
    fn stats(&self) -> DlqStats;
}

/// In-memory [`DeadLetterQueue`] retaining every entry
#[derive(Default)]
pub struct InMemoryDeadLetterQueue {
    entries: Mutex<Vec<DeadLetter>>,
}

impl InMemoryDeadLetterQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded entries
    pub fn entries(&self) -> Vec<DeadLetter> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeadLetterQueue for InMemoryDeadLetterQueue {
    async fn send(&self, envelope: EventEnvelope, reason: String, cause: Option<String>) {
        tracing::warn!(
            channel = %envelope.channel_name,
            event_id = %envelope.id,
            %reason,
            "routing envelope to dead letter queue"
        );
        self.entries.lock().unwrap().push(DeadLetter {
            envelope,
            reason,
            cause,
            at: Utc::now(),
        });
    }

    fn stats(&self) -> DlqStats {
        DlqStats {
            received: self.entries.lock().unwrap().len() as u64,
        }
    }
}

/// Per-channel configuration
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Number of past envelopes replayed to new subscribers (0 = none)
    pub history: usize,

    /// Buffer size for in-flight envelopes per subscriber; when a
    /// subscriber falls further behind than this, oldest events are dropped
    pub capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            history: 0,
            capacity: 256,
        }
    }
}

impl ChannelConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay the last `n` envelopes to new subscribers
    pub fn with_history(mut self, n: usize) -> Self {
        self.history = n;
        self
    }

    /// Set the per-subscriber buffer size
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

/// Aggregate bus counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventBusStats {
    /// Envelopes accepted by `publish`
    pub published: u64,

    /// Envelopes handed to subscribers (history replays included)
    pub delivered: u64,

    /// Envelopes routed to the dead letter queue
    pub dead_lettered: u64,

    /// Channels currently open
    pub channels: usize,
}

/// Envelope-level bus contract
///
/// Object-safe; the typed layer lives in [`EventBusExt`].
#[async_trait]
pub trait EventBus: Send + Sync {
    /// The registry channels are checked against
    fn schema_registry(&self) -> &SchemaRegistry;

    /// Open (or reconfigure) a channel
    fn open_channel(
        &self,
        name: &str,
        config: ChannelConfig,
    ) -> std::result::Result<(), BusError>;

    /// Publish an envelope, returning its id
    async fn publish_envelope(
        &self,
        envelope: EventEnvelope,
    ) -> std::result::Result<String, BusError>;

    /// Subscribe to a channel's raw envelopes
    ///
    /// The stream is lazy, possibly infinite, and not restartable.
    fn subscribe_envelopes(
        &self,
        channel: &str,
    ) -> std::result::Result<BoxStream<'static, EventEnvelope>, BusError>;

    /// The bus's dead letter queue
    fn dead_letter_queue(&self) -> Arc<dyn DeadLetterQueue>;

    /// Aggregate counters
    fn stats(&self) -> EventBusStats;

    /// Close the bus; subsequent publishes fail with [`BusError::Closed`]
    async fn close(&self);
}

/// Typed convenience layer over any [`EventBus`]
#[async_trait]
pub trait EventBusExt: EventBus {
    /// Obtain a typed channel handle
    ///
    /// Fails unless a schema for `(name, version)` was registered first.
    fn channel<T: Serialize + DeserializeOwned + 'static>(
        &self,
        name: &str,
        version: u32,
        config: ChannelConfig,
    ) -> std::result::Result<EventChannel<T>, BusError> {
        if !self.schema_registry().is_registered(name, version) {
            return Err(BusError::SchemaNotRegistered {
                name: name.to_string(),
                version,
            });
        }
        self.open_channel(name, config)?;
        Ok(EventChannel::new(name, version))
    }

    /// Serialize an event into an envelope and publish it
    async fn publish<T: Serialize + Send + Sync>(
        &self,
        channel: &EventChannel<T>,
        event: &T,
        metadata: EventMetadata,
    ) -> std::result::Result<String, BusError> {
        let payload =
            serde_json::to_string(event).map_err(|e| BusError::Serialization(e.to_string()))?;
        let envelope = EventEnvelope {
            id: Uuid::new_v4().to_string(),
            channel_name: channel.name().to_string(),
            event_type: channel.name().to_string(),
            schema_version: channel.version(),
            payload,
            metadata,
            timestamp: Utc::now(),
        };
        self.publish_envelope(envelope).await
    }

    /// Subscribe to decoded events matching `filter`
    ///
    /// Envelopes that fail to decode are routed to the dead letter queue
    /// and never observed by the subscriber.
    fn subscribe<T, F>(
        &self,
        channel: &EventChannel<T>,
        filter: F,
    ) -> std::result::Result<BoxStream<'static, TypedEvent<T>>, BusError>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let raw = self.subscribe_envelopes(channel.name())?;
        let dlq = self.dead_letter_queue();
        let version = channel.version();

        let stream = async_stream::stream! {
            let mut raw = raw;
            while let Some(envelope) = futures::StreamExt::next(&mut raw).await {
                if envelope.schema_version != version {
                    dlq.send(
                        envelope,
                        "schema version mismatch".to_string(),
                        None,
                    )
                    .await;
                    continue;
                }
                match serde_json::from_str::<T>(&envelope.payload) {
                    Ok(event) => {
                        if filter(&event) {
                            yield TypedEvent { event, envelope };
                        }
                    }
                    Err(error) => {
                        dlq.send(
                            envelope,
                            "payload deserialization failed".to_string(),
                            Some(error.to_string()),
                        )
                        .await;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl<B: EventBus + ?Sized> EventBusExt for B {}

struct ChannelState {
    sender: broadcast::Sender<EventEnvelope>,
    history: Mutex<VecDeque<EventEnvelope>>,
    config: ChannelConfig,
}

struct BusInner {
    registry: SchemaRegistry,
    channels: RwLock<HashMap<String, Arc<ChannelState>>>,
    dlq: Arc<InMemoryDeadLetterQueue>,
    published: AtomicU64,
    delivered: AtomicU64,
    closed: AtomicBool,
}

/// In-memory [`EventBus`] on tokio broadcast channels
///
/// Reference implementation used by tests and single-process deployments.
/// Slow subscribers drop oldest envelopes; publishers never block.
#[derive(Clone)]
pub struct InMemoryEventBus {
    inner: Arc<BusInner>,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventBus {
    /// Create a bus with an empty schema registry
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                registry: SchemaRegistry::new(),
                channels: RwLock::new(HashMap::new()),
                dlq: Arc::new(InMemoryDeadLetterQueue::new()),
                published: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// The in-memory dead letter queue, with inspection helpers
    pub fn dlq(&self) -> Arc<InMemoryDeadLetterQueue> {
        Arc::clone(&self.inner.dlq)
    }

    fn channel_state(&self, name: &str, config: Option<ChannelConfig>) -> Arc<ChannelState> {
        let mut channels = self.inner.channels.write().unwrap();
        match channels.get(name) {
            Some(state) => Arc::clone(state),
            None => {
                let config = config.unwrap_or_default();
                let (sender, _) = broadcast::channel(config.capacity.max(1));
                let state = Arc::new(ChannelState {
                    sender,
                    history: Mutex::new(VecDeque::new()),
                    config,
                });
                channels.insert(name.to_string(), Arc::clone(&state));
                state
            }
        }
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    fn schema_registry(&self) -> &SchemaRegistry {
        &self.inner.registry
    }

    fn open_channel(
        &self,
        name: &str,
        config: ChannelConfig,
    ) -> std::result::Result<(), BusError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        self.channel_state(name, Some(config));
        Ok(())
    }

    async fn publish_envelope(
        &self,
        envelope: EventEnvelope,
    ) -> std::result::Result<String, BusError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }

        let state = self.channel_state(&envelope.channel_name, None);
        if state.config.history > 0 {
            let mut history = state.history.lock().unwrap();
            history.push_back(envelope.clone());
            while history.len() > state.config.history {
                history.pop_front();
            }
        }

        let id = envelope.id.clone();
        // No receivers is not an error; history still records the event.
        let _ = state.sender.send(envelope);
        self.inner.published.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    fn subscribe_envelopes(
        &self,
        channel: &str,
    ) -> std::result::Result<BoxStream<'static, EventEnvelope>, BusError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }

        let state = self.channel_state(channel, None);
        let replay: Vec<EventEnvelope> =
            state.history.lock().unwrap().iter().cloned().collect();
        let receiver = state.sender.subscribe();
        let inner = Arc::clone(&self.inner);

        // Lagged receivers resume past the dropped events (drop-oldest).
        let live = BroadcastStream::new(receiver)
            .filter_map(|received| futures::future::ready(received.ok()));
        let stream = futures::stream::iter(replay)
            .chain(live)
            .inspect(move |_| {
                inner.delivered.fetch_add(1, Ordering::SeqCst);
            });
        Ok(Box::pin(stream))
    }

    fn dead_letter_queue(&self) -> Arc<dyn DeadLetterQueue> {
        Arc::clone(&self.inner.dlq) as Arc<dyn DeadLetterQueue>
    }

    fn stats(&self) -> EventBusStats {
        EventBusStats {
            published: self.inner.published.load(Ordering::SeqCst),
            delivered: self.inner.delivered.load(Ordering::SeqCst),
            dead_lettered: self.inner.dlq.stats().received,
            channels: self.inner.channels.read().unwrap().len(),
        }
    }

    async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.channels.write().unwrap().clear();
    }
}

impl std::fmt::Debug for InMemoryEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventBus")
            .field("stats", &self.stats())
            .finish()
    }
}
