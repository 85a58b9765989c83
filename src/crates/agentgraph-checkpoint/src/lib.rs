//! # agentgraph-checkpoint - Resumable snapshots for paused graph runs
//!
//! This crate defines the persistence layer the agentgraph runtime uses for
//! pause/resume: the [`Checkpoint`] snapshot record, the [`CheckpointStore`]
//! storage contract, an [`InMemoryCheckpointStore`] reference
//! implementation, and byte-level [`serializer`] helpers.
//!
//! The crate is storage-generic: message and interaction payloads are held
//! as [`serde_json::Value`], so a store implementation needs no knowledge
//! of the runtime's own types and any backend that can round-trip bytes
//! can hold a checkpoint.
//!
//! ## Typical flow
//!
//! ```rust
//! use agentgraph_checkpoint::{
//!     Checkpoint, CheckpointConfig, CheckpointStore, InMemoryCheckpointStore,
//! };
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> agentgraph_checkpoint::Result<()> {
//! let store = InMemoryCheckpointStore::new();
//!
//! // The runtime saves a snapshot when a run pauses...
//! let checkpoint = Checkpoint::new("run-1", "approval-flow", "review", json!({}));
//! let id = checkpoint.id.clone();
//! store.save(checkpoint).await?;
//!
//! // ...and loads it back to resume.
//! let restored = store.load(&id).await?.expect("checkpoint exists");
//! assert_eq!(restored.current_node_id, "review");
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod serializer;
pub mod traits;

pub use checkpoint::{Checkpoint, CheckpointConfig, CheckpointId};
pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointStore;
pub use traits::CheckpointStore;
