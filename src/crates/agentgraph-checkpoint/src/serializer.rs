//! Byte-level checkpoint serialization
//!
//! Backends that persist raw bytes (object stores, key-value stores) can
//! use these helpers; the only requirement the runtime places on a backend
//! is a byte-faithful round trip.

use crate::checkpoint::Checkpoint;
use crate::error::Result;

/// Serialize a checkpoint to JSON bytes
pub fn to_bytes(checkpoint: &Checkpoint) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(checkpoint)?)
}

/// Deserialize a checkpoint from JSON bytes
pub fn from_bytes(bytes: &[u8]) -> Result<Checkpoint> {
    Ok(serde_json::from_slice(bytes)?)
}
