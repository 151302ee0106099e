use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// One feed block as written by the object store.
///
/// The header (`object`, `timestamp`) stays in the clear so any replica can
/// index a feed without holding keys. Only `payload` is encrypted: it is the
/// object's plaintext with a trailing checksum, then run through the
/// object's cipher if a key is registered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Object id this block (re)writes.
    pub object: u64,
    /// Write time in milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub payload: Vec<u8>,
}

impl BlockRecord {
    pub fn new(object: u64, timestamp: u64, payload: Vec<u8>) -> Self {
        Self {
            object,
            timestamp,
            payload,
        }
    }

    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn from_bytes(data: &[u8]) -> StoreResult<Self> {
        bincode::deserialize(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

/// A decoded object as read at some snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectBlock {
    /// Plaintext with the checksum stripped.
    pub data: Vec<u8>,
    /// Feed index of the block it was read from.
    pub block: u64,
    pub timestamp: u64,
}
