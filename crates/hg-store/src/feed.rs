use std::sync::{Arc, RwLock};

use hg_types::FeedId;

use crate::error::{StoreError, StoreResult};

/// One writer's append-only block log.
///
/// This is the narrow interface the object store needs from the underlying
/// replication layer: random reads by index, batched appends, and the
/// current length.
///
/// All implementations must satisfy these invariants:
/// - Appended blocks are immutable and keep their index forever.
/// - `append` is all-or-nothing for the whole batch.
/// - `append` with `expected_len = Some(n)` fails with
///   [`StoreError::Conflict`] unless the feed length is exactly `n`.
pub trait Feed: Send + Sync {
    /// The feed's public key.
    fn id(&self) -> FeedId;

    /// Number of blocks in the feed.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this session holds the feed's write capability.
    fn writable(&self) -> bool;

    /// Read block `index`.
    fn get(&self, index: u64) -> StoreResult<Vec<u8>>;

    /// Append a batch of blocks and return the new length.
    fn append(&self, blocks: &[Vec<u8>], expected_len: Option<u64>) -> StoreResult<u64>;
}

/// Shared block storage of an in-memory feed, seen by every replica.
#[derive(Default)]
pub(crate) struct MemoryLog {
    blocks: RwLock<Vec<Vec<u8>>>,
}

/// In-memory feed handle.
///
/// Several handles may share one log (replicas of a swarm); only the ones
/// created with the write capability accept appends.
pub struct MemoryFeed {
    id: FeedId,
    log: Arc<MemoryLog>,
    writable: bool,
}

impl MemoryFeed {
    /// A fresh, empty, writable feed that is not part of any swarm.
    pub fn new(id: FeedId) -> Self {
        Self::with_log(id, Arc::new(MemoryLog::default()), true)
    }

    /// A read-only empty stand-in for a feed no peer provides.
    pub fn empty(id: FeedId) -> Self {
        Self::with_log(id, Arc::new(MemoryLog::default()), false)
    }

    pub(crate) fn with_log(id: FeedId, log: Arc<MemoryLog>, writable: bool) -> Self {
        Self { id, log, writable }
    }
}

impl Feed for MemoryFeed {
    fn id(&self) -> FeedId {
        self.id
    }

    fn len(&self) -> u64 {
        self.log.blocks.read().expect("lock poisoned").len() as u64
    }

    fn writable(&self) -> bool {
        self.writable
    }

    fn get(&self, index: u64) -> StoreResult<Vec<u8>> {
        let blocks = self.log.blocks.read().expect("lock poisoned");
        blocks
            .get(index as usize)
            .cloned()
            .ok_or(StoreError::BlockOutOfRange {
                feed: self.id,
                index,
                length: blocks.len() as u64,
            })
    }

    fn append(&self, blocks: &[Vec<u8>], expected_len: Option<u64>) -> StoreResult<u64> {
        if !self.writable {
            return Err(StoreError::ReadOnly(self.id));
        }
        let mut log = self.log.blocks.write().expect("lock poisoned");
        let actual = log.len() as u64;
        if let Some(expected) = expected_len {
            if expected != actual {
                return Err(StoreError::Conflict {
                    feed: self.id,
                    expected,
                    actual,
                });
            }
        }
        log.extend(blocks.iter().cloned());
        Ok(log.len() as u64)
    }
}

impl std::fmt::Debug for MemoryFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryFeed")
            .field("id", &self.id)
            .field("len", &self.len())
            .field("writable", &self.writable)
            .finish()
    }
}
