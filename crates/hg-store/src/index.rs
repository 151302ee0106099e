use std::collections::HashMap;

use tracing::{debug, warn};

use hg_types::FeedId;

use crate::error::{StoreError, StoreResult};
use crate::feed::Feed;
use crate::record::BlockRecord;

/// Largest object id a block may carry; vertex ids are signed.
pub const MAX_OBJECT_ID: u64 = i64::MAX as u64;

/// Object id -> block indices of one feed.
///
/// Built incrementally: [`refresh`](ObjectIndex::refresh) only scans the
/// blocks appended since the last call. Block lists are ascending because
/// feeds only grow.
///
/// Blocks that do not decode, or that name an id outside `0..=i64::MAX`,
/// are logged and left out of the index. Any writer of a shared feed can
/// append them, so they must not make the rest of the feed unreadable.
#[derive(Clone, Debug, Default)]
pub struct ObjectIndex {
    scanned: u64,
    blocks: HashMap<u64, Vec<u64>>,
    timestamps: Vec<u64>,
    next_id: u64,
}

impl ObjectIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every block appended since the last refresh.
    pub fn refresh(&mut self, feed: &dyn Feed) -> StoreResult<()> {
        let len = feed.len();
        if len <= self.scanned {
            return Ok(());
        }
        let from = self.scanned;
        for index in from..len {
            let indexed = BlockRecord::from_bytes(&feed.get(index)?)
                .and_then(|record| self.insert(feed.id(), index, &record));
            if let Err(e) = indexed {
                warn!(feed = %feed.id().short_hex(), block = index, error = %e, "skipping block");
                self.skip(index);
            }
        }
        debug!(
            feed = %feed.id().short_hex(),
            from,
            to = len,
            "indexed feed blocks"
        );
        self.scanned = len;
        Ok(())
    }

    fn insert(&mut self, feed: FeedId, index: u64, record: &BlockRecord) -> StoreResult<()> {
        let next = record
            .object
            .checked_add(1)
            .filter(|_| record.object <= MAX_OBJECT_ID)
            .ok_or_else(|| StoreError::CorruptBlock {
                feed,
                block: index,
                reason: format!("object id {} out of range", record.object),
            })?;
        self.blocks.entry(record.object).or_default().push(index);
        self.timestamps.push(record.timestamp);
        self.next_id = self.next_id.max(next);
        self.scanned = self.scanned.max(index + 1);
        Ok(())
    }

    fn skip(&mut self, index: u64) {
        self.timestamps.push(0);
        self.scanned = self.scanned.max(index + 1);
    }

    /// Number of feed blocks covered by the index.
    pub fn scanned(&self) -> u64 {
        self.scanned
    }

    /// Lowest id never written to the feed.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Newest block of `object` strictly below `version`.
    pub fn latest(&self, object: u64, version: u64) -> Option<u64> {
        let blocks = self.blocks.get(&object)?;
        let end = blocks.partition_point(|&b| b < version);
        end.checked_sub(1).map(|i| blocks[i])
    }

    /// Every block of `object` below `version`, oldest first.
    pub fn history(&self, object: u64, version: u64) -> Vec<u64> {
        self.blocks
            .get(&object)
            .map(|blocks| blocks.iter().copied().take_while(|&b| b < version).collect())
            .unwrap_or_default()
    }

    /// Object ids that exist at `version`, ascending.
    pub fn objects_at(&self, version: u64) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .blocks
            .iter()
            .filter(|(_, blocks)| blocks.first().is_some_and(|&b| b < version))
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn timestamp(&self, block: u64) -> Option<u64> {
        self.timestamps.get(block as usize).copied()
    }
}
