use std::collections::HashMap;

use tracing::debug;

use hg_crypto::{append_checksum, BlockNonce, ObjectKey};
use hg_types::FeedId;

use crate::error::{StoreError, StoreResult};
use crate::feed_store::FeedStore;
use crate::record::{BlockRecord, ObjectBlock};

/// Outcome of a committed transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    pub feed: FeedId,
    /// Feed length after the commit.
    pub version: u64,
    /// Write time stamped on every block of the commit (ms since epoch).
    pub timestamp: u64,
    /// Ids allocated by `create`, in call order.
    pub created: Vec<u64>,
    /// Version of the last block written for each object.
    pub versions: HashMap<u64, u64>,
}

struct PendingWrite {
    id: u64,
    data: Vec<u8>,
}

/// Buffered, snapshot-isolated view of one [`FeedStore`].
///
/// Reads see the feed as of `version()` plus this transaction's own
/// pending writes. Writes are applied in call order on [`commit`], which
/// appends them as one batch. The batch is rejected with
/// [`StoreError::Conflict`] if the feed moved past the snapshot.
///
/// [`commit`]: Transaction::commit
pub struct Transaction<'a> {
    store: &'a FeedStore,
    head: u64,
    next_id: u64,
    writes: Vec<PendingWrite>,
    /// Created ids and their fresh keys (`None` = public).
    creates: HashMap<u64, Option<ObjectKey>>,
    order: Vec<u64>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(store: &'a FeedStore, head: u64, next_id: u64) -> Self {
        Self {
            store,
            head,
            next_id,
            writes: Vec::new(),
            creates: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn feed(&self) -> FeedId {
        self.store.id()
    }

    /// Snapshot version this transaction reads at.
    pub fn version(&self) -> u64 {
        self.head
    }

    pub fn store(&self) -> &'a FeedStore {
        self.store
    }

    /// Object `id` as seen by this transaction.
    pub fn get(&self, id: u64) -> StoreResult<Vec<u8>> {
        if let Some(write) = self.writes.iter().rev().find(|w| w.id == id) {
            return Ok(write.data.clone());
        }
        Ok(self.store.read_object(id, self.head)?.data)
    }

    /// Committed object `id` at the snapshot, with its block position.
    pub fn get_committed(&self, id: u64) -> StoreResult<ObjectBlock> {
        self.store.read_object(id, self.head)
    }

    /// Overwrite object `id`.
    pub fn set(&mut self, id: u64, data: Vec<u8>) {
        self.writes.push(PendingWrite { id, data });
    }

    /// Write a new object under a freshly allocated id and key.
    pub fn create(&mut self, data: Vec<u8>) -> StoreResult<u64> {
        if !self.store.writable() {
            return Err(StoreError::ReadOnly(self.feed()));
        }
        let key = self.store.new_object_key();
        Ok(self.allocate(data, key))
    }

    /// Write a new unencrypted object.
    pub fn create_public(&mut self, data: Vec<u8>) -> StoreResult<u64> {
        if !self.store.writable() {
            return Err(StoreError::ReadOnly(self.feed()));
        }
        Ok(self.allocate(data, None))
    }

    /// Write a new object encrypted with a key chosen by the caller.
    pub fn create_with_key(&mut self, data: Vec<u8>, key: ObjectKey) -> StoreResult<u64> {
        if !self.store.writable() {
            return Err(StoreError::ReadOnly(self.feed()));
        }
        Ok(self.allocate(data, Some(key)))
    }

    /// Allocate an id and key without writing yet.
    ///
    /// The object only comes into existence if it is `set` before commit;
    /// otherwise the id is released and its key is never registered.
    pub fn reserve(&mut self) -> StoreResult<u64> {
        if !self.store.writable() {
            return Err(StoreError::ReadOnly(self.feed()));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.creates.insert(id, self.store.new_object_key());
        self.order.push(id);
        Ok(id)
    }

    fn allocate(&mut self, data: Vec<u8>, key: Option<ObjectKey>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.creates.insert(id, key);
        self.order.push(id);
        self.writes.push(PendingWrite { id, data });
        id
    }

    /// Key generated for an object created in this transaction.
    pub fn pending_key(&self, id: u64) -> Option<ObjectKey> {
        self.creates.get(&id).cloned().flatten()
    }

    pub fn is_created(&self, id: u64) -> bool {
        self.creates.contains_key(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    fn key_for(&self, id: u64) -> Option<ObjectKey> {
        match self.creates.get(&id) {
            Some(key) => key.clone(),
            None => self.store.router().get_key(&self.feed(), id),
        }
    }

    /// Append all pending writes and register the keys of created objects.
    pub fn commit(self) -> StoreResult<Commit> {
        let feed = self.feed();
        let timestamp = chrono::Utc::now().timestamp_millis().max(0) as u64;
        if self.writes.is_empty() {
            return Ok(Commit {
                feed,
                version: self.head,
                timestamp,
                created: Vec::new(),
                versions: HashMap::new(),
            });
        }
        if !self.store.writable() {
            return Err(StoreError::ReadOnly(feed));
        }

        let crypto = self.store.router().crypto();
        let mut blocks = Vec::with_capacity(self.writes.len());
        let mut versions = HashMap::new();
        for (offset, write) in self.writes.iter().enumerate() {
            let block = self.head + offset as u64;
            let sealed = append_checksum(&write.data);
            let payload = match self.key_for(write.id) {
                Some(key) => crypto.encrypt(&key, BlockNonce::new(write.id, block), &sealed)?,
                None => sealed,
            };
            blocks.push(BlockRecord::new(write.id, timestamp, payload).to_bytes()?);
            versions.insert(write.id, block + 1);
        }

        let version = self.store.feed().append(&blocks, Some(self.head))?;

        let router = self.store.router();
        let created: Vec<u64> = self
            .order
            .iter()
            .copied()
            .filter(|id| versions.contains_key(id))
            .collect();
        for id in &created {
            match &self.creates[id] {
                Some(key) => router.register_key(key.clone(), &feed, *id),
                None => router.register_public(&feed, *id),
            }
        }
        self.store.refresh()?;

        debug!(
            feed = %feed.short_hex(),
            version,
            writes = blocks.len(),
            created = created.len(),
            "committed transaction"
        );
        Ok(Commit {
            feed,
            version,
            timestamp,
            created,
            versions,
        })
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("feed", &self.feed())
            .field("version", &self.head)
            .field("writes", &self.writes.len())
            .field("created", &self.order)
            .finish()
    }
}
