use std::sync::{Arc, RwLock};

use tracing::debug;

use hg_crypto::{validate_checksum, BlockNonce, KeyKind, KeyRouter, ObjectKey};
use hg_types::FeedId;

use crate::error::{StoreError, StoreResult};
use crate::feed::Feed;
use crate::index::ObjectIndex;
use crate::record::{BlockRecord, ObjectBlock};
use crate::transaction::{Commit, Transaction};

/// Versioned object store over one feed.
///
/// Object ids are small integers allocated per feed. Writing an object
/// appends a block; the feed length after an append is the new *version*.
/// Reading at version `v` returns the newest block of the object below `v`.
pub struct FeedStore {
    feed: Arc<dyn Feed>,
    router: Arc<KeyRouter>,
    /// Cipher for objects created through this store; `None` creates them public.
    new_object_keys: Option<KeyKind>,
    index: RwLock<ObjectIndex>,
}

impl FeedStore {
    pub fn new(feed: Arc<dyn Feed>, router: Arc<KeyRouter>) -> Self {
        Self {
            feed,
            router,
            new_object_keys: Some(KeyKind::Stream),
            index: RwLock::new(ObjectIndex::new()),
        }
    }

    /// Choose the cipher for created objects, or `None` to leave them public.
    pub fn with_new_object_keys(mut self, kind: Option<KeyKind>) -> Self {
        self.new_object_keys = kind;
        self
    }

    pub fn id(&self) -> FeedId {
        self.feed.id()
    }

    pub fn feed(&self) -> &Arc<dyn Feed> {
        &self.feed
    }

    pub fn router(&self) -> &Arc<KeyRouter> {
        &self.router
    }

    pub fn writable(&self) -> bool {
        self.feed.writable()
    }

    /// Current feed length.
    pub fn version(&self) -> u64 {
        self.feed.len()
    }

    /// Catch the object index up with the feed.
    pub fn refresh(&self) -> StoreResult<()> {
        let behind = self.index.read().expect("lock poisoned").scanned() < self.feed.len();
        if behind {
            self.index
                .write()
                .expect("lock poisoned")
                .refresh(self.feed.as_ref())?;
        }
        Ok(())
    }

    /// Lowest object id not yet used in the feed.
    pub fn next_id(&self) -> StoreResult<u64> {
        self.refresh()?;
        Ok(self.index.read().expect("lock poisoned").next_id())
    }

    /// Object ids present at `version`.
    pub fn objects(&self, version: u64) -> StoreResult<Vec<u64>> {
        self.refresh()?;
        Ok(self.index.read().expect("lock poisoned").objects_at(version))
    }

    /// Versions at which `id` was (re)written, oldest first.
    pub fn history(&self, id: u64, version: u64) -> StoreResult<Vec<u64>> {
        self.refresh()?;
        let index = self.index.read().expect("lock poisoned");
        Ok(index.history(id, version).into_iter().map(|b| b + 1).collect())
    }

    /// Read object `id` as of `version`.
    ///
    /// Decrypts with the registered key if there is one and validates the
    /// checksum. A checksum failure is reported as
    /// [`StoreError::ChecksumMismatch`]: the caller lacks the right key.
    pub fn read_object(&self, id: u64, version: u64) -> StoreResult<ObjectBlock> {
        self.refresh()?;
        let block = self
            .index
            .read()
            .expect("lock poisoned")
            .latest(id, version)
            .ok_or(StoreError::NotFound {
                feed: self.id(),
                id,
            })?;

        let record = BlockRecord::from_bytes(&self.feed.get(block)?)?;
        if record.object != id {
            return Err(StoreError::CorruptBlock {
                feed: self.id(),
                block,
                reason: format!("indexed for object {id}, names object {}", record.object),
            });
        }

        let plain = match self.router.get_key(&self.id(), id) {
            Some(key) => self
                .router
                .crypto()
                .decrypt(&key, BlockNonce::new(id, block), &record.payload)
                .map_err(|_| StoreError::Decryption {
                    feed: self.id(),
                    id,
                })?,
            None => record.payload,
        };

        let data = validate_checksum(&plain).ok_or(StoreError::ChecksumMismatch {
            feed: self.id(),
            id,
        })?;

        Ok(ObjectBlock {
            data: data.to_vec(),
            block,
            timestamp: record.timestamp,
        })
    }

    /// Open a transaction at `version`, or at the current head.
    pub fn transaction(&self, version: Option<u64>) -> StoreResult<Transaction<'_>> {
        self.refresh()?;
        let head = version.unwrap_or_else(|| self.version());
        let next_id = self.index.read().expect("lock poisoned").next_id();
        Ok(Transaction::new(self, head, next_id))
    }

    /// Run `exec` against a fresh transaction and commit it.
    ///
    /// If another writer appended in the meantime the commit conflicts;
    /// `exec` is then re-run on a new snapshot, up to `retries` times.
    pub fn transaction_exec<T, E, F>(&self, retries: usize, mut exec: F) -> Result<(T, Commit), E>
    where
        E: From<StoreError>,
        F: FnMut(&mut Transaction<'_>) -> Result<T, E>,
    {
        let mut attempt = 0;
        loop {
            let mut tx = self.transaction(None)?;
            let out = exec(&mut tx)?;
            match tx.commit() {
                Ok(commit) => return Ok((out, commit)),
                Err(StoreError::Conflict {
                    expected, actual, ..
                }) if attempt < retries => {
                    attempt += 1;
                    debug!(
                        feed = %self.id().short_hex(),
                        expected,
                        actual,
                        attempt,
                        "transaction conflict; retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub(crate) fn new_object_key(&self) -> Option<ObjectKey> {
        self.new_object_keys
            .map(|kind| self.router.generate_encryption_key(kind))
    }
}

impl std::fmt::Debug for FeedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedStore")
            .field("feed", &self.id())
            .field("version", &self.version())
            .field("writable", &self.writable())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corestore::{Corestore, MemoryCorestore};

    fn store() -> (MemoryCorestore, FeedStore) {
        let corestore = MemoryCorestore::new();
        let feed = corestore.create().unwrap();
        let store = FeedStore::new(feed, Arc::new(KeyRouter::default()));
        (corestore, store)
    }

    #[test]
    fn read_at_older_version() {
        let (_cs, store) = store();
        let mut tx = store.transaction(None).unwrap();
        let id = tx.create(b"v1".to_vec()).unwrap();
        let first = tx.commit().unwrap();

        let mut tx = store.transaction(None).unwrap();
        tx.set(id, b"v2".to_vec());
        tx.commit().unwrap();

        assert_eq!(store.read_object(id, first.version).unwrap().data, b"v1");
        assert_eq!(store.read_object(id, store.version()).unwrap().data, b"v2");
        assert_eq!(store.history(id, store.version()).unwrap(), vec![1, 2]);
    }

    #[test]
    fn missing_object_is_not_found() {
        let (_cs, store) = store();
        assert!(matches!(
            store.read_object(3, store.version()),
            Err(StoreError::NotFound { id: 3, .. })
        ));
    }

    #[test]
    fn exec_commits_and_returns_result() {
        let (_cs, store) = store();
        let (id, commit) = store
            .transaction_exec(0, |tx| tx.create(b"exec".to_vec()))
            .unwrap();
        assert_eq!(commit.version, 1);
        assert_eq!(commit.created, vec![id]);
        assert_eq!(store.read_object(id, commit.version).unwrap().data, b"exec");
    }

    #[test]
    fn exec_retries_after_conflict() {
        let (_cs, store) = store();
        let mut interfered = false;
        let (_, commit) = store
            .transaction_exec(3, |tx| {
                if !interfered {
                    // Someone else appends after our snapshot was taken.
                    interfered = true;
                    let mut other = store.transaction(None)?;
                    other.create(b"other".to_vec())?;
                    other.commit()?;
                }
                tx.create(b"mine".to_vec())
            })
            .unwrap();
        assert_eq!(commit.version, 2);
        assert_eq!(store.objects(2).unwrap(), vec![0, 1]);
    }

    #[test]
    fn exec_gives_up_when_retries_exhausted() {
        let (_cs, store) = store();
        let result = store.transaction_exec(0, |tx| {
            let mut other = store.transaction(None)?;
            other.create(b"other".to_vec())?;
            other.commit()?;
            tx.create(b"mine".to_vec())
        });
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
    }

    #[test]
    fn public_objects_when_encryption_disabled() {
        let corestore = MemoryCorestore::new();
        let feed = corestore.create().unwrap();
        let router = Arc::new(KeyRouter::default());
        let store = FeedStore::new(feed, Arc::clone(&router)).with_new_object_keys(None);

        let (id, _) = store
            .transaction_exec(0, |tx| tx.create(b"open".to_vec()))
            .unwrap();
        assert!(router.is_public(&store.id(), id));

        // A replica without any keys can read it.
        let replica = corestore.replica();
        let remote = FeedStore::new(
            replica.get(&store.id()).unwrap().unwrap(),
            Arc::new(KeyRouter::default()),
        );
        assert_eq!(remote.read_object(id, remote.version()).unwrap().data, b"open");
    }

    #[test]
    fn foreign_block_with_huge_id_does_not_break_reads() {
        let (_cs, store) = store();
        let (id, _) = store
            .transaction_exec(0, |tx| tx.create(b"kept".to_vec()))
            .unwrap();
        let hostile = BlockRecord::new(u64::MAX, 0, vec![1, 2, 3]);
        store
            .feed()
            .append(&[hostile.to_bytes().unwrap()], None)
            .unwrap();

        let fresh = FeedStore::new(Arc::clone(store.feed()), Arc::clone(store.router()));
        assert_eq!(fresh.read_object(id, fresh.version()).unwrap().data, b"kept");
        assert_eq!(fresh.next_id().unwrap(), id + 1);

        let (next, _) = fresh
            .transaction_exec(0, |tx| tx.create(b"after".to_vec()))
            .unwrap();
        assert_eq!(next, id + 1);
        assert_eq!(fresh.read_object(id, fresh.version()).unwrap().data, b"kept");
    }
}
