use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use hg_crypto::{FeedKeyPair, KEY_LEN};
use hg_types::FeedId;

use crate::config::{Backend, StoreConfig, SyncMode};
use crate::error::{StoreError, StoreResult};
use crate::feed::{Feed, MemoryFeed, MemoryLog};
use crate::file::FileFeed;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Source of feeds for one session.
///
/// A corestore knows which feeds are available locally (or from connected
/// peers) and which of them this session may write, i.e. holds the secret
/// key for.
pub trait Corestore: Send + Sync {
    /// The feed `id` if it is available, `None` otherwise.
    fn get(&self, id: &FeedId) -> StoreResult<Option<Arc<dyn Feed>>>;

    /// Create a new feed owned by this session.
    fn create(&self) -> StoreResult<Arc<dyn Feed>>;

    /// Take over the write capability of an existing feed.
    fn import_writer(&self, pair: FeedKeyPair) -> StoreResult<Arc<dyn Feed>>;

    /// Secret key of a feed this session can write.
    fn writer_key(&self, id: &FeedId) -> Option<FeedKeyPair>;

    /// Wait up to `timeout` for a peer to provide feed `id`.
    fn wait_for(&self, id: &FeedId, timeout: Duration) -> StoreResult<Arc<dyn Feed>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(feed) = self.get(id)? {
                return Ok(feed);
            }
            if Instant::now() >= deadline {
                return Err(StoreError::FeedUnavailable(*id));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Build the corestore selected by `config`.
pub fn open_corestore(config: &StoreConfig) -> StoreResult<Arc<dyn Corestore>> {
    match &config.backend {
        Backend::Memory => Ok(Arc::new(MemoryCorestore::new())),
        Backend::Directory { path } => Ok(Arc::new(DirCorestore::open(path, config.sync_mode)?)),
    }
}

type Swarm = Arc<RwLock<HashMap<FeedId, Arc<MemoryLog>>>>;

/// In-memory corestore.
///
/// All corestores derived through [`replica`](MemoryCorestore::replica)
/// see the same block logs, as fully replicated peers would, but each keeps
/// its own set of writable feeds.
#[derive(Default)]
pub struct MemoryCorestore {
    swarm: Swarm,
    writers: RwLock<HashMap<FeedId, FeedKeyPair>>,
}

impl MemoryCorestore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Another peer on the same swarm, without any write capability.
    pub fn replica(&self) -> Self {
        Self {
            swarm: Arc::clone(&self.swarm),
            writers: RwLock::new(HashMap::new()),
        }
    }

    /// Number of feeds in the swarm.
    pub fn feed_count(&self) -> usize {
        self.swarm.read().expect("lock poisoned").len()
    }

    fn handle(&self, id: FeedId, log: Arc<MemoryLog>) -> Arc<dyn Feed> {
        let writable = self.writers.read().expect("lock poisoned").contains_key(&id);
        Arc::new(MemoryFeed::with_log(id, log, writable))
    }
}

impl Corestore for MemoryCorestore {
    fn get(&self, id: &FeedId) -> StoreResult<Option<Arc<dyn Feed>>> {
        let log = self.swarm.read().expect("lock poisoned").get(id).cloned();
        Ok(log.map(|log| self.handle(*id, log)))
    }

    fn create(&self) -> StoreResult<Arc<dyn Feed>> {
        self.import_writer(FeedKeyPair::generate())
    }

    fn import_writer(&self, pair: FeedKeyPair) -> StoreResult<Arc<dyn Feed>> {
        let id = pair.feed_id();
        self.writers.write().expect("lock poisoned").insert(id, pair);
        let log = Arc::clone(
            self.swarm
                .write()
                .expect("lock poisoned")
                .entry(id)
                .or_default(),
        );
        debug!(feed = %id.short_hex(), "writable memory feed");
        Ok(self.handle(id, log))
    }

    fn writer_key(&self, id: &FeedId) -> Option<FeedKeyPair> {
        self.writers.read().expect("lock poisoned").get(id).cloned()
    }
}

impl std::fmt::Debug for MemoryCorestore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCorestore")
            .field("feeds", &self.feed_count())
            .field("writers", &self.writers.read().expect("lock poisoned").len())
            .finish()
    }
}

/// Directory-backed corestore.
///
/// Layout under the root directory:
/// ```text
/// <feedhex>.feed     segment file of the feed
/// <feedhex>.secret   32-byte secret key, only for feeds this store writes
/// ```
pub struct DirCorestore {
    root: PathBuf,
    sync_mode: SyncMode,
    feeds: RwLock<HashMap<FeedId, Arc<FileFeed>>>,
    writers: RwLock<HashMap<FeedId, FeedKeyPair>>,
}

impl DirCorestore {
    /// Open (or create) a corestore rooted at `root`, loading every stored
    /// writer secret.
    pub fn open(root: &Path, sync_mode: SyncMode) -> StoreResult<Self> {
        fs::create_dir_all(root)?;

        let mut writers = HashMap::new();
        for entry in fs::read_dir(root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("secret") {
                continue;
            }
            let bytes = fs::read(&path)?;
            let secret: [u8; KEY_LEN] = bytes.as_slice().try_into().map_err(|_| {
                StoreError::Serialization(format!("bad secret file {}", path.display()))
            })?;
            let pair = FeedKeyPair::from_bytes(secret);
            writers.insert(pair.feed_id(), pair);
        }

        info!(root = %root.display(), writers = writers.len(), "opened directory corestore");
        Ok(Self {
            root: root.to_path_buf(),
            sync_mode,
            feeds: RwLock::new(HashMap::new()),
            writers: RwLock::new(writers),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn segment_path(&self, id: &FeedId) -> PathBuf {
        self.root.join(format!("{}.feed", id.to_hex()))
    }

    fn secret_path(&self, id: &FeedId) -> PathBuf {
        self.root.join(format!("{}.secret", id.to_hex()))
    }

    fn open_feed(&self, id: FeedId) -> StoreResult<Arc<FileFeed>> {
        let writable = self.writers.read().expect("lock poisoned").contains_key(&id);
        let feed = Arc::new(FileFeed::open(
            id,
            &self.segment_path(&id),
            writable,
            self.sync_mode,
        )?);
        self.feeds
            .write()
            .expect("lock poisoned")
            .insert(id, Arc::clone(&feed));
        Ok(feed)
    }
}

impl Corestore for DirCorestore {
    fn get(&self, id: &FeedId) -> StoreResult<Option<Arc<dyn Feed>>> {
        if let Some(feed) = self.feeds.read().expect("lock poisoned").get(id) {
            return Ok(Some(Arc::clone(feed) as Arc<dyn Feed>));
        }
        if !self.segment_path(id).exists() {
            return Ok(None);
        }
        Ok(Some(self.open_feed(*id)? as Arc<dyn Feed>))
    }

    fn create(&self) -> StoreResult<Arc<dyn Feed>> {
        self.import_writer(FeedKeyPair::generate())
    }

    fn import_writer(&self, pair: FeedKeyPair) -> StoreResult<Arc<dyn Feed>> {
        let id = pair.feed_id();
        fs::write(self.secret_path(&id), pair.secret_bytes())?;
        self.writers.write().expect("lock poisoned").insert(id, pair);
        // Reopen so an earlier read-only handle is replaced.
        Ok(self.open_feed(id)? as Arc<dyn Feed>)
    }

    fn writer_key(&self, id: &FeedId) -> Option<FeedKeyPair> {
        self.writers.read().expect("lock poisoned").get(id).cloned()
    }
}

impl std::fmt::Debug for DirCorestore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirCorestore")
            .field("root", &self.root)
            .field("open_feeds", &self.feeds.read().expect("lock poisoned").len())
            .finish()
    }
}
