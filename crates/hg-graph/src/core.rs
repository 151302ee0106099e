use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use hg_crypto::{FeedKeyPair, KeyRouter, ObjectKey};
use hg_store::{open_corestore, Corestore, Feed, FeedStore, MemoryFeed, StoreError, Transaction};
use hg_types::FeedId;

use crate::codec::Codec;
use crate::config::GraphConfig;
use crate::edge::{meta, Edge};
use crate::error::{GraphError, GraphResult};
use crate::object::{GraphObject, Thombstone};
use crate::vertex::Vertex;

/// One element of a path walked by [`Core::create_edges_to_path`].
#[derive(Clone, Debug)]
pub struct PathSegment {
    pub label: String,
    pub vertex: Vertex,
    /// Whether the vertex was created by this call.
    pub created: bool,
}

/// Vertex of a path under construction inside a transaction.
struct PathStep {
    label: String,
    id: u64,
    vertex: Vertex,
    created: bool,
    dirty: bool,
}

/// Graph object store over many feeds.
///
/// Keeps one [`FeedStore`] per feed, encodes vertices with the [`Codec`],
/// and moves keys between the [`KeyRouter`] and edge metadata: writes embed
/// the keys of edge targets, reads register them. A reader therefore only
/// needs the key of the vertex it starts from.
pub struct Core {
    corestore: Arc<dyn Corestore>,
    router: Arc<KeyRouter>,
    codec: Arc<Codec>,
    config: GraphConfig,
    stores: RwLock<HashMap<FeedId, Arc<FeedStore>>>,
    /// Feeds no peer provided within the wait timeout.
    unavailable: RwLock<HashSet<FeedId>>,
}

impl Core {
    pub fn new(corestore: Arc<dyn Corestore>, router: Arc<KeyRouter>, config: GraphConfig) -> Self {
        Self {
            corestore,
            router,
            codec: Arc::new(Codec::new()),
            config,
            stores: RwLock::new(HashMap::new()),
            unavailable: RwLock::new(HashSet::new()),
        }
    }

    /// A core over the corestore selected by `config.store`.
    pub fn open(config: GraphConfig) -> GraphResult<Self> {
        let corestore = open_corestore(&config.store)?;
        Ok(Self::new(corestore, Arc::new(KeyRouter::default()), config))
    }

    pub fn with_codec(mut self, codec: Arc<Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn router(&self) -> &Arc<KeyRouter> {
        &self.router
    }

    pub fn codec(&self) -> &Arc<Codec> {
        &self.codec
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn corestore(&self) -> &Arc<dyn Corestore> {
        &self.corestore
    }

    // ---- Feeds ----

    /// The session's default feed, created on first use.
    pub fn default_feed(&self) -> GraphResult<FeedId> {
        if let Some(feed) = self.router.default_feed() {
            return Ok(feed);
        }
        let feed = self.create_feed()?;
        self.router.set_default_feed(feed);
        Ok(feed)
    }

    /// Create a new feed owned by this session.
    pub fn create_feed(&self) -> GraphResult<FeedId> {
        let handle = self.corestore.create()?;
        let feed = handle.id();
        self.cache_store(feed, Arc::new(self.feed_store(handle)));
        debug!(feed = %feed.short_hex(), "created feed");
        Ok(feed)
    }

    /// Take over the write capability of `pair`'s feed.
    pub fn import_writer(&self, pair: FeedKeyPair) -> GraphResult<FeedId> {
        let handle = self.corestore.import_writer(pair)?;
        let feed = handle.id();
        self.cache_store(feed, Arc::new(self.feed_store(handle)));
        Ok(feed)
    }

    pub fn writer_key(&self, feed: &FeedId) -> Option<FeedKeyPair> {
        self.corestore.writer_key(feed)
    }

    /// Object store of `feed`.
    pub fn store(&self, feed: FeedId) -> GraphResult<Arc<FeedStore>> {
        self.open_store(feed, None)
    }

    fn feed_store(&self, handle: Arc<dyn Feed>) -> FeedStore {
        FeedStore::new(handle, Arc::clone(&self.router))
            .with_new_object_keys(self.config.new_object_keys())
    }

    fn cache_store(&self, feed: FeedId, store: Arc<FeedStore>) {
        self.stores
            .write()
            .expect("lock poisoned")
            .insert(feed, store);
    }

    /// Open `feed`, waiting for a peer if it is not available locally.
    ///
    /// If no peer provides it in time and nothing says it was ever written
    /// (`pinned` is unset or zero), the feed is treated as empty. The wait
    /// happens once per session: later opens of the same feed only check
    /// whether it has arrived since.
    fn open_store(&self, feed: FeedId, pinned: Option<u64>) -> GraphResult<Arc<FeedStore>> {
        if let Some(store) = self.stores.read().expect("lock poisoned").get(&feed) {
            return Ok(Arc::clone(store));
        }

        let handle = match self.corestore.get(&feed)? {
            Some(handle) => handle,
            None => {
                let timed_out = self.unavailable.read().expect("lock poisoned").contains(&feed);
                let waited = if timed_out {
                    Err(StoreError::FeedUnavailable(feed))
                } else {
                    self.corestore
                        .wait_for(&feed, self.config.store.feed_wait_timeout())
                };
                match waited {
                    Ok(handle) => handle,
                    Err(StoreError::FeedUnavailable(_)) => {
                        let first = self.unavailable.write().expect("lock poisoned").insert(feed);
                        if pinned.unwrap_or(0) != 0 {
                            return Err(GraphError::Timeout(feed));
                        }
                        if first {
                            warn!(
                                feed = %feed.short_hex(),
                                "feed unavailable; assuming it was never written"
                            );
                        }
                        return Ok(Arc::new(self.feed_store(Arc::new(MemoryFeed::empty(feed)))));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        self.unavailable.write().expect("lock poisoned").remove(&feed);
        let store = Arc::new(self.feed_store(handle));
        let mut stores = self.stores.write().expect("lock poisoned");
        Ok(Arc::clone(stores.entry(feed).or_insert(store)))
    }

    // ---- Reads ----

    /// Read vertex `id` of `feed` at the current head, registering `key`
    /// first if given.
    pub fn get(&self, feed: FeedId, id: u64, key: Option<ObjectKey>) -> GraphResult<Vertex> {
        if let Some(key) = key {
            self.router.register_key(key, &feed, id);
        }
        let store = self.open_store(feed, None)?;
        self.read_vertex(&store, id, store.version())
    }

    /// Read vertex `id` of `feed` as it was at feed length `version`.
    pub fn get_at_version(
        &self,
        feed: FeedId,
        id: u64,
        version: u64,
        key: Option<ObjectKey>,
    ) -> GraphResult<Vertex> {
        if let Some(key) = key {
            self.router.register_key(key, &feed, id);
        }
        let store = self.open_store(feed, Some(version))?;
        self.read_vertex(&store, id, version)
    }

    /// Versions at which a persisted vertex was written, oldest first.
    pub fn history(&self, vertex: &Vertex) -> GraphResult<Vec<u64>> {
        let (feed, id) = vertex.require_address()?;
        let store = self.open_store(feed, None)?;
        Ok(store.history(id, store.version())?)
    }

    fn read_vertex(&self, store: &FeedStore, id: u64, version: u64) -> GraphResult<Vertex> {
        let block = store.read_object(id, version)?;
        self.decode_vertex(store, id, &block.data, block.block + 1, block.timestamp)
    }

    fn read_in_tx(&self, tx: &Transaction<'_>, id: u64) -> GraphResult<Vertex> {
        let block = tx.get_committed(id)?;
        self.decode_vertex(tx.store(), id, &block.data, block.block + 1, block.timestamp)
    }

    fn decode_vertex(
        &self,
        store: &FeedStore,
        id: u64,
        data: &[u8],
        version: u64,
        timestamp: u64,
    ) -> GraphResult<Vertex> {
        let (content, edges) = self.codec.decode_vertex(data)?;
        self.register_edges(store.id(), &edges);
        let mut vertex = Vertex::from_parts(id, store.id(), content, edges);
        vertex.stamp(id, store.id(), version, timestamp, store.writable());
        Ok(vertex)
    }

    /// Register every key carried by `edges` of a vertex in `source`.
    pub fn register_edges(&self, source: FeedId, edges: &[Edge]) {
        for edge in edges {
            match edge.key() {
                Ok(Some(key)) => {
                    self.router
                        .register_key(key, &edge.target_feed(source), edge.target)
                }
                Ok(None) => {}
                Err(e) => warn!(label = %edge.label, error = %e, "ignoring malformed edge key"),
            }
        }
    }

    // ---- Writes ----

    pub fn put(&self, vertex: &mut Vertex) -> GraphResult<()> {
        self.put_all([vertex], None)
    }

    /// Persist vertices. New vertices go to `feed`, or the default feed.
    ///
    /// Vertices are grouped per feed and each group is written in one
    /// transaction, so a multi-feed call is atomic per feed only. Existing
    /// vertices are overwritten: last writer wins.
    pub fn put_all<'v, I>(&self, vertices: I, feed: Option<FeedId>) -> GraphResult<()>
    where
        I: IntoIterator<Item = &'v mut Vertex>,
    {
        let mut groups: Vec<(FeedId, Vec<&'v mut Vertex>)> = Vec::new();
        for vertex in vertices {
            let target = match vertex.feed().or(feed) {
                Some(target) => target,
                None => self.default_feed()?,
            };
            match groups.iter_mut().find(|(f, _)| *f == target) {
                Some((_, group)) => group.push(vertex),
                None => groups.push((target, vec![vertex])),
            }
        }
        for (feed, group) in groups {
            self.put_group(feed, group)?;
        }
        Ok(())
    }

    fn put_group(&self, feed: FeedId, mut vertices: Vec<&mut Vertex>) -> GraphResult<()> {
        let store = self.open_store(feed, None)?;
        if !store.writable() {
            return Err(GraphError::Permission(format!("feed {feed} is not writable")));
        }

        let (ids, commit) = store.transaction_exec(self.config.write_retries, |tx| {
            vertices
                .iter_mut()
                .map(|vertex| self.write_vertex(tx, vertex, None))
                .collect::<GraphResult<Vec<u64>>>()
        })?;

        for (vertex, id) in vertices.iter_mut().zip(ids) {
            let version = commit.versions.get(&id).copied().unwrap_or(commit.version);
            vertex.stamp(id, feed, version, commit.timestamp, true);
        }
        Ok(())
    }

    /// Persist a new vertex encrypted with `key` instead of a fresh one.
    ///
    /// Lets a writer produce an object whose key a third party chose in
    /// advance, as preshared-vertex writes require.
    pub fn put_with_key(
        &self,
        vertex: &mut Vertex,
        feed: Option<FeedId>,
        key: ObjectKey,
    ) -> GraphResult<()> {
        if vertex.is_persisted() {
            return Err(GraphError::Structural(
                "only new vertices can be written with a chosen key".into(),
            ));
        }
        let feed = match feed {
            Some(feed) => feed,
            None => self.default_feed()?,
        };
        let store = self.open_store(feed, None)?;
        if !store.writable() {
            return Err(GraphError::Permission(format!("feed {feed} is not writable")));
        }
        let (id, commit) = store.transaction_exec(self.config.write_retries, |tx| {
            self.write_vertex(tx, vertex, Some(&key))
        })?;
        let version = commit.versions.get(&id).copied().unwrap_or(commit.version);
        vertex.stamp(id, feed, version, commit.timestamp, true);
        Ok(())
    }

    /// Re-read a vertex inside a transaction, apply `update`, write it back.
    ///
    /// A conflicting append re-runs the whole read-modify-write, so edges
    /// added concurrently by other writers of the feed are kept.
    pub fn modify<F>(&self, feed: FeedId, id: u64, mut update: F) -> GraphResult<Vertex>
    where
        F: FnMut(&mut Vertex) -> GraphResult<()>,
    {
        let store = self.open_store(feed, None)?;
        if !store.writable() {
            return Err(GraphError::Permission(format!("feed {feed} is not writable")));
        }
        let (mut vertex, commit) = store.transaction_exec(self.config.write_retries, |tx| {
            let mut vertex = self.read_in_tx(tx, id)?;
            update(&mut vertex)?;
            self.write_vertex(tx, &mut vertex, None)?;
            Ok::<_, GraphError>(vertex)
        })?;
        let version = commit.versions.get(&id).copied().unwrap_or(commit.version);
        vertex.stamp(id, feed, version, commit.timestamp, true);
        Ok(vertex)
    }

    /// Encode `vertex` into `tx`, creating it if unpersisted.
    fn write_vertex(
        &self,
        tx: &mut Transaction<'_>,
        vertex: &mut Vertex,
        key: Option<&ObjectKey>,
    ) -> GraphResult<u64> {
        vertex.normalize_edges(tx.feed());
        self.set_edge_keys(tx, vertex);
        let bytes = self.codec.encode_vertex(vertex.content(), vertex.edges())?;
        Ok(match (vertex.address(), key) {
            (Some((_, id)), _) => {
                tx.set(id, bytes);
                id
            }
            (None, Some(key)) => tx.create_with_key(bytes, key.clone())?,
            (None, None) => tx.create(bytes)?,
        })
    }

    /// Embed the keys of edge targets into edge metadata.
    ///
    /// Envelope edges carry their key sealed and are left alone, as are
    /// all edges of preshared vertices: those are written by parties that
    /// must not learn each other's keys.
    fn set_edge_keys(&self, tx: &Transaction<'_>, vertex: &mut Vertex) {
        if matches!(vertex.content(), Some(GraphObject::PreShared(_))) {
            return;
        }
        let source = tx.feed();
        for edge in vertex.edges_mut() {
            if edge.has_metadata(meta::ENVELOPE) {
                continue;
            }
            let target_feed = edge.target_feed(source);
            let key = if target_feed == source && tx.is_created(edge.target) {
                tx.pending_key(edge.target)
            } else {
                self.router.get_key(&target_feed, edge.target)
            };
            if let Some(key) = key {
                edge.set_key(&key);
            }
        }
    }

    /// Walk `path` from `root`, creating missing intermediate vertices.
    ///
    /// Only same-feed edges are followed. An existing single child is
    /// reused; among several children with the same label the most recently
    /// written one wins, ties broken by the higher id. With `leaf`, the last
    /// segment's existing edges are replaced by an edge to `leaf`, which is
    /// created if unpersisted. Everything is written in one transaction.
    pub fn create_edges_to_path(
        &self,
        path: &str,
        root: &mut Vertex,
        mut leaf: Option<&mut Vertex>,
    ) -> GraphResult<Vec<PathSegment>> {
        let (feed, root_id) = root.require_address()?;
        let labels = split_path(path);
        if labels.is_empty() {
            return Err(GraphError::Structural(format!("empty path '{path}'")));
        }
        let store = self.open_store(feed, None)?;
        if !store.writable() {
            return Err(GraphError::Permission(format!(
                "path root {root_id} in feed {feed} is not writable"
            )));
        }

        let (mut chain, commit) = store.transaction_exec(self.config.write_retries, |tx| {
            self.build_path(tx, root_id, &labels, leaf.as_deref())
        })?;

        for step in chain.iter_mut().filter(|s| s.dirty) {
            let version = commit.versions.get(&step.id).copied().unwrap_or(commit.version);
            step.vertex.normalize_edges(feed);
            step.vertex.stamp(step.id, feed, version, commit.timestamp, true);
        }

        let mut chain = chain.into_iter();
        if let Some(first) = chain.next() {
            if first.dirty {
                *root = first.vertex;
            }
        }
        let segments: Vec<PathSegment> = chain
            .map(|step| PathSegment {
                label: step.label,
                vertex: step.vertex,
                created: step.created,
            })
            .collect();

        if let (Some(leaf), Some(last)) = (leaf.as_deref_mut(), segments.last()) {
            if last.created {
                *leaf = last.vertex.clone();
            }
        }
        debug!(
            feed = %feed.short_hex(),
            path,
            created = segments.iter().filter(|s| s.created).count(),
            "created edges to path"
        );
        Ok(segments)
    }

    fn build_path(
        &self,
        tx: &mut Transaction<'_>,
        root_id: u64,
        labels: &[String],
        leaf: Option<&Vertex>,
    ) -> GraphResult<Vec<PathStep>> {
        let feed = tx.feed();
        let mut chain = vec![PathStep {
            label: String::new(),
            id: root_id,
            vertex: self.read_in_tx(tx, root_id)?,
            created: false,
            dirty: false,
        }];

        for (i, label) in labels.iter().enumerate() {
            let parent = chain.len() - 1;

            if let (Some(leaf), true) = (leaf, i + 1 == labels.len()) {
                let (leaf_feed, leaf_id, created) = match leaf.address() {
                    Some((leaf_feed, leaf_id)) => (leaf_feed, leaf_id, false),
                    None => (feed, tx.reserve()?, true),
                };
                let parent = &mut chain[parent];
                parent.vertex.remove_edges(label);
                parent.vertex.add_edge(Edge::new(
                    leaf_id,
                    label.as_str(),
                    (leaf_feed != feed).then_some(leaf_feed),
                ));
                parent.dirty = true;
                chain.push(PathStep {
                    label: label.clone(),
                    id: leaf_id,
                    vertex: leaf.clone(),
                    created,
                    dirty: created,
                });
                break;
            }

            let children: Vec<Vertex> = chain[parent]
                .vertex
                .edges_labeled(label)
                .filter(|e| e.feed.map_or(true, |f| f == feed))
                .filter_map(|e| match self.read_in_tx(tx, e.target) {
                    Ok(child) => Some(child),
                    Err(err) => {
                        warn!(label = %label, target = e.target, error = %err, "skipping unreadable path child");
                        None
                    }
                })
                .collect();

            let step = match latest_write(children) {
                Some(child) => PathStep {
                    label: label.clone(),
                    id: child.id() as u64,
                    vertex: child,
                    created: false,
                    dirty: false,
                },
                None => {
                    let id = tx.reserve()?;
                    let parent = &mut chain[parent];
                    parent.vertex.add_edge(Edge::new(id, label.as_str(), None));
                    parent.dirty = true;
                    PathStep {
                        label: label.clone(),
                        id,
                        vertex: Vertex::with_content(GraphObject::directory()),
                        created: true,
                        dirty: true,
                    }
                }
            };
            chain.push(step);
        }

        for step in chain.iter_mut().filter(|s| s.dirty) {
            self.set_edge_keys(tx, &mut step.vertex);
            let bytes = self
                .codec
                .encode_vertex(step.vertex.content(), step.vertex.edges())?;
            tx.set(step.id, bytes);
        }
        Ok(chain)
    }

    /// Link a tombstone at `path` below `root`, hiding whatever was there.
    pub fn tombstone_path(&self, path: &str, root: &mut Vertex) -> GraphResult<Vec<PathSegment>> {
        let mut tomb = Vertex::with_content(GraphObject::Thombstone(Thombstone {}));
        self.create_edges_to_path(path, root, Some(&mut tomb))
    }

    // ---- Keys ----

    /// A fresh unpersisted vertex.
    pub fn create(&self, content: GraphObject) -> Vertex {
        Vertex::with_content(content)
    }

    /// Key of a persisted vertex, if this session knows it.
    pub fn get_key(&self, vertex: &Vertex) -> Option<ObjectKey> {
        let (feed, id) = vertex.address()?;
        self.router.get_key(&feed, id)
    }

    pub fn register_vertex_key(&self, id: u64, feed: FeedId, key: ObjectKey) {
        self.router.register_key(key, &feed, id);
    }
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("stores", &self.stores.read().expect("lock poisoned").len())
            .field("router", &self.router)
            .finish()
    }
}

/// `/`-separated path segments; `\` counts as a separator too.
pub fn split_path(path: &str) -> Vec<String> {
    path.replace('\\', "/")
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Most recently written vertex, the higher id winning ties.
///
/// Vertices without a timestamp count as written at time 0. This is a
/// heuristic choice between concurrent siblings, not a merge.
pub fn latest_write(vertices: impl IntoIterator<Item = Vertex>) -> Option<Vertex> {
    vertices
        .into_iter()
        .max_by_key(|v| (v.timestamp().unwrap_or(0), v.id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hg_store::MemoryCorestore;

    fn core() -> (Arc<MemoryCorestore>, Core) {
        let corestore = Arc::new(MemoryCorestore::new());
        let core = Core::new(
            corestore.clone(),
            Arc::new(KeyRouter::default()),
            GraphConfig::default(),
        );
        (corestore, core)
    }

    /// A second peer on the same swarm with an empty keystore.
    fn peer(corestore: &MemoryCorestore) -> Core {
        let mut config = GraphConfig::default();
        config.store.feed_wait_timeout_ms = 20;
        Core::new(
            Arc::new(corestore.replica()),
            Arc::new(KeyRouter::default()),
            config,
        )
    }

    fn text(v: &Vertex) -> String {
        v.content()
            .and_then(GraphObject::as_simple)
            .and_then(|s| s.properties.get("text").cloned())
            .unwrap_or_default()
    }

    fn simple(t: &str) -> Vertex {
        Vertex::with_content(GraphObject::simple([("text", t)]))
    }

    #[test]
    fn put_then_get() {
        let (_cs, core) = core();
        let mut v = simple("hello");
        core.put(&mut v).unwrap();
        let (feed, id) = v.address().unwrap();
        assert_eq!(v.version(), Some(1));

        let read = core.get(feed, id, None).unwrap();
        assert_eq!(text(&read), "hello");
        assert!(read.writable());
        assert!(read.equals(&v));
    }

    #[test]
    fn overwrite_is_last_writer_wins() {
        let (_cs, core) = core();
        let mut v = simple("one");
        core.put(&mut v).unwrap();
        let (feed, id) = v.address().unwrap();

        let mut a = core.get(feed, id, None).unwrap();
        let mut b = core.get(feed, id, None).unwrap();
        a.set_content(Some(GraphObject::simple([("text", "a")])));
        b.set_content(Some(GraphObject::simple([("text", "b")])));
        core.put(&mut a).unwrap();
        core.put(&mut b).unwrap();
        assert_eq!(text(&core.get(feed, id, None).unwrap()), "b");

        let old = core.get_at_version(feed, id, 1, None).unwrap();
        assert_eq!(text(&old), "one");
        assert_eq!(core.history(&v).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn keys_travel_along_edges() {
        let (cs, core) = core();
        let mut child = simple("child");
        core.put(&mut child).unwrap();
        let mut parent = simple("parent");
        parent.add_edge_to(&child, "child").unwrap();
        core.put(&mut parent).unwrap();
        let (feed, parent_id) = parent.address().unwrap();

        let reader = peer(&cs);
        let read = reader
            .get(feed, parent_id, core.get_key(&parent))
            .unwrap();
        let edge = &read.edges()[0];
        assert!(edge.feed.is_none());
        let child = reader.get(feed, edge.target, None).unwrap();
        assert_eq!(text(&child), "child");
    }

    #[test]
    fn reading_without_key_is_no_access() {
        let (cs, core) = core();
        let mut v = simple("secret");
        core.put(&mut v).unwrap();
        let (feed, id) = v.address().unwrap();

        let reader = peer(&cs);
        assert!(reader.get(feed, id, None).unwrap_err().is_no_access());
        let wrong = ObjectKey::generate(hg_crypto::KeyKind::Stream);
        assert!(reader.get(feed, id, Some(wrong)).unwrap_err().is_no_access());
    }

    #[test]
    fn writing_foreign_feed_is_permission_error() {
        let (cs, core) = core();
        let mut v = simple("mine");
        core.put(&mut v).unwrap();
        let (feed, id) = v.address().unwrap();

        let other = peer(&cs);
        let mut read = other.get(feed, id, core.get_key(&v)).unwrap();
        assert!(!read.writable());
        assert!(matches!(
            other.put(&mut read),
            Err(GraphError::Permission(_))
        ));
    }

    #[test]
    fn put_all_groups_by_feed() {
        let (_cs, core) = core();
        let second = core.create_feed().unwrap();
        let mut a = simple("a");
        let mut b = simple("b");
        core.put_all([&mut a], None).unwrap();
        core.put_all([&mut b], Some(second)).unwrap();
        assert_ne!(a.feed(), b.feed());
        assert_eq!(b.feed(), Some(second));

        a.set_content(Some(GraphObject::simple([("text", "a2")])));
        b.set_content(Some(GraphObject::simple([("text", "b2")])));
        core.put_all([&mut a, &mut b], None).unwrap();
        assert_eq!(text(&core.get(second, 0, None).unwrap()), "b2");
    }

    #[test]
    fn unknown_feed_is_treated_as_empty() {
        let reader = peer(&MemoryCorestore::new());
        let missing = FeedId::from_bytes([5; 32]);
        assert!(matches!(
            reader.get(missing, 0, None),
            Err(GraphError::NotFound { .. })
        ));
        assert!(matches!(
            reader.get_at_version(missing, 0, 4, None),
            Err(GraphError::Timeout(_))
        ));
    }

    /// Counts the waits for missing feeds.
    struct CountingWaits {
        inner: MemoryCorestore,
        waits: std::sync::atomic::AtomicUsize,
    }

    impl Corestore for CountingWaits {
        fn get(&self, id: &FeedId) -> Result<Option<Arc<dyn Feed>>, StoreError> {
            self.inner.get(id)
        }

        fn create(&self) -> Result<Arc<dyn Feed>, StoreError> {
            self.inner.create()
        }

        fn import_writer(&self, pair: FeedKeyPair) -> Result<Arc<dyn Feed>, StoreError> {
            self.inner.import_writer(pair)
        }

        fn writer_key(&self, id: &FeedId) -> Option<FeedKeyPair> {
            self.inner.writer_key(id)
        }

        fn wait_for(&self, id: &FeedId, timeout: std::time::Duration) -> Result<Arc<dyn Feed>, StoreError> {
            self.waits.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.wait_for(id, timeout)
        }
    }

    #[test]
    fn missing_feed_is_waited_for_once() {
        let swarm = MemoryCorestore::new();
        let counting = Arc::new(CountingWaits {
            inner: swarm.replica(),
            waits: Default::default(),
        });
        let mut config = GraphConfig::default();
        config.store.feed_wait_timeout_ms = 20;
        let reader = Core::new(counting.clone(), Arc::new(KeyRouter::default()), config);

        let missing = FeedId::from_bytes([6; 32]);
        for id in 0..3 {
            assert!(matches!(
                reader.get(missing, id, None),
                Err(GraphError::NotFound { .. })
            ));
        }
        assert!(matches!(
            reader.get_at_version(missing, 0, 2, None),
            Err(GraphError::Timeout(_))
        ));
        assert_eq!(counting.waits.load(std::sync::atomic::Ordering::SeqCst), 1);

    }

    #[test]
    fn create_edges_to_path_builds_and_reuses() {
        let (_cs, core) = core();
        let mut root = Vertex::with_content(GraphObject::directory());
        core.put(&mut root).unwrap();

        let created = core.create_edges_to_path("a/b/c", &mut root, None).unwrap();
        assert_eq!(created.len(), 3);
        assert!(created.iter().all(|s| s.created));
        assert_eq!(root.edges_labeled("a").count(), 1);

        let again = core.create_edges_to_path("a\\b/d", &mut root, None).unwrap();
        assert!(!again[0].created);
        assert!(!again[1].created);
        assert!(again[2].created);
        assert!(again[0].vertex.equals(&created[0].vertex));
        let b = core
            .get(root.feed().unwrap(), again[1].vertex.id() as u64, None)
            .unwrap();
        assert_eq!(b.edges().len(), 2);
    }

    #[test]
    fn create_edges_to_path_replaces_leaf() {
        let (_cs, core) = core();
        let mut root = Vertex::with_content(GraphObject::directory());
        core.put(&mut root).unwrap();

        let mut first = simple("v1");
        core.create_edges_to_path("docs/readme", &mut root, Some(&mut first))
            .unwrap();
        assert!(first.is_persisted());

        let mut second = simple("v2");
        let segments = core
            .create_edges_to_path("docs/readme", &mut root, Some(&mut second))
            .unwrap();
        let docs = core
            .get(root.feed().unwrap(), segments[0].vertex.id() as u64, None)
            .unwrap();
        let edges: Vec<&Edge> = docs.edges_labeled("readme").collect();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target as i64, second.id());
    }

    #[test]
    fn create_edges_to_path_prefers_latest_sibling() {
        let (_cs, core) = core();
        let mut root = Vertex::with_content(GraphObject::directory());
        core.put(&mut root).unwrap();

        let mut old = simple("old");
        core.put(&mut old).unwrap();
        let mut new = simple("new");
        core.put(&mut new).unwrap();
        root.add_edge_to(&old, "dir").unwrap();
        root.add_edge_to(&new, "dir").unwrap();
        core.put(&mut root).unwrap();

        let segments = core.create_edges_to_path("dir/x", &mut root, None).unwrap();
        assert!(segments[0].vertex.equals(&new));
    }

    #[test]
    fn create_edges_to_path_rejects_empty_and_foreign_roots() {
        let (cs, core) = core();
        let mut root = Vertex::with_content(GraphObject::directory());
        assert!(matches!(
            core.create_edges_to_path("a", &mut root, None),
            Err(GraphError::Structural(_))
        ));
        core.put(&mut root).unwrap();
        assert!(matches!(
            core.create_edges_to_path("//", &mut root, None),
            Err(GraphError::Structural(_))
        ));

        let other = peer(&cs);
        let (feed, id) = root.address().unwrap();
        let mut foreign = other.get(feed, id, core.get_key(&root)).unwrap();
        assert!(matches!(
            other.create_edges_to_path("a", &mut foreign, None),
            Err(GraphError::Permission(_))
        ));
    }

    #[test]
    fn tombstone_hides_path_entry() {
        let (_cs, core) = core();
        let mut root = Vertex::with_content(GraphObject::directory());
        core.put(&mut root).unwrap();
        let mut file = simple("data");
        core.create_edges_to_path("f", &mut root, Some(&mut file)).unwrap();
        let segments = core.tombstone_path("f", &mut root).unwrap();
        assert_eq!(
            segments[0].vertex.type_name(),
            Some(GraphObject::THOMBSTONE)
        );
    }

    #[test]
    fn modify_keeps_concurrent_edges() {
        let (cs, core) = core();
        let mut hub = Vertex::with_content(GraphObject::directory());
        core.put(&mut hub).unwrap();
        let (feed, id) = hub.address().unwrap();

        let other = peer(&cs);
        other.import_writer(core.writer_key(&feed).unwrap()).unwrap();
        other.register_vertex_key(id, feed, core.get_key(&hub).unwrap());

        let stale = core.get(feed, id, None).unwrap();
        other
            .modify(feed, id, |v| {
                v.add_edge(Edge::new(7, "from-other", None));
                Ok(())
            })
            .unwrap();
        let updated = core
            .modify(feed, id, |v| {
                v.add_edge(Edge::new(8, "from-core", None));
                Ok(())
            })
            .unwrap();
        assert_eq!(stale.edges().len(), 0);
        assert_eq!(updated.edges().len(), 2);
    }

    #[test]
    fn put_with_key_uses_the_given_key() {
        let (cs, core) = core();
        let key = ObjectKey::generate(hg_crypto::KeyKind::Stream);
        let mut v = simple("keyed");
        core.put_with_key(&mut v, None, key.clone()).unwrap();
        assert_eq!(core.get_key(&v), Some(key.clone()));

        let (feed, id) = v.address().unwrap();
        let reader = peer(&cs);
        assert_eq!(text(&reader.get(feed, id, Some(key.clone())).unwrap()), "keyed");
        assert!(matches!(
            core.put_with_key(&mut v, None, key),
            Err(GraphError::Structural(_))
        ));
    }

    #[test]
    fn latest_write_tie_breaks_on_id() {
        let feed = FeedId::from_bytes([1; 32]);
        let mut a = Vertex::new(None);
        a.stamp(1, feed, 1, 10, false);
        let mut b = Vertex::new(None);
        b.stamp(2, feed, 1, 10, false);
        let mut c = Vertex::new(None);
        c.stamp(3, feed, 1, 5, false);
        assert_eq!(latest_write([a, b, c]).unwrap().id(), 2);
        assert!(latest_write(Vec::new()).is_none());
    }

    #[test]
    fn split_path_normalizes() {
        assert_eq!(split_path("/a//b\\c/"), vec!["a", "b", "c"]);
        assert!(split_path("").is_empty());
    }
}
