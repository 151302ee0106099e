use std::sync::Arc;

use tracing::{debug, info};

use hg_crypto::{BoxPublicKey, KeyRouter, ObjectKey, UserKeyPair};
use hg_graph::{
    Core, GraphConfig, GraphError, GraphObject, Inbox, PathSegment, Share, UserKey, UserProfile,
    UserRoot, Vertex, VertexUrl, ViewKind,
};
use hg_query::social::{self, share_message};
use hg_query::{
    CollaborationSpace, Crawler, Query, QueryState, ShareView, VertexLike, ViewContext,
    VirtualCommShare, VirtualContact, VirtualDriveShare,
};
use hg_store::Corestore;
use hg_types::FeedId;

use crate::error::{SdkError, SdkResult};

/// A user created or opened by a session.
///
/// `keys` opens the envelopes friends address to the user; keep it to
/// open the user again in a later session.
#[derive(Clone, Debug)]
pub struct User {
    pub root: Vertex,
    pub keys: UserKeyPair,
}

/// High-level hypergraph session.
///
/// Wraps one [`Core`] and its views. Everything a session reads or writes
/// goes through the key router of that core, so two sessions over the same
/// corestore see the same feeds but only the keys they were handed.
pub struct HyperGraph {
    ctx: Arc<ViewContext>,
}

impl HyperGraph {
    /// Open a session over the corestore selected by `config.store`.
    pub fn open(config: GraphConfig) -> SdkResult<Self> {
        let core = Core::open(config)?;
        Ok(Self::from_core(core))
    }

    /// Open a session over an existing corestore, e.g. a swarm replica.
    pub fn with_corestore(corestore: Arc<dyn Corestore>, config: GraphConfig) -> Self {
        Self::from_core(Core::new(corestore, Arc::new(KeyRouter::default()), config))
    }

    fn from_core(core: Core) -> Self {
        Self {
            ctx: ViewContext::new(Arc::new(core)),
        }
    }

    pub fn context(&self) -> &Arc<ViewContext> {
        &self.ctx
    }

    pub fn core(&self) -> &Arc<Core> {
        self.ctx.core()
    }

    // ---- Vertices ----

    pub fn create(&self, content: GraphObject) -> Vertex {
        self.core().create(content)
    }

    pub fn get(&self, feed: FeedId, id: u64, key: Option<ObjectKey>) -> SdkResult<Vertex> {
        Ok(self.core().get(feed, id, key)?)
    }

    /// Read the vertex a URL points at, at its pinned version if any.
    pub fn get_url(&self, url: &VertexUrl) -> SdkResult<Vertex> {
        let key = url.key.clone();
        Ok(match url.version {
            Some(version) => self.core().get_at_version(url.feed, url.id, version, key)?,
            None => self.core().get(url.feed, url.id, key)?,
        })
    }

    pub fn put(&self, vertex: &mut Vertex) -> SdkResult<()> {
        Ok(self.core().put(vertex)?)
    }

    pub fn put_all<'v>(&self, vertices: impl IntoIterator<Item = &'v mut Vertex>) -> SdkResult<()> {
        Ok(self.core().put_all(vertices, None)?)
    }

    /// URL of a persisted vertex, carrying its key when the session has it.
    pub fn url(&self, vertex: &Vertex) -> SdkResult<VertexUrl> {
        let (feed, id) = vertex.require_address()?;
        let url = VertexUrl::new(feed, id);
        Ok(match self.core().get_key(vertex) {
            Some(key) => url.with_key(key),
            None => url,
        })
    }

    pub fn get_key(&self, vertex: &Vertex) -> Option<ObjectKey> {
        self.core().get_key(vertex)
    }

    pub fn register_vertex_key(&self, id: u64, feed: FeedId, key: ObjectKey) {
        self.core().register_vertex_key(id, feed, key);
    }

    // ---- Paths and queries ----

    /// Query starting at `vertex`. Edges are interpreted by `view`, the
    /// plain graph view by default.
    pub fn query_at_vertex(&self, vertex: impl Into<VertexLike>, view: Option<ViewKind>) -> Query {
        Query::at_vertex(&self.ctx, vertex, view.unwrap_or(ViewKind::Graph))
    }

    pub fn query_path_at_vertex(
        &self,
        path: &str,
        root: impl Into<VertexLike>,
        view: Option<ViewKind>,
    ) -> Query {
        Query::at_path(&self.ctx, path, root, view.unwrap_or(ViewKind::Graph))
    }

    pub fn create_edges_to_path(
        &self,
        path: &str,
        root: &mut Vertex,
        leaf: Option<&mut Vertex>,
    ) -> SdkResult<Vec<PathSegment>> {
        Ok(self.core().create_edges_to_path(path, root, leaf)?)
    }

    /// Hide whatever lives at `path` below `root` behind a tombstone.
    pub fn tombstone_path(&self, path: &str, root: &mut Vertex) -> SdkResult<Vec<PathSegment>> {
        Ok(self.core().tombstone_path(path, root)?)
    }

    /// The vertex at `path`, creating missing directories on the way.
    fn ensure_path(&self, path: &str, root: &mut Vertex) -> SdkResult<PathSegment> {
        self.create_edges_to_path(path, root, None)?
            .pop()
            .ok_or_else(|| SdkError::InvalidOperation(format!("empty path '{path}'")))
    }

    /// First readable target of `vertex`'s `label` edges.
    fn first_target(&self, vertex: &Vertex, label: &str) -> SdkResult<Vertex> {
        let feed = vertex.require_address()?.0;
        let edge = vertex
            .edges_labeled(label)
            .next()
            .ok_or_else(|| SdkError::IncompleteUser(label.to_string()))?;
        Ok(self
            .core()
            .get(edge.target_feed(feed), edge.target, edge.key()?)?)
    }

    // ---- Users and friends ----

    /// Create a user root in the default feed, with its identity, profile,
    /// an inbox and empty friends, channels and shares directories.
    pub fn create_user(&self, name: &str) -> SdkResult<User> {
        let core = self.core();
        let keys = UserKeyPair::generate();
        core.router().register_user_key_pair(keys.clone());
        let feed = core.default_feed()?;

        let mut identity = Vertex::with_content(GraphObject::UserKey(UserKey {
            public_key: keys.public_key(),
        }));
        let mut profile = Vertex::with_content(GraphObject::UserProfile(UserProfile {
            name: Some(name.to_string()),
            ..UserProfile::default()
        }));
        let mut friends = Vertex::with_content(GraphObject::directory());
        let mut channels = Vertex::with_content(GraphObject::directory());
        let mut shares = Vertex::with_content(GraphObject::directory());
        core.put_all(
            [&mut identity, &mut profile, &mut friends, &mut channels, &mut shares],
            Some(feed),
        )?;
        let inbox = Inbox::create(Arc::clone(core), Some(feed))?;

        let mut root = Vertex::with_content(GraphObject::UserRoot(UserRoot {}));
        root.add_edge_to(&identity, social::IDENTITY)?;
        root.add_edge_to(&profile, social::PROFILE)?;
        root.add_edge_to(&friends, social::FRIENDS)?;
        root.add_edge_to(inbox.vertex(), social::INBOX)?;
        root.add_edge_to(&channels, social::CHANNELS)?;
        root.add_edge_to(&shares, social::SHARES)?;
        core.put_all([&mut root], Some(feed))?;
        info!(feed = %feed.short_hex(), name, "created user");
        Ok(User { root, keys })
    }

    /// Open a user created earlier, by the URL of its root.
    pub fn open_user(&self, url: &VertexUrl, keys: UserKeyPair) -> SdkResult<User> {
        let root = self.get_url(url)?;
        if !matches!(root.content(), Some(GraphObject::UserRoot(_))) {
            return Err(SdkError::InvalidOperation(format!("{url} is not a user root")));
        }
        self.core().router().register_user_key_pair(keys.clone());
        Ok(User { root, keys })
    }

    /// The published public key of a user.
    pub fn public_key(&self, user_root: &Vertex) -> SdkResult<BoxPublicKey> {
        match self.first_target(user_root, social::IDENTITY)?.content() {
            Some(GraphObject::UserKey(key)) => Ok(key.public_key),
            _ => Err(SdkError::IncompleteUser(social::IDENTITY.to_string())),
        }
    }

    /// Link the user root behind `friend` into the friends of `root`.
    ///
    /// Returns the friend's root. Adding a friend twice is a no-op.
    pub fn add_friend(&self, root: &mut Vertex, friend: &VertexUrl) -> SdkResult<Vertex> {
        let friend_root = self.get_url(friend)?;
        if !matches!(friend_root.content(), Some(GraphObject::UserRoot(_))) {
            return Err(SdkError::InvalidOperation(format!("{friend} is not a user root")));
        }
        let dir = self.ensure_path(social::FRIENDS, root)?.vertex;
        let (feed, id) = dir.require_address()?;
        let known = dir
            .edges_labeled(social::FRIEND)
            .any(|e| e.target == friend.id && e.target_feed(feed) == friend.feed);
        if !known {
            self.core().modify(feed, id, |dir| {
                dir.add_edge_to(&friend_root, social::FRIEND)?;
                Ok(())
            })?;
            debug!(friend = %friend.feed.short_hex(), "added friend");
        }
        Ok(friend_root)
    }

    pub fn contacts(&self, root: &Vertex) -> Vec<VirtualContact> {
        self.query_at_vertex(root.clone(), Some(ViewKind::Contacts))
            .out(social::CONTACTS)
            .states()
            .values_logged()
            .into_iter()
            .filter_map(|state| match state.value {
                VertexLike::VirtualContact(contact) => Some(contact),
                _ => None,
            })
            .collect()
    }

    // ---- Shares ----

    /// Share `target`: a marker pointing at it, linked from the shares of
    /// `root`. Hand out [`share_url`](Self::share_url) of the marker.
    pub fn create_share(
        &self,
        target: &Vertex,
        root: &mut Vertex,
        info: Option<&str>,
    ) -> SdkResult<Vertex> {
        let core = self.core();
        let feed = core.default_feed()?;
        let mut marker = Vertex::with_content(GraphObject::Share(Share {
            revoked: false,
            info: info.map(str::to_string),
            owner: Some(feed),
        }));
        marker.add_edge_to(target, social::SHARE)?;
        core.put_all([&mut marker], Some(feed))?;

        let dir = self.ensure_path(social::SHARES, root)?.vertex;
        let (dir_feed, dir_id) = dir.require_address()?;
        core.modify(dir_feed, dir_id, |dir| {
            dir.add_edge_to(&marker, social::SHARE)?;
            Ok(())
        })?;
        debug!(marker = marker.id(), "created share");
        Ok(marker)
    }

    /// Mark a share revoked. The marker stays readable; traversals through
    /// it fail with [`GraphError::ShareRevoked`].
    pub fn revoke_share(&self, marker: &mut Vertex) -> SdkResult<()> {
        let (feed, id) = marker.require_address()?;
        if marker.content().and_then(GraphObject::as_share).is_none() {
            return Err(SdkError::NotAShare(format!("{id} in feed {}", feed.short_hex())));
        }
        *marker = self.core().modify(feed, id, |vertex| match vertex.content_mut() {
            Some(GraphObject::Share(share)) => {
                share.revoked = true;
                Ok(())
            }
            _ => Err(GraphError::Structural("share marker changed type".into())),
        })?;
        info!(marker = id, feed = %feed.short_hex(), "revoked share");
        Ok(())
    }

    /// URL of a share marker, named after its info.
    pub fn share_url(&self, marker: &Vertex) -> SdkResult<VertexUrl> {
        let share = marker
            .content()
            .and_then(GraphObject::as_share)
            .ok_or_else(|| SdkError::NotAShare(marker.id().to_string()))?;
        let url = self.url(marker)?;
        Ok(match &share.info {
            Some(info) => url.with_name(info.clone()),
            None => url,
        })
    }

    /// The vertices a share URL grants access to.
    pub fn resolve_share(&self, url: &VertexUrl) -> SdkResult<Vec<Vertex>> {
        let marker = self.get_url(url)?;
        if marker.content().and_then(GraphObject::as_share).is_none() {
            return Err(SdkError::NotAShare(url.to_string()));
        }
        let state = QueryState::new(marker, ViewKind::Share);
        Ok(ShareView::resolve(&self.ctx, &state)
            .destruct()?
            .into_iter()
            .filter_map(|s| s.value.into_vertex())
            .collect())
    }

    /// Shares of `root` that are not revoked.
    pub fn active_shares(&self, root: &Vertex) -> Vec<VirtualDriveShare> {
        self.query_at_vertex(root.clone(), Some(ViewKind::DriveShare))
            .out(social::SHARES)
            .states()
            .values_logged()
            .into_iter()
            .filter_map(|state| match state.value {
                VertexLike::VirtualDriveShare(share) => Some(share),
                _ => None,
            })
            .collect()
    }

    // ---- Messaging ----

    /// Send a share to a friend over the channel of `root` to them.
    ///
    /// The channel is created on first use and announced in the inbox of
    /// `root` with an envelope only the friend can open.
    pub fn send_share(&self, root: &mut Vertex, friend_root: &Vertex, marker: &Vertex) -> SdkResult<()> {
        let url = self.share_url(marker)?;
        let recipient = self.public_key(friend_root)?;
        let friend_feed = friend_root.require_address()?.0;

        let path = format!("{}/{}", social::CHANNELS, friend_feed.to_hex());
        let channel = self.ensure_path(&path, root)?;
        if channel.created {
            let inbox = self.first_target(root, social::INBOX)?;
            Inbox::open(Arc::clone(self.core()), inbox)?.post_envelope(&channel.vertex, &recipient)?;
            debug!(friend = %friend_feed.short_hex(), "opened channel");
        }

        let (feed, id) = channel.vertex.require_address()?;
        let mut message = Vertex::with_content(share_message(&url));
        self.core().put_all([&mut message], Some(feed))?;
        self.core().modify(feed, id, |channel| {
            channel.add_edge_to(&message, social::MESSAGE)?;
            Ok(())
        })?;
        info!(friend = %friend_feed.short_hex(), "sent share");
        Ok(())
    }

    /// Shares friends sent to the user of `root`.
    pub fn received_shares(&self, root: &Vertex) -> Vec<VirtualCommShare> {
        self.query_at_vertex(root.clone(), Some(ViewKind::Communication))
            .out(social::RECEIVED_SHARES)
            .states()
            .values_logged()
            .into_iter()
            .filter_map(|state| match state.value {
                VertexLike::VirtualShare(share) => Some(share),
                _ => None,
            })
            .collect()
    }

    // ---- Spaces and crawling ----

    /// Turn the persisted `root` into the content root of a new space.
    pub fn create_space(&self, root: &Vertex) -> SdkResult<CollaborationSpace> {
        Ok(CollaborationSpace::create(&self.ctx, root)?)
    }

    pub fn open_space(&self, url: &VertexUrl) -> SdkResult<CollaborationSpace> {
        let marker = self.get_url(url)?;
        Ok(CollaborationSpace::open(&self.ctx, marker)?)
    }

    pub fn crawler(&self) -> Crawler {
        Crawler::new(&self.ctx)
    }
}

impl std::fmt::Debug for HyperGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperGraph").field("ctx", &self.ctx).finish()
    }
}
