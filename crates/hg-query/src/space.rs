//! Collaboration spaces.
//!
//! A space is a marker vertex owned by one feed. Its `.` edges lead to the
//! content roots: the owner's root directly, and every writer's root
//! through a preshared vertex (PSV). Each PSV lives in a slot feed of its
//! own and hands out that feed's write capability, so writers append to
//! slot feeds and never to the owner's. Slots expire and are rotated by
//! the owner.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::{debug, info};

use hg_crypto::{FeedKeyPair, KEY_LEN};
use hg_graph::{Edge, GraphError, GraphObject, GraphResult, PreShared, Space, Vertex, ViewKind};
use hg_types::FeedId;

use crate::query::Query;
use crate::view::{Referrer, ViewContext, ROOT_LABEL};
use crate::vertex_like::is_referrer_edge;

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// One preshared write target of a space.
#[derive(Clone, Debug)]
pub struct Slot {
    /// The marker edge leading to the preshared vertex.
    pub edge: Edge,
    pub referrer: Referrer,
    pub vertex: Vertex,
    pub preshared: PreShared,
}

impl Slot {
    pub fn feed(&self) -> Option<FeedId> {
        self.vertex.feed()
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.preshared.is_expired(now_ms)
    }

    /// Whether some writer already contributed through this slot.
    pub fn is_used(&self) -> bool {
        self.vertex.edges_labeled(&self.referrer.label).next().is_some()
    }
}

/// A collaboration space seen from one session.
pub struct CollaborationSpace {
    ctx: Arc<ViewContext>,
    marker: Vertex,
}

impl CollaborationSpace {
    /// Turn `root` into the content root of a new space owned by this
    /// session, with a full set of writer slots.
    pub fn create(ctx: &Arc<ViewContext>, root: &Vertex) -> GraphResult<Self> {
        let owner = root
            .feed()
            .ok_or_else(|| GraphError::Structural("space root must be persisted".into()))?;
        let mut marker = Vertex::with_content(GraphObject::Space(Space { owner: Some(owner) }));
        marker.add_edge_to(root, ROOT_LABEL)?;
        ctx.core().put_all([&mut marker], Some(owner))?;
        let mut space = Self {
            ctx: Arc::clone(ctx),
            marker,
        };
        let created = space.rotate()?;
        info!(owner = %owner.short_hex(), slots = created, "created collaboration space");
        Ok(space)
    }

    /// Wrap an existing space marker.
    pub fn open(ctx: &Arc<ViewContext>, marker: Vertex) -> GraphResult<Self> {
        marker.require_address()?;
        if marker.content().and_then(GraphObject::as_space).is_none() {
            return Err(GraphError::Structural("not a collaboration space marker".into()));
        }
        Ok(Self {
            ctx: Arc::clone(ctx),
            marker,
        })
    }

    pub fn marker(&self) -> &Vertex {
        &self.marker
    }

    pub fn owner(&self) -> Option<FeedId> {
        self.marker
            .content()
            .and_then(GraphObject::as_space)
            .and_then(|s| s.owner)
            .or(self.marker.feed())
    }

    /// Whether this session can manage the space's slots.
    pub fn is_owner(&self) -> bool {
        self.marker.writable()
    }

    fn reload(&mut self) -> GraphResult<()> {
        let (feed, id) = self.marker.require_address()?;
        self.marker = self.ctx.core().get(feed, id, None)?;
        Ok(())
    }

    /// The owner's content root.
    pub fn content_root(&self) -> GraphResult<Vertex> {
        let feed = self.marker.require_address()?.0;
        let edge = self
            .marker
            .edges_labeled(ROOT_LABEL)
            .find(|e| !is_referrer_edge(e))
            .ok_or_else(|| GraphError::Structural("space has no content root".into()))?;
        self.ctx
            .core()
            .get(edge.target_feed(feed), edge.target, edge.key()?)
    }

    /// Current writer slots, read fresh from the marker.
    pub fn slots(&mut self) -> GraphResult<Vec<Slot>> {
        self.reload()?;
        let feed = self.marker.require_address()?.0;
        self.marker
            .edges_labeled(ROOT_LABEL)
            .filter(|e| is_referrer_edge(e))
            .map(|edge| {
                let referrer = Referrer::from_edge(edge)?;
                let vertex =
                    self.ctx
                        .core()
                        .get(edge.target_feed(feed), edge.target, edge.key()?)?;
                let preshared = vertex
                    .content()
                    .and_then(GraphObject::as_pre_shared)
                    .cloned()
                    .ok_or_else(|| GraphError::Structural("slot is not a preshared vertex".into()))?;
                Ok(Slot {
                    edge: edge.clone(),
                    referrer,
                    vertex,
                    preshared,
                })
            })
            .collect()
    }

    /// Slots writers may still pick.
    pub fn available_slots(&mut self) -> GraphResult<Vec<Slot>> {
        let now = now_ms();
        Ok(self
            .slots()?
            .into_iter()
            .filter(|slot| !slot.is_expired(now))
            .collect())
    }

    /// Replace expired slots.
    ///
    /// Expired slots nobody wrote through are unlinked; used ones stay so
    /// their contributions remain reachable. New slots are created until
    /// `GraphConfig::preshared_slots` are active. Returns how many were
    /// created.
    pub fn rotate(&mut self) -> GraphResult<usize> {
        if !self.is_owner() {
            return Err(GraphError::Permission("only the space owner rotates slots".into()));
        }
        let now = now_ms();
        let slots = self.slots()?;
        let stale: Vec<Edge> = slots
            .iter()
            .filter(|slot| slot.is_expired(now) && !slot.is_used())
            .map(|slot| slot.edge.clone())
            .collect();
        let active = slots.iter().filter(|slot| !slot.is_expired(now)).count();
        let wanted = self.ctx.core().config().preshared_slots.saturating_sub(active);

        let fresh = (0..wanted)
            .map(|_| self.new_slot(now))
            .collect::<GraphResult<Vec<Edge>>>()?;
        if stale.is_empty() && fresh.is_empty() {
            return Ok(0);
        }

        let (feed, id) = self.marker.require_address()?;
        self.marker = self.ctx.core().modify(feed, id, |marker| {
            marker
                .edges_mut()
                .retain(|e| !stale.iter().any(|s| s.target == e.target && s.feed == e.feed));
            marker.edges_mut().extend(fresh.iter().cloned());
            Ok(())
        })?;
        debug!(dropped = stale.len(), created = fresh.len(), "rotated space slots");
        Ok(fresh.len())
    }

    /// Create a preshared vertex in a new slot feed and return the marker
    /// edge for it.
    fn new_slot(&self, now: u64) -> GraphResult<Edge> {
        let core = self.ctx.core();
        let feed = core.create_feed()?;
        let pair = core
            .writer_key(&feed)
            .ok_or_else(|| GraphError::Permission(format!("no write capability for slot feed {feed}")))?;
        let ttl = core.config().preshared_ttl().as_millis() as u64;
        let mut vertex = Vertex::with_content(GraphObject::PreShared(PreShared {
            owner: self.owner(),
            expiry_date: now.saturating_add(ttl),
            write_capability: Some(pair.secret_bytes().to_vec()),
        }));
        core.put_all([&mut vertex], Some(feed))?;

        let kind = core.config().key_kind;
        let referrer = Referrer::generate(core.router().generate_encryption_key(kind));
        let mut edge = Edge::new(vertex.require_address()?.1, ROOT_LABEL, Some(feed));
        referrer.apply(&mut edge)?;
        if let Some(key) = core.get_key(&vertex) {
            edge.set_key(&key);
        }
        Ok(edge)
    }

    /// Contribute `vertex` through a randomly picked available slot.
    ///
    /// The vertex is written to this session's default feed under the
    /// slot's referrer key, then linked from the preshared vertex under the
    /// referrer label. Readers of the space see it as another content root.
    /// Writers picking the same slot leave sibling links; nothing is
    /// overwritten.
    pub fn write_to_preshared_vertex(&mut self, vertex: &mut Vertex) -> GraphResult<()> {
        let slots = self.available_slots()?;
        let slot = slots
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| GraphError::Structural("no preshared slot available".into()))?;
        let (psv_feed, psv_id) = slot.vertex.require_address()?;

        let core = self.ctx.core();
        if core.writer_key(&psv_feed).is_none() {
            let secret = slot
                .preshared
                .write_capability
                .as_deref()
                .ok_or_else(|| GraphError::Permission("slot carries no write capability".into()))?;
            let secret: [u8; KEY_LEN] = secret
                .try_into()
                .map_err(|_| GraphError::Structural("malformed slot write capability".into()))?;
            core.import_writer(FeedKeyPair::from_bytes(secret))?;
        }

        core.put_with_key(vertex, None, slot.referrer.key.clone())?;
        let (feed, id) = vertex.require_address()?;
        let label = slot.referrer.label.clone();
        core.modify(psv_feed, psv_id, |psv| {
            psv.add_edge(Edge::new(id, label.clone(), Some(feed)));
            Ok(())
        })?;
        debug!(slot = %psv_feed.short_hex(), "wrote through preshared vertex");
        Ok(())
    }

    /// Query positioned on the marker, seeing every content root.
    pub fn query(&self) -> Query {
        Query::at_vertex(&self.ctx, self.marker.clone(), ViewKind::Space)
    }

    /// All content roots: the owner's and every contribution.
    pub fn roots(&self) -> GraphResult<Vec<Vertex>> {
        let state = crate::state::QueryState::new(self.marker.clone(), ViewKind::Space);
        crate::view::SpaceView::roots(&self.ctx, &state)
            .destruct()?
            .into_iter()
            .filter_map(|s| s.value.into_vertex())
            .map(Ok)
            .collect()
    }
}

impl std::fmt::Debug for CollaborationSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollaborationSpace")
            .field("marker", &self.marker.address())
            .field("owner", &self.owner())
            .finish()
    }
}
