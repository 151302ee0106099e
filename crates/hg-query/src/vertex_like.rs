use hg_crypto::BoxPublicKey;
use hg_graph::{meta, Edge, GraphObject, Share, UserProfile, Vertex, VertexUrl, ViewKind};
use hg_types::FeedId;

use crate::social;

/// Identity of a vertex for visited-set bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum VertexKey {
    Object(FeedId, u64),
    Virtual(String),
}

/// A share received as a message on a communication channel.
///
/// Exposes a single `share` edge that resolves through the share marker
/// the message points at.
#[derive(Clone, Debug)]
pub struct VirtualCommShare {
    pub message: Vertex,
    pub url: VertexUrl,
    pub sender: Option<FeedId>,
    edges: Vec<Edge>,
}

impl VirtualCommShare {
    pub fn new(message: Vertex, url: VertexUrl, sender: Option<FeedId>) -> Self {
        let mut edge = Edge::new(url.id, social::SHARE, Some(url.feed)).with_view(ViewKind::Share);
        if let Some(key) = &url.key {
            edge.set_key(key);
        }
        Self {
            message,
            url,
            sender,
            edges: vec![edge],
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.url.name.as_deref()
    }
}

/// An active share marker of the local user.
#[derive(Clone, Debug)]
pub struct VirtualDriveShare {
    pub marker: Vertex,
}

impl VirtualDriveShare {
    pub fn share(&self) -> Option<&Share> {
        self.marker.content().and_then(GraphObject::as_share)
    }

    /// The edge to the shared vertex.
    pub fn target(&self) -> Option<&Edge> {
        self.marker.edges_labeled(social::SHARE).next()
    }
}

/// A friend as listed in the contacts.
#[derive(Clone, Debug)]
pub struct VirtualContact {
    pub root: Vertex,
    pub profile: Option<UserProfile>,
    pub public_key: Option<BoxPublicKey>,
}

impl VirtualContact {
    pub fn name(&self) -> Option<&str> {
        self.profile.as_ref()?.name.as_deref()
    }
}

/// A persisted vertex or a vertex computed by a view.
///
/// Traversal code treats every variant alike through the accessors below;
/// only the views that build virtual vertices match on them.
#[derive(Clone, Debug)]
pub enum VertexLike {
    Real(Vertex),
    VirtualShare(VirtualCommShare),
    VirtualDriveShare(VirtualDriveShare),
    VirtualContact(VirtualContact),
}

impl VertexLike {
    pub fn content(&self) -> Option<&GraphObject> {
        match self {
            Self::Real(v) => v.content(),
            Self::VirtualShare(s) => s.message.content(),
            Self::VirtualDriveShare(s) => s.marker.content(),
            Self::VirtualContact(c) => c.root.content(),
        }
    }

    pub fn edges(&self) -> &[Edge] {
        match self {
            Self::Real(v) => v.edges(),
            Self::VirtualShare(s) => &s.edges,
            Self::VirtualDriveShare(s) => s.marker.edges(),
            Self::VirtualContact(c) => c.root.edges(),
        }
    }

    /// Feed that same-feed edges of this vertex resolve against.
    pub fn feed(&self) -> Option<FeedId> {
        match self {
            Self::Real(v) => v.feed(),
            Self::VirtualShare(s) => s.message.feed(),
            Self::VirtualDriveShare(s) => s.marker.feed(),
            Self::VirtualContact(c) => c.root.feed(),
        }
    }

    pub fn timestamp(&self) -> Option<u64> {
        match self {
            Self::Real(v) => v.timestamp(),
            Self::VirtualShare(s) => s.message.timestamp(),
            Self::VirtualDriveShare(s) => s.marker.timestamp(),
            Self::VirtualContact(c) => c.root.timestamp(),
        }
    }

    pub fn key(&self) -> Option<VertexKey> {
        match self {
            Self::Real(v) => v.address().map(|(feed, id)| VertexKey::Object(feed, id)),
            Self::VirtualShare(s) => Some(VertexKey::Virtual(format!(
                "share:{}/{}",
                s.url.feed.to_hex(),
                s.url.id
            ))),
            Self::VirtualDriveShare(s) => s
                .marker
                .address()
                .map(|(feed, id)| VertexKey::Virtual(format!("drive:{}/{id}", feed.to_hex()))),
            Self::VirtualContact(c) => c
                .root
                .address()
                .map(|(feed, id)| VertexKey::Virtual(format!("contact:{}/{id}", feed.to_hex()))),
        }
    }

    pub fn equals(&self, other: &VertexLike) -> bool {
        match (self, other) {
            (Self::Real(a), Self::Real(b)) => a.equals(b),
            _ => self.key().is_some() && self.key() == other.key(),
        }
    }

    pub fn is_virtual(&self) -> bool {
        !matches!(self, Self::Real(_))
    }

    pub fn as_vertex(&self) -> Option<&Vertex> {
        match self {
            Self::Real(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_vertex(self) -> Option<Vertex> {
        match self {
            Self::Real(v) => Some(v),
            _ => None,
        }
    }

    pub fn type_name(&self) -> Option<&str> {
        self.content().map(GraphObject::type_name)
    }
}

impl From<Vertex> for VertexLike {
    fn from(vertex: Vertex) -> Self {
        Self::Real(vertex)
    }
}

/// Whether `edge` leads into a preshared vertex through a referrer.
pub fn is_referrer_edge(edge: &Edge) -> bool {
    edge.has_metadata(meta::REF_KEY) && edge.has_metadata(meta::REF_LABEL)
}
