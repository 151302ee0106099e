use hg_types::FeedId;

use crate::edge::Edge;
use crate::error::{GraphError, GraphResult};
use crate::object::GraphObject;

/// Id of a vertex that has not been persisted yet.
pub const UNPERSISTED: i64 = -1;

/// A versioned graph node: typed content plus an ordered list of edges.
///
/// A vertex is persisted iff `id >= 0`, and then `feed` is set. `Core`
/// stamps id, feed, version, timestamp and writability after every read
/// and write; the rest is freely mutable until the next `put`.
#[derive(Clone, Debug)]
pub struct Vertex {
    id: i64,
    feed: Option<FeedId>,
    version: Option<u64>,
    timestamp: Option<u64>,
    content: Option<GraphObject>,
    edges: Vec<Edge>,
    writable: bool,
}

impl Vertex {
    pub fn new(content: Option<GraphObject>) -> Self {
        Self {
            id: UNPERSISTED,
            feed: None,
            version: None,
            timestamp: None,
            content,
            edges: Vec::new(),
            writable: true,
        }
    }

    pub fn with_content(content: GraphObject) -> Self {
        Self::new(Some(content))
    }

    /// A vertex as decoded from storage.
    pub fn from_parts(
        id: u64,
        feed: FeedId,
        content: Option<GraphObject>,
        edges: Vec<Edge>,
    ) -> Self {
        Self {
            id: id as i64,
            feed: Some(feed),
            version: None,
            timestamp: None,
            content,
            edges,
            writable: false,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn feed(&self) -> Option<FeedId> {
        self.feed
    }

    pub fn version(&self) -> Option<u64> {
        self.version
    }

    pub fn timestamp(&self) -> Option<u64> {
        self.timestamp
    }

    pub fn writable(&self) -> bool {
        self.writable
    }

    pub fn is_persisted(&self) -> bool {
        self.id >= 0 && self.feed.is_some()
    }

    /// `(feed, id)` of a persisted vertex.
    pub fn address(&self) -> Option<(FeedId, u64)> {
        match (self.feed, u64::try_from(self.id)) {
            (Some(feed), Ok(id)) => Some((feed, id)),
            _ => None,
        }
    }

    /// Like [`address`](Vertex::address) but an error for unpersisted vertices.
    pub fn require_address(&self) -> GraphResult<(FeedId, u64)> {
        self.address()
            .ok_or_else(|| GraphError::Structural("vertex is not persisted".into()))
    }

    pub fn content(&self) -> Option<&GraphObject> {
        self.content.as_ref()
    }

    pub fn content_mut(&mut self) -> Option<&mut GraphObject> {
        self.content.as_mut()
    }

    pub fn set_content(&mut self, content: Option<GraphObject>) {
        self.content = content;
    }

    pub fn type_name(&self) -> Option<&str> {
        self.content.as_ref().map(GraphObject::type_name)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edges_mut(&mut self) -> &mut Vec<Edge> {
        &mut self.edges
    }

    /// Edges with `label`, in order.
    pub fn edges_labeled<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.label == label)
    }

    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    /// Add an edge to a persisted `target` and return it for further
    /// decoration.
    pub fn add_edge_to(&mut self, target: &Vertex, label: impl Into<String>) -> GraphResult<&mut Edge> {
        let (feed, id) = target.address().ok_or_else(|| {
            GraphError::Structural("edge target must be persisted before linking".into())
        })?;
        self.edges.push(Edge::new(id, label, Some(feed)));
        let last = self.edges.len() - 1;
        Ok(&mut self.edges[last])
    }

    /// Remove all edges labeled `label`, returning how many were removed.
    pub fn remove_edges(&mut self, label: &str) -> usize {
        let before = self.edges.len();
        self.edges.retain(|e| e.label != label);
        before - self.edges.len()
    }

    /// Remove the edges to `target` matching `label`.
    pub fn remove_edge_to(&mut self, target: &Vertex, label: &str) -> usize {
        let Some((feed, id)) = target.address() else {
            return 0;
        };
        let source = self.feed;
        let before = self.edges.len();
        self.edges.retain(|e| {
            let same_feed = e.feed.or(source) == Some(feed);
            !(e.label == label && e.target == id && same_feed)
        });
        before - self.edges.len()
    }

    /// Identity of two vertices.
    ///
    /// Same `(feed, id)` and same version means equal. If the versions
    /// differ, the vertices are equal only if their content is.
    pub fn equals(&self, other: &Vertex) -> bool {
        if self.address().is_none() || self.address() != other.address() {
            return false;
        }
        self.version == other.version || self.content == other.content
    }

    /// Record where and when this vertex was persisted.
    pub fn stamp(&mut self, id: u64, feed: FeedId, version: u64, timestamp: u64, writable: bool) {
        self.id = id as i64;
        self.feed = Some(feed);
        self.version = Some(version);
        self.timestamp = Some(timestamp);
        self.writable = writable;
    }

    /// Drop the explicit feed of edges that point into `feed`.
    pub(crate) fn normalize_edges(&mut self, feed: FeedId) {
        for edge in &mut self.edges {
            if edge.feed == Some(feed) {
                edge.feed = None;
            }
        }
    }
}
