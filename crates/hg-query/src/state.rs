use hg_graph::{Restriction, Vertex, ViewKind};
use hg_types::FeedId;

use crate::rules::QueryRule;
use crate::vertex_like::VertexLike;

/// One traversal step: the label followed and the vertex it reached.
#[derive(Clone, Debug)]
pub struct PathEntry {
    pub label: String,
    pub vertex: VertexLike,
    pub feed: Option<FeedId>,
}

/// Collaboration space a traversal is inside of.
#[derive(Clone, Debug)]
pub struct SpaceInfo {
    pub marker: Vertex,
    pub owner: Option<FeedId>,
}

/// Position of a traversal.
///
/// States are never mutated once handed out; every step derives a new one
/// with [`next`](QueryState::next).
#[derive(Clone, Debug)]
pub struct QueryState {
    pub value: VertexLike,
    /// Steps taken from the traversal root, oldest first.
    pub path: Vec<PathEntry>,
    pub rules: Vec<QueryRule>,
    /// View that interprets the next `out()` from here.
    pub view: ViewKind,
    pub space: Option<SpaceInfo>,
}

impl QueryState {
    pub fn new(value: impl Into<VertexLike>, view: ViewKind) -> Self {
        Self {
            value: value.into(),
            path: Vec::new(),
            rules: Vec::new(),
            view,
            space: None,
        }
    }

    /// The state reached by following `label` to `value`.
    ///
    /// Restrictions of the followed edge become a rule relative to the new
    /// position.
    pub fn next(
        &self,
        value: VertexLike,
        label: &str,
        view: ViewKind,
        restrictions: Option<&[Restriction]>,
    ) -> QueryState {
        let mut path = self.path.clone();
        path.push(PathEntry {
            label: label.to_string(),
            vertex: value.clone(),
            feed: value.feed(),
        });
        let mut rules = self.rules.clone();
        if let Some(restrictions) = restrictions.filter(|r| !r.is_empty()) {
            rules.push(QueryRule::new(restrictions.to_vec(), path.len()));
        }
        QueryState {
            value,
            path,
            rules,
            view,
            space: self.space.clone(),
        }
    }

    pub fn with_view(mut self, view: ViewKind) -> Self {
        self.view = view;
        self
    }

    pub fn with_space(mut self, space: SpaceInfo) -> Self {
        self.space = Some(space);
        self
    }

    pub fn labels(&self) -> Vec<&str> {
        self.path.iter().map(|p| p.label.as_str()).collect()
    }

    /// `/`-joined labels from the traversal root.
    pub fn path_string(&self) -> String {
        self.labels().join("/")
    }

    /// Whether every active rule lets the traversal follow `label`.
    pub fn allows(&self, label: &str) -> bool {
        if self.rules.is_empty() {
            return true;
        }
        let mut labels = self.labels();
        labels.push(label);
        self.rules.iter().all(|rule| rule.allows(&labels))
    }
}
