//! Edge interpreters.
//!
//! A [`View`] decides what following an edge means. The [`ViewContext`]
//! holds one view per [`ViewKind`]; an edge carrying a kind hint hands its
//! resolution to that view, which is how share, referrer and space
//! indirections compose with plain graph traversal.

mod graph;
mod referrer;
mod share;
mod social;
mod space;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use hg_graph::{Core, Edge, GraphError, GraphResult, ViewKind};

use crate::generator::Generator;
use crate::state::QueryState;
use crate::vertex_like::VertexLike;

pub use graph::{GraphView, StaticView};
pub use referrer::{Referrer, ReferrerView};
pub use share::{DriveShareView, ShareView};
pub use social::{CommunicationView, ContactsView};
pub use space::{SpaceView, ROOT_LABEL};

/// Interpreter of edge traversal.
pub trait View: Send + Sync {
    fn kind(&self) -> ViewKind;

    /// The states `edge` of `state.value` leads to. Usually one; several
    /// when concurrent writers left siblings.
    fn get(&self, ctx: &Arc<ViewContext>, state: &QueryState, edge: &Edge) -> Generator<QueryState>;

    /// Follow the edges labeled `label` from `state`, or all edges for
    /// `None`.
    fn out(
        &self,
        ctx: &Arc<ViewContext>,
        state: &QueryState,
        label: Option<&str>,
    ) -> Generator<QueryState>;
}

/// The graph session plus the views traversals dispatch to.
pub struct ViewContext {
    core: Arc<Core>,
    views: RwLock<HashMap<ViewKind, Arc<dyn View>>>,
}

impl ViewContext {
    /// A context with every built-in view registered.
    pub fn new(core: Arc<Core>) -> Arc<Self> {
        let ctx = Self {
            core,
            views: RwLock::new(HashMap::new()),
        };
        ctx.register(Arc::new(GraphView));
        ctx.register(Arc::new(StaticView));
        ctx.register(Arc::new(ShareView));
        ctx.register(Arc::new(ReferrerView));
        ctx.register(Arc::new(SpaceView));
        ctx.register(Arc::new(ContactsView));
        ctx.register(Arc::new(CommunicationView));
        ctx.register(Arc::new(DriveShareView));
        Arc::new(ctx)
    }

    pub fn core(&self) -> &Arc<Core> {
        &self.core
    }

    /// Register `view` under its kind, replacing any earlier one.
    pub fn register(&self, view: Arc<dyn View>) {
        let kind = view.kind();
        if self
            .views
            .write()
            .expect("lock poisoned")
            .insert(kind, view)
            .is_some()
        {
            debug!(%kind, "replaced view");
        }
    }

    pub fn view(&self, kind: ViewKind) -> GraphResult<Arc<dyn View>> {
        self.views
            .read()
            .expect("lock poisoned")
            .get(&kind)
            .cloned()
            .ok_or_else(|| GraphError::Structural(format!("no view registered for {kind}")))
    }

    pub fn registered(&self) -> Vec<ViewKind> {
        let mut kinds: Vec<ViewKind> = self
            .views
            .read()
            .expect("lock poisoned")
            .keys()
            .copied()
            .collect();
        kinds.sort();
        kinds
    }
}

impl std::fmt::Debug for ViewContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewContext")
            .field("views", &self.registered())
            .finish()
    }
}

/// Resolve `edge` through its view hint, or as a plain graph edge.
pub fn resolve_edge(ctx: &Arc<ViewContext>, state: &QueryState, edge: &Edge) -> Generator<QueryState> {
    match edge.view {
        Some(kind) if kind != ViewKind::Graph => match ctx.view(kind) {
            Ok(view) => {
                debug!(%kind, label = %edge.label, "delegating edge");
                view.get(ctx, state, edge)
            }
            Err(e) => Generator::error(e),
        },
        _ => Generator::new([load(ctx, state, edge, ViewKind::Graph)]),
    }
}

/// Read the target of `edge` and step onto it.
///
/// Uses the key carried by the edge, if any, and honours version pins.
pub(crate) fn load(
    ctx: &ViewContext,
    state: &QueryState,
    edge: &Edge,
    view: ViewKind,
) -> GraphResult<QueryState> {
    let source = state.value.feed().ok_or_else(|| {
        GraphError::Structural(format!("edge '{}' of a vertex without feed", edge.label))
    })?;
    let feed = edge.target_feed(source);
    let key = edge.key()?;
    let vertex = match edge.version {
        Some(version) => ctx.core.get_at_version(feed, edge.target, version, key)?,
        None => ctx.core.get(feed, edge.target, key)?,
    };
    Ok(state.next(
        VertexLike::Real(vertex),
        &edge.label,
        view,
        edge.restrictions.as_deref(),
    ))
}

/// Edges of `state` that `out(label)` may follow.
pub(crate) fn candidate_edges(state: &QueryState, label: Option<&str>) -> Vec<Edge> {
    state
        .value
        .edges()
        .iter()
        .filter(|e| label.map_or(true, |l| e.label == l))
        .filter(|e| state.allows(&e.label))
        .cloned()
        .collect()
}

/// Follow edges of `state` lazily.
///
/// With `hints`, an edge naming another view is resolved by that view;
/// otherwise every edge is loaded directly and the result keeps `view`.
pub(crate) fn follow(
    ctx: &Arc<ViewContext>,
    state: &QueryState,
    label: Option<&str>,
    hints: bool,
    view: ViewKind,
) -> Generator<QueryState> {
    let edges = candidate_edges(state, label);
    let ctx = Arc::clone(ctx);
    let state = state.clone();
    Generator::from_values(edges).flat_map(move |edge| match edge.view {
        Some(kind) if hints && kind != view => resolve_edge(&ctx, &state, &edge),
        _ => Generator::new([load(&ctx, &state, &edge, view)]),
    })
}

/// Apply the view of each state to `out(label)`.
pub(crate) fn out_each(
    ctx: &Arc<ViewContext>,
    states: Generator<QueryState>,
    label: Option<&str>,
) -> Generator<QueryState> {
    let ctx = Arc::clone(ctx);
    let label = label.map(str::to_string);
    states.flat_map(move |state| match ctx.view(state.view) {
        Ok(view) => view.out(&ctx, &state, label.as_deref()),
        Err(e) => Generator::error(e),
    })
}
