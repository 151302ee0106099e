use std::sync::Arc;

use hg_graph::{Edge, ViewKind};

use super::{follow, load, View, ViewContext};
use crate::generator::Generator;
use crate::state::QueryState;

/// Follows stored edges; an edge naming another view is handed to it.
#[derive(Debug, Default)]
pub struct GraphView;

impl View for GraphView {
    fn kind(&self) -> ViewKind {
        ViewKind::Graph
    }

    fn get(&self, ctx: &Arc<ViewContext>, state: &QueryState, edge: &Edge) -> Generator<QueryState> {
        Generator::new([load(ctx, state, edge, ViewKind::Graph)])
    }

    fn out(
        &self,
        ctx: &Arc<ViewContext>,
        state: &QueryState,
        label: Option<&str>,
    ) -> Generator<QueryState> {
        follow(ctx, state, label, true, ViewKind::Graph)
    }
}

/// Follows stored edges and ignores view hints.
#[derive(Debug, Default)]
pub struct StaticView;

impl View for StaticView {
    fn kind(&self) -> ViewKind {
        ViewKind::Static
    }

    fn get(&self, ctx: &Arc<ViewContext>, state: &QueryState, edge: &Edge) -> Generator<QueryState> {
        Generator::new([load(ctx, state, edge, ViewKind::Static)])
    }

    fn out(
        &self,
        ctx: &Arc<ViewContext>,
        state: &QueryState,
        label: Option<&str>,
    ) -> Generator<QueryState> {
        follow(ctx, state, label, false, ViewKind::Static)
    }
}
