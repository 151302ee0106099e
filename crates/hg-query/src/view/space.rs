use std::sync::Arc;

use hg_graph::{Edge, GraphObject, ViewKind};

use super::{follow, load, out_each, View, ViewContext};
use crate::generator::Generator;
use crate::state::{QueryState, SpaceInfo};
use crate::vertex_like::{is_referrer_edge, VertexLike};

/// Label of the edges from a space marker to its content roots.
pub const ROOT_LABEL: &str = ".";

/// Makes collaboration-space markers transparent.
///
/// `out(label)` on a marker applies `label` to every content root of the
/// space: the owner's root and whatever writers put behind the preshared
/// vertices. States below the marker carry its [`SpaceInfo`].
#[derive(Debug, Default)]
pub struct SpaceView;

impl SpaceView {
    /// The content roots of the space marked by `state.value`.
    pub fn roots(ctx: &Arc<ViewContext>, state: &QueryState) -> Generator<QueryState> {
        let Some(info) = space_info(&state.value) else {
            return Generator::empty();
        };
        let state = state.clone().with_space(info);
        let edges: Vec<Edge> = state
            .value
            .edges()
            .iter()
            .filter(|e| e.label == ROOT_LABEL)
            .cloned()
            .collect();
        let ctx = Arc::clone(ctx);
        Generator::from_values(edges)
            .flat_map(move |edge| {
                if is_referrer_edge(&edge) {
                    match ctx.view(ViewKind::Referrer) {
                        Ok(view) => view.get(&ctx, &state, &edge),
                        Err(e) => Generator::error(e),
                    }
                } else {
                    Generator::new([load(&ctx, &state, &edge, ViewKind::Space)])
                }
            })
            .map(|root| root.with_view(ViewKind::Space))
    }
}

fn space_info(value: &VertexLike) -> Option<SpaceInfo> {
    let marker = value.as_vertex()?;
    let space = marker.content().and_then(GraphObject::as_space)?;
    Some(SpaceInfo {
        marker: marker.clone(),
        owner: space.owner.or(marker.feed()),
    })
}

impl View for SpaceView {
    fn kind(&self) -> ViewKind {
        ViewKind::Space
    }

    fn get(&self, ctx: &Arc<ViewContext>, state: &QueryState, edge: &Edge) -> Generator<QueryState> {
        Generator::new([load(ctx, state, edge, ViewKind::Space).map(|next| {
            match space_info(&next.value) {
                Some(info) => next.with_space(info),
                None => next,
            }
        })])
    }

    fn out(
        &self,
        ctx: &Arc<ViewContext>,
        state: &QueryState,
        label: Option<&str>,
    ) -> Generator<QueryState> {
        if space_info(&state.value).is_none() {
            return follow(ctx, state, label, true, ViewKind::Space);
        }
        out_each(ctx, Self::roots(ctx, state), label)
    }
}
