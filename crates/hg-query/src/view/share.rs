use std::sync::Arc;

use hg_graph::{Edge, GraphError, GraphObject, GraphResult, ViewKind};

use super::{follow, load, out_each, View, ViewContext};
use crate::generator::Generator;
use crate::social;
use crate::state::QueryState;
use crate::vertex_like::{VertexLike, VirtualDriveShare};

/// Looks through share markers.
///
/// Reaching a marker yields what its `share` edge points at. A revoked
/// marker yields [`GraphError::ShareRevoked`], a vertex that is not a
/// marker or has no `share` edge a structural error.
#[derive(Debug, Default)]
pub struct ShareView;

impl ShareView {
    /// Step from a marker state onto the shared vertices.
    pub fn resolve(ctx: &Arc<ViewContext>, marker: &QueryState) -> Generator<QueryState> {
        let targets = match share_edges(&marker.value) {
            Ok(edges) => edges,
            Err(e) => return Generator::error(e),
        };
        let ctx = Arc::clone(ctx);
        let marker = marker.clone();
        Generator::from_values(targets)
            .and_then(move |edge| load(&ctx, &marker, &edge, ViewKind::Graph))
    }
}

fn share_edges(marker: &VertexLike) -> GraphResult<Vec<Edge>> {
    let share = marker
        .content()
        .and_then(GraphObject::as_share)
        .ok_or_else(|| GraphError::Structural("not a share marker".into()))?;
    if share.revoked {
        let (feed, id) = marker
            .as_vertex()
            .and_then(|v| v.address())
            .ok_or_else(|| GraphError::Structural("revoked share without address".into()))?;
        return Err(GraphError::ShareRevoked { feed, id });
    }
    let edges: Vec<Edge> = marker
        .edges()
        .iter()
        .filter(|e| e.label == social::SHARE)
        .cloned()
        .collect();
    if edges.is_empty() {
        return Err(GraphError::Structural("share marker has no share edge".into()));
    }
    Ok(edges)
}

fn is_marker(value: &VertexLike) -> bool {
    matches!(value.content(), Some(GraphObject::Share(_)))
}

impl View for ShareView {
    fn kind(&self) -> ViewKind {
        ViewKind::Share
    }

    fn get(&self, ctx: &Arc<ViewContext>, state: &QueryState, edge: &Edge) -> Generator<QueryState> {
        match load(ctx, state, edge, ViewKind::Share) {
            Ok(marker) => Self::resolve(ctx, &marker),
            Err(e) => Generator::error(e),
        }
    }

    /// On a marker, the shared vertex stands in for the marker: `None`
    /// yields it, a label is followed from it.
    fn out(
        &self,
        ctx: &Arc<ViewContext>,
        state: &QueryState,
        label: Option<&str>,
    ) -> Generator<QueryState> {
        if !is_marker(&state.value) {
            return follow(ctx, state, label, true, ViewKind::Graph);
        }
        let targets = Self::resolve(ctx, state);
        match label {
            None => targets,
            Some(label) => out_each(ctx, targets, Some(label)),
        }
    }
}

/// Lists the active shares of a user.
///
/// `out("shares")` on a user root yields one virtual vertex per share
/// marker that is not revoked. Revoked markers stay readable by id; they
/// only disappear from this listing.
#[derive(Debug, Default)]
pub struct DriveShareView;

impl View for DriveShareView {
    fn kind(&self) -> ViewKind {
        ViewKind::DriveShare
    }

    fn get(&self, ctx: &Arc<ViewContext>, state: &QueryState, edge: &Edge) -> Generator<QueryState> {
        Generator::new([load(ctx, state, edge, ViewKind::DriveShare)])
    }

    fn out(
        &self,
        ctx: &Arc<ViewContext>,
        state: &QueryState,
        label: Option<&str>,
    ) -> Generator<QueryState> {
        if label != Some(social::SHARES) {
            return follow(ctx, state, label, true, ViewKind::Graph);
        }
        let ctx = Arc::clone(ctx);
        follow(&ctx, state, Some(social::SHARES), false, ViewKind::Graph)
            .flat_map(move |dir| follow(&ctx, &dir, Some(social::SHARE), false, ViewKind::Graph))
            .filter(|marker| {
                marker
                    .value
                    .content()
                    .and_then(GraphObject::as_share)
                    .is_some_and(|share| !share.revoked)
            })
            .map(|marker| {
                let value = match marker.value.clone() {
                    VertexLike::Real(vertex) => {
                        VertexLike::VirtualDriveShare(VirtualDriveShare { marker: vertex })
                    }
                    other => other,
                };
                QueryState { value, ..marker }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::testing::*;
    use hg_graph::{Share, Vertex};

    fn marker(ctx: &ViewContext, target: &Vertex, revoked: bool) -> Vertex {
        let mut m = Vertex::with_content(GraphObject::Share(Share {
            revoked,
            info: None,
            owner: target.feed(),
        }));
        m.add_edge_to(target, social::SHARE).unwrap();
        ctx.core().put(&mut m).unwrap();
        m
    }

    #[test]
    fn marker_resolves_to_target() {
        let ctx = solo();
        let mut target = Vertex::with_content(named("shared"));
        let child = put(&ctx, named("child"));
        target.add_edge_to(&child, "item").unwrap();
        ctx.core().put(&mut target).unwrap();
        let m = marker(&ctx, &target, false);

        let state = QueryState::new(m.clone(), ViewKind::Share);
        let resolved = ShareView.out(&ctx, &state, None).destruct().unwrap();
        assert_eq!(text(&resolved[0].value), "shared");
        let items = ShareView.out(&ctx, &state, Some("item")).destruct().unwrap();
        assert_eq!(text(&items[0].value), "child");

        let mut holder = Vertex::with_content(named("holder"));
        holder.add_edge_to(&m, "link").unwrap().view = Some(ViewKind::Share);
        ctx.core().put(&mut holder).unwrap();
        let via_hint = crate::view::GraphView
            .out(&ctx, &QueryState::new(holder, ViewKind::Graph), Some("link"))
            .destruct()
            .unwrap();
        assert_eq!(text(&via_hint[0].value), "shared");
    }

    #[test]
    fn revoked_marker_is_an_in_band_error() {
        let ctx = solo();
        let target = put(&ctx, named("shared"));
        let m = marker(&ctx, &target, true);
        let state = QueryState::new(m, ViewKind::Share);
        assert!(matches!(
            ShareView.out(&ctx, &state, None).destruct(),
            Err(GraphError::ShareRevoked { .. })
        ));
    }

    #[test]
    fn marker_without_share_edge_is_structural() {
        let ctx = solo();
        let lonely = put(&ctx, GraphObject::Share(Share::default()));
        let state = QueryState::new(lonely, ViewKind::Share);
        assert!(matches!(
            ShareView.out(&ctx, &state, None).destruct(),
            Err(GraphError::Structural(_))
        ));
    }

    #[test]
    fn drive_shares_lists_only_active_markers() {
        let ctx = solo();
        let target = put(&ctx, named("shared"));
        let active = marker(&ctx, &target, false);
        let revoked = marker(&ctx, &target, true);
        let mut shares = Vertex::with_content(GraphObject::directory());
        shares.add_edge_to(&active, social::SHARE).unwrap();
        shares.add_edge_to(&revoked, social::SHARE).unwrap();
        ctx.core().put(&mut shares).unwrap();
        let mut root = Vertex::with_content(GraphObject::UserRoot(Default::default()));
        root.add_edge_to(&shares, social::SHARES).unwrap();
        ctx.core().put(&mut root).unwrap();

        let state = QueryState::new(root, ViewKind::DriveShare);
        let listed = DriveShareView
            .out(&ctx, &state, Some(social::SHARES))
            .destruct()
            .unwrap();
        assert_eq!(listed.len(), 1);
        match &listed[0].value {
            VertexLike::VirtualDriveShare(drive) => assert!(drive.marker.equals(&active)),
            other => panic!("unexpected {other:?}"),
        }
        let (feed, id) = revoked.address().unwrap();
        assert!(ctx.core().get(feed, id, None).is_ok());
    }
}
