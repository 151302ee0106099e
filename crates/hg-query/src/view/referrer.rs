use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use hg_crypto::ObjectKey;
use hg_graph::{meta, Edge, GraphError, GraphResult, ViewKind};

use super::{follow, load, View, ViewContext};
use crate::generator::Generator;
use crate::state::QueryState;

/// Referrer metadata of an edge into a preshared vertex.
#[derive(Clone, Debug)]
pub struct Referrer {
    /// Key every writer encrypts its contribution with.
    pub key: ObjectKey,
    /// Label of the preshared-vertex edges that lead to contributions.
    pub label: String,
}

impl Referrer {
    pub fn generate(key: ObjectKey) -> Self {
        let raw: [u8; 16] = rand::random();
        Self {
            key,
            label: STANDARD.encode(raw),
        }
    }

    pub fn from_edge(edge: &Edge) -> GraphResult<Self> {
        let key = edge
            .metadata(meta::REF_KEY)
            .ok_or_else(|| GraphError::Structural(format!("edge '{}' has no refKey", edge.label)))?;
        let label = edge
            .metadata(meta::REF_LABEL)
            .ok_or_else(|| GraphError::Structural(format!("edge '{}' has no refLabel", edge.label)))?;
        Ok(Self {
            key: ObjectKey::from_metadata(key)?,
            label: STANDARD.encode(label),
        })
    }

    /// Store the referrer on `edge` and mark it for the referrer view.
    pub fn apply(&self, edge: &mut Edge) -> GraphResult<()> {
        let label = STANDARD
            .decode(&self.label)
            .map_err(|e| GraphError::Structural(format!("bad referrer label: {e}")))?;
        edge.set_metadata(meta::REF_KEY, self.key.to_metadata());
        edge.set_metadata(meta::REF_LABEL, label);
        edge.view = Some(ViewKind::Referrer);
        Ok(())
    }
}

/// Resolves referrer edges.
///
/// The edge points at a preshared vertex; what it stands for are the
/// vertices that vertex links under the referrer label, each readable with
/// the referrer key. Concurrent writers leave several such links, all of
/// which are yielded.
#[derive(Debug, Default)]
pub struct ReferrerView;

impl View for ReferrerView {
    fn kind(&self) -> ViewKind {
        ViewKind::Referrer
    }

    fn get(&self, ctx: &Arc<ViewContext>, state: &QueryState, edge: &Edge) -> Generator<QueryState> {
        let referrer = match Referrer::from_edge(edge) {
            Ok(referrer) => referrer,
            Err(e) => return Generator::error(e),
        };
        let psv = match load(ctx, state, edge, ViewKind::Referrer) {
            Ok(psv) => psv,
            Err(e) => return Generator::error(e),
        };
        let Some(psv_feed) = psv.value.feed() else {
            return Generator::error(GraphError::Structural("preshared vertex without feed".into()));
        };

        let label = edge.label.clone();
        let targets: Vec<Edge> = psv
            .value
            .edges()
            .iter()
            .filter(|e| e.label == referrer.label)
            .map(|e| {
                let feed = e.target_feed(psv_feed);
                let mut synthetic = Edge::new(e.target, label.clone(), Some(feed));
                synthetic.set_key(&referrer.key);
                synthetic
            })
            .collect();

        let ctx = Arc::clone(ctx);
        let state = state.clone();
        Generator::from_values(targets)
            .and_then(move |edge| load(&ctx, &state, &edge, ViewKind::Graph))
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
