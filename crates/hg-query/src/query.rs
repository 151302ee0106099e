//! Composable traversal pipelines.

use std::collections::HashSet;
use std::sync::Arc;

use hg_graph::{split_path, GraphResult, ViewKind};

use crate::generator::Generator;
use crate::state::QueryState;
use crate::vertex_like::{VertexKey, VertexLike};
use crate::view::{out_each, ViewContext};

/// Stop conditions of [`Query::repeat`].
#[derive(Default)]
pub struct Repeat {
    proceed: Option<Box<dyn Fn(&[QueryState]) -> bool>>,
    max_depth: Option<usize>,
}

impl Repeat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep iterating only while `proceed` holds for the results so far.
    pub fn proceed_while<F>(mut self, proceed: F) -> Self
    where
        F: Fn(&[QueryState]) -> bool + 'static,
    {
        self.proceed = Some(Box::new(proceed));
        self
    }

    /// Apply the step at most `depth` times. Defaults to
    /// `GraphConfig::max_repeat_depth`.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }
}

impl std::fmt::Debug for Repeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repeat")
            .field("proceed", &self.proceed.is_some())
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

/// A traversal over a lazy set of [`QueryState`]s.
///
/// Every step is lazy; nothing is read until the query is consumed with
/// [`states`](Query::states), [`values`](Query::values) or
/// [`vertices`](Query::vertices).
pub struct Query {
    ctx: Arc<ViewContext>,
    states: Generator<QueryState>,
}

impl Query {
    pub fn new(ctx: Arc<ViewContext>, states: Generator<QueryState>) -> Self {
        Self { ctx, states }
    }

    /// Start at `vertex`, interpreting edges with `view`.
    pub fn at_vertex(ctx: &Arc<ViewContext>, vertex: impl Into<VertexLike>, view: ViewKind) -> Self {
        Self::new(
            Arc::clone(ctx),
            Generator::once(QueryState::new(vertex, view)),
        )
    }

    /// Follow the segments of `path` from `root`.
    pub fn at_path(
        ctx: &Arc<ViewContext>,
        path: &str,
        root: impl Into<VertexLike>,
        view: ViewKind,
    ) -> Self {
        split_path(path)
            .iter()
            .fold(Self::at_vertex(ctx, root, view), |query, segment| query.out(segment))
    }

    pub fn context(&self) -> &Arc<ViewContext> {
        &self.ctx
    }

    /// Follow edges labeled `label` through each state's view.
    pub fn out(self, label: &str) -> Self {
        let states = out_each(&self.ctx, self.states, Some(label));
        Self { states, ..self }
    }

    /// Follow every edge.
    pub fn out_all(self) -> Self {
        let states = out_each(&self.ctx, self.states, None);
        Self { states, ..self }
    }

    /// Keep the states `predicate` accepts; a failing predicate becomes an
    /// in-band error.
    pub fn matches<F>(self, predicate: F) -> Self
    where
        F: FnMut(&QueryState) -> GraphResult<bool> + 'static,
    {
        Self {
            states: self.states.try_filter(predicate),
            ..self
        }
    }

    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: FnMut(&QueryState) -> bool + 'static,
    {
        Self {
            states: self.states.filter(predicate),
            ..self
        }
    }

    /// Apply `step` to the frontier until it is exhausted.
    ///
    /// Breadth first: each round feeds the states found in the previous
    /// round to `step`, dropping vertices already seen (the start states
    /// included). The result is every newly reached state in discovery
    /// order, preceded by the errors met on the way. Start states are never
    /// part of the result, even when a cycle leads back to them.
    pub fn repeat<S>(self, step: S, options: Repeat) -> Self
    where
        S: Fn(Query) -> Query + 'static,
    {
        let ctx = Arc::clone(&self.ctx);
        let max_depth = options
            .max_depth
            .unwrap_or(ctx.core().config().max_repeat_depth);
        let states = Generator::defer(move || {
            let mut errors = Vec::new();
            let mut frontier = self.states.values(|e| errors.push(e));
            let mut visited: HashSet<VertexKey> =
                frontier.iter().filter_map(|s| s.value.key()).collect();
            let mut results: Vec<QueryState> = Vec::new();

            for _ in 0..max_depth {
                if frontier.is_empty() {
                    break;
                }
                if let Some(proceed) = &options.proceed {
                    if !proceed(&results) {
                        break;
                    }
                }
                let round = step(Query::new(
                    Arc::clone(&ctx),
                    Generator::from_values(std::mem::take(&mut frontier)),
                ));
                for item in round.states {
                    match item {
                        Ok(state) => {
                            if let Some(key) = state.value.key() {
                                if !visited.insert(key) {
                                    continue;
                                }
                            }
                            frontier.push(state);
                        }
                        Err(e) => errors.push(e),
                    }
                }
                results.extend(frontier.iter().cloned());
            }

            Generator::new(
                errors
                    .into_iter()
                    .map(Err)
                    .chain(results.into_iter().map(Ok))
                    .collect::<Vec<_>>(),
            )
        });
        Self { ctx: self.ctx, states }
    }

    pub fn states(self) -> Generator<QueryState> {
        self.states
    }

    /// Extract a value from every state.
    pub fn values<T, F>(self, extract: F) -> Generator<T>
    where
        T: 'static,
        F: FnMut(QueryState) -> GraphResult<T> + 'static,
    {
        self.states.and_then(extract)
    }

    /// The reached vertices, failing on the first error.
    pub fn vertices(self) -> GraphResult<Vec<VertexLike>> {
        self.states.map(|s| s.value).destruct()
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query").field("ctx", &self.ctx).finish_non_exhaustive()
    }
}
