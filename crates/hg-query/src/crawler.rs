//! Breadth-first graph crawling with pluggable indexers.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, warn};

use hg_graph::{meta, Edge, GraphResult, ViewKind};

use crate::state::QueryState;
use crate::vertex_like::{VertexKey, VertexLike};
use crate::view::{resolve_edge, ViewContext};

/// Receives every edge the crawler resolves.
pub trait Indexer {
    fn name(&self) -> &str;

    /// Called once per resolved `edge` of `source`, with the state it led to.
    fn index(&mut self, source: &QueryState, edge: &Edge, target: &QueryState) -> GraphResult<()>;
}

/// Outcome of a crawl.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// Distinct vertices reached, the root included.
    pub visited: usize,
    /// Edges resolved successfully.
    pub edges: usize,
    /// Branches that failed to resolve or index.
    pub errors: usize,
}

/// Walks a graph breadth first, visiting each vertex once.
///
/// Edges are resolved through their view hints, so shares, referrers and
/// spaces are crawled through. Envelope edges are skipped: their targets
/// are only reachable for the recipient. A failing branch is logged and
/// counted, and the crawl goes on.
pub struct Crawler {
    ctx: Arc<ViewContext>,
    indexers: Vec<Box<dyn Indexer>>,
    max_depth: usize,
}

impl Crawler {
    pub fn new(ctx: &Arc<ViewContext>) -> Self {
        Self {
            ctx: Arc::clone(ctx),
            indexers: Vec::new(),
            max_depth: ctx.core().config().max_repeat_depth,
        }
    }

    pub fn with_indexer(mut self, indexer: impl Indexer + 'static) -> Self {
        self.indexers.push(Box::new(indexer));
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn crawl(&mut self, root: impl Into<VertexLike>) -> CrawlReport {
        let start = QueryState::new(root, ViewKind::Graph);
        let mut report = CrawlReport::default();
        let mut visited: HashSet<VertexKey> = HashSet::new();
        if let Some(key) = start.value.key() {
            visited.insert(key);
        }
        report.visited = 1;

        let mut queue = VecDeque::from([(start, 0usize)]);
        while let Some((state, depth)) = queue.pop_front() {
            if depth >= self.max_depth {
                continue;
            }
            let edges: Vec<Edge> = state
                .value
                .edges()
                .iter()
                .filter(|e| !e.has_metadata(meta::ENVELOPE))
                .filter(|e| state.allows(&e.label))
                .cloned()
                .collect();
            for edge in edges {
                for target in resolve_edge(&self.ctx, &state, &edge) {
                    let target = match target {
                        Ok(target) => target,
                        Err(e) => {
                            warn!(label = %edge.label, error = %e, "crawl branch failed");
                            report.errors += 1;
                            continue;
                        }
                    };
                    report.edges += 1;
                    for indexer in &mut self.indexers {
                        if let Err(e) = indexer.index(&state, &edge, &target) {
                            warn!(indexer = indexer.name(), error = %e, "indexer failed");
                            report.errors += 1;
                        }
                    }
                    let fresh = match target.value.key() {
                        Some(key) => visited.insert(key),
                        None => true,
                    };
                    if fresh {
                        report.visited += 1;
                        queue.push_back((target, depth + 1));
                    }
                }
            }
        }
        debug!(?report, "crawl finished");
        report
    }
}

impl std::fmt::Debug for Crawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field(
                "indexers",
                &self.indexers.iter().map(|i| i.name().to_string()).collect::<Vec<_>>(),
            )
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::testing::*;
    use hg_graph::{GraphError, GraphObject, Vertex};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Labels {
        seen: Rc<RefCell<Vec<String>>>,
        fail_on: Option<&'static str>,
    }

    impl Indexer for Labels {
        fn name(&self) -> &str {
            "labels"
        }

        fn index(&mut self, _: &QueryState, edge: &Edge, target: &QueryState) -> GraphResult<()> {
            if self.fail_on == Some(edge.label.as_str()) {
                return Err(GraphError::Structural("refused".into()));
            }
            self.seen
                .borrow_mut()
                .push(format!("{}->{}", edge.label, text(&target.value)));
            Ok(())
        }
    }

    fn tree(ctx: &ViewContext) -> Vertex {
        let leaf = put(ctx, named("leaf"));
        let mut mid = Vertex::with_content(named("mid"));
        mid.add_edge_to(&leaf, "down").unwrap();
        mid.add_edge(Edge::new(404, "broken", None));
        ctx.core().put(&mut mid).unwrap();
        let mut root = Vertex::with_content(named("root"));
        root.add_edge_to(&mid, "down").unwrap();
        root.add_edge_to(&leaf, "shortcut").unwrap();
        ctx.core().put(&mut root).unwrap();
        root
    }

    #[test]
    fn visits_each_vertex_once_and_counts_failures() {
        let ctx = solo();
        let root = tree(&ctx);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut crawler = Crawler::new(&ctx).with_indexer(Labels {
            seen: Rc::clone(&seen),
            fail_on: None,
        });
        let report = crawler.crawl(root);
        assert_eq!(
            report,
            CrawlReport {
                visited: 3,
                edges: 3,
                errors: 1
            }
        );
        assert_eq!(*seen.borrow(), ["down->mid", "shortcut->leaf", "down->leaf"]);
    }

    #[test]
    fn indexer_failures_do_not_stop_the_crawl() {
        let ctx = solo();
        let root = tree(&ctx);
        let mut crawler = Crawler::new(&ctx).with_indexer(Labels {
            fail_on: Some("shortcut"),
            ..Labels::default()
        });
        let report = crawler.crawl(root);
        assert_eq!(report.visited, 3);
        assert_eq!(report.errors, 2);
    }

    #[test]
    fn depth_limit_stops_expansion() {
        let ctx = solo();
        let root = tree(&ctx);
        let report = Crawler::new(&ctx).with_max_depth(1).crawl(root);
        assert_eq!(report.visited, 3);
        assert_eq!(report.errors, 0);

        let lonely = put(&ctx, GraphObject::directory());
        assert_eq!(Crawler::new(&ctx).crawl(lonely).visited, 1);
    }
}
