//! High-level SDK for the hypergraph store.
//!
//! [`HyperGraph`] is the main entry point for applications embedding the
//! store: vertex reads and writes, path creation and queries for
//! filesystem-style layers, plus users, friends, shares and collaboration
//! spaces for the social layer.

pub mod error;
pub mod hypergraph;
pub mod summary;

pub use error::{SdkError, SdkResult};
pub use hypergraph::{HyperGraph, User};
pub use summary::{ContactSummary, ReceivedShareSummary, ShareSummary};

// Re-export key types
pub use hg_crypto::{KeyKind, ObjectKey, UserKeyPair};
pub use hg_graph::{Edge, GraphConfig, GraphError, GraphObject, Vertex, VertexUrl, ViewKind};
pub use hg_query::{CollaborationSpace, Crawler, Indexer, Query, QueryState, VertexLike};
pub use hg_store::{Backend, StoreConfig};
pub use hg_types::FeedId;
