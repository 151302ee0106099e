//! Traversal layer of the hypergraph store.
//!
//! A traversal is a lazy [`Generator`] of [`QueryState`]s. Each state sits
//! on a vertex (persisted or computed, see [`VertexLike`]) and remembers
//! how it got there. What following an edge means is decided by a
//! [`View`]; edges may name the view that resolves them, which is how
//! shares, referrers and collaboration spaces plug into ordinary graph
//! walks.
//!
//! - [`Query`] -- `out`, `matches`, `repeat` pipelines
//! - [`CollaborationSpace`] -- multi-writer spaces over preshared vertices
//! - [`Crawler`] -- breadth-first walks feeding [`Indexer`]s

pub mod crawler;
pub mod generator;
pub mod query;
pub mod rules;
pub mod social;
pub mod space;
pub mod state;
pub mod vertex_like;
pub mod view;

pub use crawler::{CrawlReport, Crawler, Indexer};
pub use generator::Generator;
pub use query::{Query, Repeat};
pub use rules::QueryRule;
pub use space::{CollaborationSpace, Slot};
pub use state::{PathEntry, QueryState, SpaceInfo};
pub use vertex_like::{
    is_referrer_edge, VertexKey, VertexLike, VirtualCommShare, VirtualContact, VirtualDriveShare,
};
pub use view::{
    resolve_edge, CommunicationView, ContactsView, DriveShareView, GraphView, Referrer,
    ReferrerView, ShareView, SpaceView, StaticView, View, ViewContext, ROOT_LABEL,
};
