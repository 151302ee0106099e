//! Encrypted graph engine for the hypergraph store.
//!
//! Vertices are typed [`GraphObject`] content plus an ordered list of
//! [`Edge`]s, stored as versioned objects on per-writer feeds. Every object
//! is encrypted with its own key; edges carry the keys of their targets, so
//! whoever can read a vertex can follow its edges.
//!
//! - [`Codec`] -- type-tagged content encoding with a decoder registry
//! - [`Core`] -- reads, writes, key propagation, path creation
//! - [`VertexUrl`] -- `hyper://` addresses with embedded keys
//! - [`Inbox`] -- envelope posting and scanning

pub mod codec;
pub mod config;
pub mod core;
pub mod edge;
pub mod error;
pub mod inbox;
pub mod object;
pub mod url;
pub mod vertex;
pub mod view_kind;

pub use codec::{Codec, Decoder};
pub use config::GraphConfig;
pub use core::{latest_write, split_path, Core, PathSegment};
pub use edge::{meta, Edge, Restriction};
pub use error::{GraphError, GraphResult};
pub use inbox::{Inbox, ENVELOPE_LABEL};
pub use object::{
    Directory, File, GraphObject, JsonObject, PreShared, Share, Simple, Space, Thombstone,
    UserKey, UserProfile, UserRoot,
};
pub use url::VertexUrl;
pub use vertex::{Vertex, UNPERSISTED};
pub use view_kind::ViewKind;
