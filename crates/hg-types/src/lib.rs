//! Foundation types for the hypergraph store.
//!
//! Every other `hg-*` crate depends on `hg-types`.
//!
//! # Key Types
//!
//! - [`FeedId`] -- 32-byte public key naming one writer's append-only feed
//! - [`ObjectRef`] -- `(feed, id)` address of a persisted object

pub mod error;
pub mod feed;

pub use error::TypeError;
pub use feed::{FeedId, ObjectRef};
