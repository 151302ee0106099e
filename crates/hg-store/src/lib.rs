//! Append-only feed storage for the hypergraph store.
//!
//! A *feed* is one writer's append-only log of independently readable
//! blocks. On top of a feed this crate builds a versioned object store:
//! every block is a [`BlockRecord`] naming the object it (re)writes, the
//! [`ObjectIndex`] maps object ids to their blocks, and a [`Transaction`]
//! reads a snapshot (the feed length at open time) while buffering writes
//! until [`Transaction::commit`].
//!
//! # Feed Backends
//!
//! All backends implement the [`Feed`] trait and are handed out by a
//! [`Corestore`]:
//!
//! - [`MemoryCorestore`] / [`MemoryFeed`] -- in-memory swarm for tests and embedding
//! - [`DirCorestore`] / [`FileFeed`] -- one length+CRC framed segment file per feed
//!
//! # Design Rules
//!
//! 1. Blocks are immutable once appended; objects are versioned by appending.
//! 2. Every object block is `plaintext || crc32` and then encrypted with the
//!    object key if one is registered.
//! 3. A checksum failure after decryption means "no access", not corruption.
//! 4. Appends carry the length they expect; a stale append is a conflict.

pub mod config;
pub mod corestore;
pub mod error;
pub mod feed;
pub mod feed_store;
pub mod file;
pub mod index;
pub mod record;
pub mod transaction;

pub use config::{Backend, StoreConfig, SyncMode};
pub use corestore::{open_corestore, Corestore, DirCorestore, MemoryCorestore};
pub use error::{StoreError, StoreResult};
pub use feed::{Feed, MemoryFeed};
pub use feed_store::FeedStore;
pub use file::FileFeed;
pub use index::{ObjectIndex, MAX_OBJECT_ID};
pub use record::{BlockRecord, ObjectBlock};
pub use transaction::{Commit, Transaction};
