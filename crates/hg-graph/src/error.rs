//! Error types for the graph engine.

use hg_crypto::CryptoError;
use hg_store::StoreError;
use hg_types::{FeedId, TypeError};

/// Errors raised by graph operations.
///
/// The variants follow how callers are expected to react: `NoAccess` is
/// recoverable (skip, or retry with another key), `Structural` and
/// `UnknownType` are data or programming errors, `Permission` means the
/// session cannot write the target, and `Timeout` means no peer provided a
/// feed in time.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The object could not be decrypted: the session lacks the right key.
    #[error("no access to object {id} in feed {feed}")]
    NoAccess { feed: FeedId, id: u64 },

    /// A required edge is missing or metadata is malformed.
    #[error("structural error: {0}")]
    Structural(String),

    /// The content envelope names a type that is not registered.
    #[error("unknown content type: {0}")]
    UnknownType(String),

    /// Write attempted on a vertex or feed this session cannot write.
    #[error("permission denied: {0}")]
    Permission(String),

    /// No peer provided the feed within the wait timeout.
    #[error("timed out waiting for feed {0}")]
    Timeout(FeedId),

    /// The object does not exist at the requested version.
    #[error("object {id} not found in feed {feed}")]
    NotFound { feed: FeedId, id: u64 },

    /// The share marker on the traversal path was revoked by its owner.
    #[error("share {id} in feed {feed} has been revoked")]
    ShareRevoked { feed: FeedId, id: u64 },

    #[error("invalid vertex URL: {0}")]
    InvalidUrl(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GraphError {
    /// Classify a store failure.
    ///
    /// Checksum and decryption failures become [`GraphError::NoAccess`],
    /// never a structural error.
    pub fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::ChecksumMismatch { feed, id } | StoreError::Decryption { feed, id } => {
                Self::NoAccess { feed, id }
            }
            StoreError::NotFound { feed, id } => Self::NotFound { feed, id },
            StoreError::ReadOnly(feed) => Self::Permission(format!("feed {feed} is not writable")),
            StoreError::FeedUnavailable(feed) => Self::Timeout(feed),
            other => Self::Store(other),
        }
    }

    pub fn is_no_access(&self) -> bool {
        matches!(self, Self::NoAccess { .. })
    }
}

impl From<StoreError> for GraphError {
    fn from(err: StoreError) -> Self {
        Self::from_store(err)
    }
}

impl From<TypeError> for GraphError {
    fn from(err: TypeError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

/// Convenience alias for graph results.
pub type GraphResult<T> = Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_failures_are_no_access() {
        let feed = FeedId::from_bytes([1; 32]);
        let err = GraphError::from(StoreError::ChecksumMismatch { feed, id: 4 });
        assert!(err.is_no_access());
        let err = GraphError::from(StoreError::Decryption { feed, id: 4 });
        assert!(err.is_no_access());
    }

    #[test]
    fn other_store_failures_keep_their_meaning() {
        let feed = FeedId::from_bytes([1; 32]);
        assert!(matches!(
            GraphError::from(StoreError::ReadOnly(feed)),
            GraphError::Permission(_)
        ));
        assert!(matches!(
            GraphError::from(StoreError::FeedUnavailable(feed)),
            GraphError::Timeout(_)
        ));
        assert!(matches!(
            GraphError::from(StoreError::Serialization("x".into())),
            GraphError::Store(_)
        ));
    }
}
