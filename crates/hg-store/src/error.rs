use hg_types::FeedId;

/// Errors from feed and object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object does not exist at the snapshot version.
    #[error("object {id} not found in feed {feed}")]
    NotFound { feed: FeedId, id: u64 },

    /// The requested block index is beyond the feed length.
    #[error("block {index} out of range for feed {feed} (length {length})")]
    BlockOutOfRange { feed: FeedId, index: u64, length: u64 },

    /// Checksum validation failed after decryption: most likely the wrong
    /// key, or no key, was used.
    #[error("checksum mismatch for object {id} in feed {feed}")]
    ChecksumMismatch { feed: FeedId, id: u64 },

    /// The blob cipher rejected the block.
    #[error("cannot decrypt object {id} in feed {feed}")]
    Decryption { feed: FeedId, id: u64 },

    /// The feed is not writable by this session.
    #[error("feed {0} is read-only")]
    ReadOnly(FeedId),

    /// An append expected a different feed length (someone else appended).
    #[error("append conflict on feed {feed}: expected length {expected}, found {actual}")]
    Conflict { feed: FeedId, expected: u64, actual: u64 },

    /// No peer provided the feed within the wait timeout.
    #[error("feed {0} unavailable")]
    FeedUnavailable(FeedId),

    /// A block record names a different object than the index claims.
    #[error("corrupt block {block} in feed {feed}: {reason}")]
    CorruptBlock { feed: FeedId, block: u64, reason: String },

    /// CRC check of a segment frame failed.
    #[error("CRC integrity check failed at offset {offset}: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch { offset: u64, expected: u32, actual: u32 },

    /// Segment entry has an invalid length field.
    #[error("invalid segment entry length {length} at offset {offset}")]
    InvalidEntryLength { offset: u64, length: u32 },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Cipher failure while writing.
    #[error("crypto error: {0}")]
    Crypto(#[from] hg_crypto::CryptoError),

    /// I/O error from the underlying backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// `true` for failures that mean "the caller does not hold the right key".
    pub fn is_no_access(&self) -> bool {
        matches!(self, Self::ChecksumMismatch { .. } | Self::Decryption { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
