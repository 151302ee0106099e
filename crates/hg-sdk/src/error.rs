use thiserror::Error;

use hg_graph::GraphError;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("user root is missing its '{0}' edge")]
    IncompleteUser(String),

    #[error("not a share marker: {0}")]
    NotAShare(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("store error: {0}")]
    Store(#[from] hg_store::StoreError),

    #[error("crypto error: {0}")]
    Crypto(#[from] hg_crypto::CryptoError),
}

impl SdkError {
    /// Whether the session lacks the key of something it tried to read.
    pub fn is_no_access(&self) -> bool {
        matches!(self, Self::Graph(e) if e.is_no_access())
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
