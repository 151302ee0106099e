/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("unknown key kind tag {0}")]
    UnknownKeyKind(u8),

    #[error("ciphertext too short: {0} bytes")]
    Truncated(usize),

    #[error("encryption failed")]
    Encryption,

    #[error("decryption failed")]
    Decryption,
}

/// Result alias for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
