//! Cryptographic primitives for the hypergraph store.
//!
//! Provides the CRC32 block checksum, per-object symmetric keys, feed and
//! user key pairs, a pluggable [`Crypto`] capability with a default
//! implementation, and the [`KeyRouter`] that maps `(feed, object)` to keys.
//!
//! All ciphers wrap established libraries: BLAKE3 (keystream), XChaCha20-
//! Poly1305 (blobs) and crypto_box (envelopes). No custom cryptography.
//!
//! The block checksum is an integrity check used to *detect* decryption with
//! the wrong key. It is not a MAC and provides no authentication.

pub mod checksum;
pub mod cipher;
pub mod error;
pub mod keys;
pub mod router;

pub use checksum::{append_checksum, validate_checksum, CHECKSUM_LEN};
pub use cipher::{BlockNonce, Crypto, DefaultCrypto};
pub use error::{CryptoError, CryptoResult};
pub use keys::{BoxPublicKey, FeedKeyPair, KeyKind, ObjectKey, UserKeyPair, KEY_LEN};
pub use router::KeyRouter;
