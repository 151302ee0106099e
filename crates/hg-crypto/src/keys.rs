use serde::{Deserialize, Serialize};

use hg_types::FeedId;

use crate::error::{CryptoError, CryptoResult};

/// Length of every symmetric key and public key in bytes.
pub const KEY_LEN: usize = 32;

/// Which cipher an [`ObjectKey`] is used with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    /// Keystream cipher, nonce derived from the block position.
    #[default]
    Stream,
    /// Authenticated blob cipher with a random nonce per block.
    Blob,
}

impl KeyKind {
    fn tag(self) -> u8 {
        match self {
            Self::Stream => 0,
            Self::Blob => 1,
        }
    }

    fn from_tag(tag: u8) -> CryptoResult<Self> {
        match tag {
            0 => Ok(Self::Stream),
            1 => Ok(Self::Blob),
            other => Err(CryptoError::UnknownKeyKind(other)),
        }
    }
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream => write!(f, "stream"),
            Self::Blob => write!(f, "blob"),
        }
    }
}

/// Symmetric key of a single object.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    kind: KeyKind,
    bytes: [u8; KEY_LEN],
}

impl ObjectKey {
    /// Generate a fresh random key.
    pub fn generate(kind: KeyKind) -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self { kind, bytes }
    }

    pub fn new(kind: KeyKind, bytes: [u8; KEY_LEN]) -> Self {
        Self { kind, bytes }
    }

    /// A stream key from raw bytes, as carried in URLs.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self::new(KeyKind::Stream, arr))
    }

    /// Decode the edge-metadata form: 32 raw bytes for a stream key, or a
    /// one-byte kind tag followed by 32 bytes.
    pub fn from_metadata(bytes: &[u8]) -> CryptoResult<Self> {
        match bytes.len() {
            KEY_LEN => Self::from_slice(bytes),
            n if n == KEY_LEN + 1 => {
                let kind = KeyKind::from_tag(bytes[0])?;
                let mut arr = [0u8; KEY_LEN];
                arr.copy_from_slice(&bytes[1..]);
                Ok(Self::new(kind, arr))
            }
            actual => Err(CryptoError::InvalidKeyLength {
                expected: KEY_LEN,
                actual,
            }),
        }
    }

    /// Encode for edge metadata. Stream keys stay bare so they match URLs.
    pub fn to_metadata(&self) -> Vec<u8> {
        match self.kind {
            KeyKind::Stream => self.bytes.to_vec(),
            kind => {
                let mut out = Vec::with_capacity(KEY_LEN + 1);
                out.push(kind.tag());
                out.extend_from_slice(&self.bytes);
                out
            }
        }
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl std::fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectKey({}, <redacted>)", self.kind)
    }
}

/// Ed25519 key pair owning a feed. Holding the secret half makes a feed writable.
pub struct FeedKeyPair(ed25519_dalek::SigningKey);

impl FeedKeyPair {
    /// Generate a new random feed key pair.
    pub fn generate() -> Self {
        let mut csprng = rand::thread_rng();
        Self(ed25519_dalek::SigningKey::generate(&mut csprng))
    }

    /// Create from a raw 32-byte secret.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(&bytes))
    }

    /// The feed this key pair writes.
    pub fn feed_id(&self) -> FeedId {
        FeedId::from_bytes(self.0.verifying_key().to_bytes())
    }

    /// Raw secret key bytes.
    pub fn secret_bytes(&self) -> &[u8; KEY_LEN] {
        self.0.as_bytes()
    }
}

impl Clone for FeedKeyPair {
    fn clone(&self) -> Self {
        Self::from_bytes(*self.secret_bytes())
    }
}

impl std::fmt::Debug for FeedKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FeedKeyPair({}, <redacted>)", self.feed_id().short_hex())
    }
}

/// Public half of a [`UserKeyPair`], used as an envelope recipient.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoxPublicKey(pub [u8; KEY_LEN]);

impl BoxPublicKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub(crate) fn to_box(self) -> crypto_box::PublicKey {
        crypto_box::PublicKey::from(self.0)
    }
}

impl std::fmt::Debug for BoxPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BoxPublicKey({})", hex::encode(&self.0[..4]))
    }
}

/// X25519 key pair of a user, able to open envelopes addressed to it.
#[derive(Clone)]
pub struct UserKeyPair {
    secret: crypto_box::SecretKey,
}

impl UserKeyPair {
    pub fn generate() -> Self {
        Self {
            secret: crypto_box::SecretKey::generate(&mut crypto_box::aead::OsRng),
        }
    }

    pub fn from_secret_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            secret: crypto_box::SecretKey::from(bytes),
        }
    }

    pub fn public_key(&self) -> BoxPublicKey {
        BoxPublicKey(*self.secret.public_key().as_bytes())
    }

    pub fn secret_bytes(&self) -> [u8; KEY_LEN] {
        self.secret.to_bytes()
    }

    pub(crate) fn secret(&self) -> &crypto_box::SecretKey {
        &self.secret
    }
}

impl std::fmt::Debug for UserKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UserKeyPair({:?}, <redacted>)", self.public_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_differ() {
        let a = ObjectKey::generate(KeyKind::Stream);
        let b = ObjectKey::generate(KeyKind::Stream);
        assert_ne!(a, b);
    }

    #[test]
    fn metadata_roundtrip_keeps_kind() {
        for kind in [KeyKind::Stream, KeyKind::Blob] {
            let key = ObjectKey::generate(kind);
            let parsed = ObjectKey::from_metadata(&key.to_metadata()).unwrap();
            assert_eq!(parsed, key);
        }
    }

    #[test]
    fn stream_metadata_is_bare() {
        let key = ObjectKey::generate(KeyKind::Stream);
        assert_eq!(key.to_metadata().len(), KEY_LEN);
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert_eq!(
            ObjectKey::from_slice(&[1, 2, 3]).unwrap_err(),
            CryptoError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: 3
            }
        );
    }

    #[test]
    fn unknown_kind_tag_is_rejected() {
        let mut raw = vec![9u8];
        raw.extend_from_slice(&[0u8; KEY_LEN]);
        assert_eq!(
            ObjectKey::from_metadata(&raw).unwrap_err(),
            CryptoError::UnknownKeyKind(9)
        );
    }

    #[test]
    fn debug_redacts_key_material() {
        let key = ObjectKey::generate(KeyKind::Blob);
        let debug = format!("{key:?}");
        assert!(debug.contains("redacted"));
        assert!(!debug.contains(&key.to_hex()));
    }

    #[test]
    fn feed_key_pair_bytes_roundtrip() {
        let pair = FeedKeyPair::generate();
        let restored = FeedKeyPair::from_bytes(*pair.secret_bytes());
        assert_eq!(pair.feed_id(), restored.feed_id());
    }

    #[test]
    fn user_key_pair_bytes_roundtrip() {
        let pair = UserKeyPair::generate();
        let restored = UserKeyPair::from_secret_bytes(pair.secret_bytes());
        assert_eq!(pair.public_key(), restored.public_key());
    }
}
