use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use crypto_box::ChaChaBox;

use crate::error::{CryptoError, CryptoResult};
use crate::keys::{BoxPublicKey, KeyKind, ObjectKey, UserKeyPair, KEY_LEN};

const XNONCE_LEN: usize = 24;
const BOX_NONCE_LEN: usize = 24;

/// Position of a block, used as the keystream nonce.
///
/// The object id alone is not enough: an object overwritten under the same
/// key must never reuse a keystream, so the block index is mixed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockNonce {
    pub object: u64,
    pub block: u64,
}

impl BlockNonce {
    pub fn new(object: u64, block: u64) -> Self {
        Self { object, block }
    }

    fn to_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&self.object.to_le_bytes());
        out[8..].copy_from_slice(&self.block.to_le_bytes());
        out
    }
}

/// Pluggable cipher capability.
///
/// The engine only relies on these operations; the concrete constructions
/// are an implementation detail of [`DefaultCrypto`].
pub trait Crypto: Send + Sync {
    /// Encrypt one block with an object key.
    fn encrypt(&self, key: &ObjectKey, nonce: BlockNonce, plaintext: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Decrypt one block. Stream keys never fail here; callers validate the
    /// checksum afterwards.
    fn decrypt(&self, key: &ObjectKey, nonce: BlockNonce, ciphertext: &[u8])
        -> CryptoResult<Vec<u8>>;

    /// Seal `payload` so only the holder of `recipient`'s secret can open it.
    fn seal_envelope(&self, recipient: &BoxPublicKey, payload: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Open an envelope with `pair`. `None` if it was not addressed to `pair`.
    fn open_envelope(&self, pair: &UserKeyPair, sealed: &[u8]) -> Option<Vec<u8>>;
}

/// Default ciphers: BLAKE3 keyed keystream, XChaCha20-Poly1305 for blobs,
/// and an ephemeral-sender crypto_box for envelopes.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultCrypto;

impl DefaultCrypto {
    fn keystream_xor(key: &ObjectKey, nonce: BlockNonce, data: &[u8]) -> Vec<u8> {
        let mut hasher = blake3::Hasher::new_keyed(key.as_bytes());
        hasher.update(b"hg-stream-v1:");
        hasher.update(&nonce.to_bytes());
        let mut stream = vec![0u8; data.len()];
        hasher.finalize_xof().fill(&mut stream);
        stream.iter_mut().zip(data).for_each(|(s, d)| *s ^= d);
        stream
    }

    fn blob_cipher(key: &ObjectKey) -> CryptoResult<XChaCha20Poly1305> {
        XChaCha20Poly1305::new_from_slice(key.as_bytes()).map_err(|_| {
            CryptoError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: key.as_bytes().len(),
            }
        })
    }
}

impl Crypto for DefaultCrypto {
    fn encrypt(&self, key: &ObjectKey, nonce: BlockNonce, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        match key.kind() {
            KeyKind::Stream => Ok(Self::keystream_xor(key, nonce, plaintext)),
            KeyKind::Blob => {
                let cipher = Self::blob_cipher(key)?;
                let xnonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
                let ciphertext = cipher
                    .encrypt(&xnonce, plaintext)
                    .map_err(|_| CryptoError::Encryption)?;
                let mut out = Vec::with_capacity(XNONCE_LEN + ciphertext.len());
                out.extend_from_slice(&xnonce);
                out.extend_from_slice(&ciphertext);
                Ok(out)
            }
        }
    }

    fn decrypt(
        &self,
        key: &ObjectKey,
        nonce: BlockNonce,
        ciphertext: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        match key.kind() {
            KeyKind::Stream => Ok(Self::keystream_xor(key, nonce, ciphertext)),
            KeyKind::Blob => {
                if ciphertext.len() < XNONCE_LEN {
                    return Err(CryptoError::Truncated(ciphertext.len()));
                }
                let cipher = Self::blob_cipher(key)?;
                let (xnonce, body) = ciphertext.split_at(XNONCE_LEN);
                cipher
                    .decrypt(XNonce::from_slice(xnonce), body)
                    .map_err(|_| CryptoError::Decryption)
            }
        }
    }

    fn seal_envelope(&self, recipient: &BoxPublicKey, payload: &[u8]) -> CryptoResult<Vec<u8>> {
        // Layout: [ephemeral public key][nonce][ciphertext]
        let ephemeral = crypto_box::SecretKey::generate(&mut crypto_box::aead::OsRng);
        let sender = ephemeral.public_key();
        let chacha = ChaChaBox::new(&recipient.to_box(), &ephemeral);
        let nonce =
            <ChaChaBox as crypto_box::aead::AeadCore>::generate_nonce(&mut crypto_box::aead::OsRng);
        let ciphertext = crypto_box::aead::Aead::encrypt(&chacha, &nonce, payload)
            .map_err(|_| CryptoError::Encryption)?;

        let mut out = Vec::with_capacity(KEY_LEN + BOX_NONCE_LEN + ciphertext.len());
        out.extend_from_slice(sender.as_bytes());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open_envelope(&self, pair: &UserKeyPair, sealed: &[u8]) -> Option<Vec<u8>> {
        if sealed.len() < KEY_LEN + BOX_NONCE_LEN {
            return None;
        }
        let (sender, rest) = sealed.split_at(KEY_LEN);
        let (nonce, body) = rest.split_at(BOX_NONCE_LEN);
        let sender: [u8; KEY_LEN] = sender.try_into().ok()?;
        let nonce: [u8; BOX_NONCE_LEN] = nonce.try_into().ok()?;

        let chacha = ChaChaBox::new(&crypto_box::PublicKey::from(sender), pair.secret());
        crypto_box::aead::Aead::decrypt(&chacha, &nonce.into(), body).ok()
    }
}
