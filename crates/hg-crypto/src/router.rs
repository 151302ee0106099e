use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tracing::debug;

use hg_types::{FeedId, ObjectRef};

use crate::cipher::{Crypto, DefaultCrypto};
use crate::error::CryptoResult;
use crate::keys::{BoxPublicKey, KeyKind, ObjectKey, UserKeyPair};

/// Keystore of one graph session.
///
/// Maps `(feed, object)` to the symmetric key of that object, remembers
/// which objects are explicitly public, and holds the user key pairs used to
/// open envelopes. Keys are registered opportunistically while reading edges
/// and explicitly when objects are created. Nothing is ever evicted.
///
/// Registering the same `(feed, object)` twice overwrites; keeping the two
/// registrations consistent is the caller's responsibility.
pub struct KeyRouter {
    crypto: Arc<dyn Crypto>,
    inner: RwLock<RouterState>,
}

#[derive(Default)]
struct RouterState {
    keys: HashMap<ObjectRef, ObjectKey>,
    public: HashSet<ObjectRef>,
    user_keys: Vec<UserKeyPair>,
    default_feed: Option<FeedId>,
}

impl KeyRouter {
    /// A router backed by the given cipher capability.
    pub fn new(crypto: Arc<dyn Crypto>) -> Self {
        Self {
            crypto,
            inner: RwLock::new(RouterState::default()),
        }
    }

    /// The cipher capability used for blocks and envelopes.
    pub fn crypto(&self) -> &Arc<dyn Crypto> {
        &self.crypto
    }

    pub fn has_key(&self, feed: &FeedId, id: u64) -> bool {
        let state = self.inner.read().expect("lock poisoned");
        state.keys.contains_key(&ObjectRef::new(*feed, id))
    }

    pub fn get_key(&self, feed: &FeedId, id: u64) -> Option<ObjectKey> {
        let state = self.inner.read().expect("lock poisoned");
        state.keys.get(&ObjectRef::new(*feed, id)).cloned()
    }

    /// Register `key` for object `id` of `feed`.
    pub fn register_key(&self, key: ObjectKey, feed: &FeedId, id: u64) {
        let object = ObjectRef::new(*feed, id);
        let mut state = self.inner.write().expect("lock poisoned");
        state.public.remove(&object);
        if state.keys.insert(object, key).is_none() {
            debug!(%object, "registered object key");
        }
    }

    /// Mark an object as explicitly unencrypted.
    pub fn register_public(&self, feed: &FeedId, id: u64) {
        let object = ObjectRef::new(*feed, id);
        let mut state = self.inner.write().expect("lock poisoned");
        state.keys.remove(&object);
        state.public.insert(object);
    }

    /// `true` only if the object was registered as public, as opposed to
    /// merely having no known key.
    pub fn is_public(&self, feed: &FeedId, id: u64) -> bool {
        let state = self.inner.read().expect("lock poisoned");
        state.public.contains(&ObjectRef::new(*feed, id))
    }

    pub fn generate_encryption_key(&self, kind: KeyKind) -> ObjectKey {
        ObjectKey::generate(kind)
    }

    /// Add a user key pair to the set tried by [`try_open_envelope`].
    ///
    /// [`try_open_envelope`]: KeyRouter::try_open_envelope
    pub fn register_user_key_pair(&self, pair: UserKeyPair) {
        let mut state = self.inner.write().expect("lock poisoned");
        let public = pair.public_key();
        if state.user_keys.iter().all(|p| p.public_key() != public) {
            debug!(?public, "registered user key pair");
            state.user_keys.push(pair);
        }
    }

    pub fn user_public_keys(&self) -> Vec<BoxPublicKey> {
        let state = self.inner.read().expect("lock poisoned");
        state.user_keys.iter().map(UserKeyPair::public_key).collect()
    }

    pub fn seal_envelope(&self, recipient: &BoxPublicKey, payload: &[u8]) -> CryptoResult<Vec<u8>> {
        self.crypto.seal_envelope(recipient, payload)
    }

    /// Try every registered user key pair on `sealed`.
    ///
    /// Returns `None` silently when none of them opens it: most envelopes
    /// in a scanned inbox are addressed to someone else.
    pub fn try_open_envelope(&self, sealed: &[u8]) -> Option<Vec<u8>> {
        let state = self.inner.read().expect("lock poisoned");
        state
            .user_keys
            .iter()
            .find_map(|pair| self.crypto.open_envelope(pair, sealed))
    }

    pub fn set_default_feed(&self, feed: FeedId) {
        self.inner.write().expect("lock poisoned").default_feed = Some(feed);
    }

    pub fn default_feed(&self) -> Option<FeedId> {
        self.inner.read().expect("lock poisoned").default_feed
    }

    /// `feed` if given, otherwise the session's default feed.
    pub fn resolve_feed(&self, feed: Option<FeedId>) -> Option<FeedId> {
        feed.or_else(|| self.default_feed())
    }

    /// Number of registered object keys.
    pub fn key_count(&self) -> usize {
        self.inner.read().expect("lock poisoned").keys.len()
    }
}

impl Default for KeyRouter {
    fn default() -> Self {
        Self::new(Arc::new(DefaultCrypto))
    }
}

impl std::fmt::Debug for KeyRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.read().expect("lock poisoned");
        f.debug_struct("KeyRouter")
            .field("keys", &state.keys.len())
            .field("public", &state.public.len())
            .field("user_keys", &state.user_keys.len())
            .finish()
    }
}
