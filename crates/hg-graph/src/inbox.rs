use std::sync::Arc;

use tracing::{debug, warn};

use hg_crypto::BoxPublicKey;
use hg_types::FeedId;

use crate::core::Core;
use crate::edge::{meta, Edge};
use crate::error::{GraphError, GraphResult};
use crate::object::GraphObject;
use crate::url::VertexUrl;
use crate::vertex::Vertex;

/// Edge label of posted envelopes.
pub const ENVELOPE_LABEL: &str = "envelope";

/// A vertex collecting sealed pointers to other vertices.
///
/// Each envelope edge carries the URL (key included) of a message sealed
/// to one recipient's public key. Everybody can read the inbox, but only
/// the recipient can open an envelope, so scanning an inbox silently skips
/// everything addressed to someone else.
pub struct Inbox {
    core: Arc<Core>,
    vertex: Vertex,
}

impl Inbox {
    /// Create and persist an empty inbox in `feed`, or the default feed.
    pub fn create(core: Arc<Core>, feed: Option<FeedId>) -> GraphResult<Self> {
        let mut vertex = Vertex::with_content(GraphObject::directory());
        core.put_all([&mut vertex], feed)?;
        Ok(Self { core, vertex })
    }

    /// Wrap an inbox vertex that is already persisted.
    pub fn open(core: Arc<Core>, vertex: Vertex) -> GraphResult<Self> {
        vertex.require_address()?;
        Ok(Self { core, vertex })
    }

    pub fn vertex(&self) -> &Vertex {
        &self.vertex
    }

    /// Current version of the inbox vertex.
    pub fn version(&self) -> u64 {
        self.vertex.version().unwrap_or(0)
    }

    fn reload(&mut self) -> GraphResult<()> {
        let (feed, id) = self.vertex.require_address()?;
        self.vertex = self.core.get(feed, id, None)?;
        Ok(())
    }

    /// Seal the URL of `message` to `recipient` and post it.
    ///
    /// The envelope edge records the inbox version it was posted at under
    /// [`meta::POSTED_AT`], which is what
    /// [`check_envelopes`](Inbox::check_envelopes) filters on. The edge
    /// itself is not pinned, so traversals read the message at its head.
    pub fn post_envelope(&mut self, message: &Vertex, recipient: &BoxPublicKey) -> GraphResult<()> {
        let (feed, id) = message.require_address()?;
        let mut url = VertexUrl::new(feed, id);
        if let Some(key) = self.core.get_key(message) {
            url = url.with_key(key);
        }
        let sealed = self
            .core
            .router()
            .seal_envelope(recipient, url.to_string().as_bytes())?;

        self.reload()?;
        if !self.vertex.writable() {
            return Err(GraphError::Permission("inbox is not writable".into()));
        }
        let inbox_feed = self.vertex.feed();
        let edge = Edge::new(id, ENVELOPE_LABEL, (Some(feed) != inbox_feed).then_some(feed))
            .with_metadata(meta::POSTED_AT, self.version().to_be_bytes().to_vec())
            .with_metadata(meta::ENVELOPE, sealed);
        self.vertex.add_edge(edge);
        self.core.put(&mut self.vertex)?;
        debug!(inbox = self.vertex.id(), "posted envelope");
        Ok(())
    }

    /// Messages addressed to this session posted at or after `since`.
    ///
    /// Envelopes this session cannot open are skipped, as are messages
    /// whose URL is malformed or whose vertex cannot be read.
    pub fn check_envelopes(&mut self, since: Option<u64>) -> GraphResult<Vec<Vertex>> {
        self.reload()?;
        let since = since.unwrap_or(0);
        let router = self.core.router();

        let mut messages = Vec::new();
        for edge in self.vertex.edges_labeled(ENVELOPE_LABEL) {
            if posted_at(edge) < since {
                continue;
            }
            let Some(sealed) = edge.metadata(meta::ENVELOPE) else {
                continue;
            };
            let Some(payload) = router.try_open_envelope(sealed) else {
                debug!(target = edge.target, "envelope not addressed to us");
                continue;
            };
            let url = match std::str::from_utf8(&payload)
                .map_err(|e| GraphError::InvalidUrl(e.to_string()))
                .and_then(VertexUrl::parse)
            {
                Ok(url) => url,
                Err(e) => {
                    warn!(error = %e, "skipping envelope with malformed URL");
                    continue;
                }
            };
            match self.core.get(url.feed, url.id, url.key) {
                Ok(message) => messages.push(message),
                Err(e) => warn!(feed = %url.feed.short_hex(), id = url.id, error = %e, "skipping unreadable message"),
            }
        }
        Ok(messages)
    }
}

fn posted_at(edge: &Edge) -> u64 {
    edge.metadata(meta::POSTED_AT)
        .and_then(|raw| <[u8; 8]>::try_from(raw).ok())
        .map_or(0, u64::from_be_bytes)
}

impl std::fmt::Debug for Inbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inbox").field("vertex", &self.vertex.address()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;
    use hg_crypto::{KeyRouter, UserKeyPair};
    use hg_store::MemoryCorestore;

    fn session(corestore: Arc<MemoryCorestore>) -> Arc<Core> {
        Arc::new(Core::new(
            corestore,
            Arc::new(KeyRouter::default()),
            GraphConfig::default(),
        ))
    }

    fn message(core: &Core, text: &str) -> Vertex {
        let mut v = Vertex::with_content(GraphObject::simple([("text", text)]));
        core.put(&mut v).unwrap();
        v
    }

    #[test]
    fn only_the_recipient_opens_envelopes() {
        let swarm = Arc::new(MemoryCorestore::new());
        let alice = session(swarm.clone());
        let bob = session(Arc::new(swarm.replica()));
        let carol = session(Arc::new(swarm.replica()));
        let bob_keys = UserKeyPair::generate();
        let bob_public = bob_keys.public_key();
        bob.router().register_user_key_pair(bob_keys);
        carol.router().register_user_key_pair(UserKeyPair::generate());

        let mut inbox = Inbox::create(alice.clone(), None).unwrap();
        inbox
            .post_envelope(&message(&alice, "for bob"), &bob_public)
            .unwrap();
        inbox
            .post_envelope(&message(&alice, "for someone else"), &UserKeyPair::generate().public_key())
            .unwrap();

        let (feed, id) = inbox.vertex().address().unwrap();
        let key = alice.get_key(inbox.vertex());
        let mut bobs = Inbox::open(bob.clone(), bob.get(feed, id, key.clone()).unwrap()).unwrap();
        let received = bobs.check_envelopes(None).unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(
            received[0].content(),
            Some(&GraphObject::simple([("text", "for bob")]))
        );

        let mut carols = Inbox::open(carol.clone(), carol.get(feed, id, key).unwrap()).unwrap();
        assert!(carols.check_envelopes(None).unwrap().is_empty());
    }

    #[test]
    fn since_filters_older_envelopes() {
        let core = session(Arc::new(MemoryCorestore::new()));
        let me = UserKeyPair::generate();
        let public = me.public_key();
        core.router().register_user_key_pair(me);

        let mut inbox = Inbox::create(core.clone(), None).unwrap();
        inbox.post_envelope(&message(&core, "first"), &public).unwrap();
        let seen = inbox.version();
        inbox.post_envelope(&message(&core, "second"), &public).unwrap();

        assert_eq!(inbox.check_envelopes(None).unwrap().len(), 2);
        let fresh = inbox.check_envelopes(Some(seen)).unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(
            fresh[0].content(),
            Some(&GraphObject::simple([("text", "second")]))
        );
    }

    #[test]
    fn envelope_edges_are_not_version_pinned() {
        let core = session(Arc::new(MemoryCorestore::new()));
        let me = UserKeyPair::generate();
        let public = me.public_key();
        core.router().register_user_key_pair(me);

        let mut inbox = Inbox::create(core.clone(), None).unwrap();
        let posted = inbox.version();
        let mut msg = message(&core, "hello");
        inbox.post_envelope(&msg, &public).unwrap();

        let edge = inbox.vertex().edges_labeled(ENVELOPE_LABEL).next().unwrap().clone();
        assert_eq!(edge.version, None);
        assert_eq!(posted_at(&edge), posted);

        // The owner follows the edge like any other and sees later writes.
        msg.set_content(Some(GraphObject::simple([("text", "edited")])));
        core.put(&mut msg).unwrap();
        let (feed, _) = inbox.vertex().address().unwrap();
        let target = core
            .get(edge.target_feed(feed), edge.target, core.get_key(&msg))
            .unwrap();
        assert_eq!(target.content(), Some(&GraphObject::simple([("text", "edited")])));
    }

    #[test]
    fn posting_to_foreign_inbox_is_refused() {
        let swarm = Arc::new(MemoryCorestore::new());
        let alice = session(swarm.clone());
        let bob = session(Arc::new(swarm.replica()));
        let inbox = Inbox::create(alice.clone(), None).unwrap();
        let (feed, id) = inbox.vertex().address().unwrap();

        let foreign = bob.get(feed, id, alice.get_key(inbox.vertex())).unwrap();
        let mut foreign = Inbox::open(bob.clone(), foreign).unwrap();
        let msg = message(&bob, "hi");
        assert!(matches!(
            foreign.post_envelope(&msg, &UserKeyPair::generate().public_key()),
            Err(GraphError::Permission(_))
        ));
    }
}
