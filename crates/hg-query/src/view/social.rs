use std::sync::Arc;

use tracing::debug;

use hg_graph::{Edge, GraphError, GraphObject, GraphResult, Inbox, ViewKind};

use super::{follow, load, View, ViewContext};
use crate::generator::Generator;
use crate::social::{self, parse_share_message};
use crate::state::QueryState;
use crate::vertex_like::{VertexLike, VirtualCommShare, VirtualContact};

/// Friend roots of the user root in `state`.
fn friends(ctx: &Arc<ViewContext>, state: &QueryState) -> Generator<QueryState> {
    let ctx = Arc::clone(ctx);
    follow(&ctx, state, Some(social::FRIENDS), false, ViewKind::Graph)
        .flat_map(move |dir| follow(&ctx, &dir, Some(social::FRIEND), false, ViewKind::Graph))
}

/// Content of the first readable `label` target of `state`.
fn first_content(ctx: &ViewContext, state: &QueryState, label: &str) -> Option<GraphObject> {
    let edge = state.value.edges().iter().find(|e| e.label == label)?;
    match load(ctx, state, edge, ViewKind::Graph) {
        Ok(next) => next.value.content().cloned(),
        Err(e) => {
            debug!(%label, error = %e, "contact detail unavailable");
            None
        }
    }
}

/// Computes `contacts` on a user root: one virtual vertex per friend,
/// carrying the friend's profile and public key when readable.
#[derive(Debug, Default)]
pub struct ContactsView;

impl View for ContactsView {
    fn kind(&self) -> ViewKind {
        ViewKind::Contacts
    }

    fn get(&self, ctx: &Arc<ViewContext>, state: &QueryState, edge: &Edge) -> Generator<QueryState> {
        Generator::new([load(ctx, state, edge, ViewKind::Contacts)])
    }

    fn out(
        &self,
        ctx: &Arc<ViewContext>,
        state: &QueryState,
        label: Option<&str>,
    ) -> Generator<QueryState> {
        if label != Some(social::CONTACTS) {
            return follow(ctx, state, label, true, ViewKind::Graph);
        }
        let ctx = Arc::clone(ctx);
        let root = state.clone();
        friends(&ctx, state).and_then(move |friend| {
            let profile = first_content(&ctx, &friend, social::PROFILE).and_then(|c| match c {
                GraphObject::UserProfile(profile) => Some(profile),
                _ => None,
            });
            let public_key = first_content(&ctx, &friend, social::IDENTITY).and_then(|c| match c {
                GraphObject::UserKey(key) => Some(key.public_key),
                _ => None,
            });
            let Some(vertex) = friend.value.into_vertex() else {
                return Err(GraphError::Structural("friend is not a stored vertex".into()));
            };
            let contact = VirtualContact {
                root: vertex,
                profile,
                public_key,
            };
            Ok(root.next(
                VertexLike::VirtualContact(contact),
                social::CONTACTS,
                ViewKind::Graph,
                None,
            ))
        })
    }
}

/// Computes `receivedShares` on a user root.
///
/// Scans the inbox of every friend for channel announcements addressed to
/// this session and turns the share messages on those channels into
/// virtual vertices whose `share` edge leads to the shared vertex.
#[derive(Debug, Default)]
pub struct CommunicationView;

impl CommunicationView {
    fn received_from(
        ctx: &Arc<ViewContext>,
        root: &QueryState,
        friend: &QueryState,
    ) -> GraphResult<Vec<GraphResult<QueryState>>> {
        let sender = friend.value.feed();
        let mut shares = Vec::new();
        for inbox in follow(ctx, friend, Some(social::INBOX), false, ViewKind::Graph) {
            let Some(vertex) = inbox?.value.into_vertex() else {
                continue;
            };
            let channels = Inbox::open(Arc::clone(ctx.core()), vertex)?.check_envelopes(None)?;
            for channel in channels {
                let channel = root.next(channel.into(), social::CHANNELS, ViewKind::Graph, None);
                for message in follow(ctx, &channel, Some(social::MESSAGE), false, ViewKind::Graph) {
                    let message = match message {
                        Ok(message) => message,
                        Err(e) => {
                            shares.push(Err(e));
                            continue;
                        }
                    };
                    let Some(url) = message.value.content().and_then(parse_share_message) else {
                        continue;
                    };
                    shares.push(url.and_then(|url| {
                        let message = message.value.into_vertex().ok_or_else(|| {
                            GraphError::Structural("message is not a stored vertex".into())
                        })?;
                        Ok(root.next(
                            VertexLike::VirtualShare(VirtualCommShare::new(message, url, sender)),
                            social::RECEIVED_SHARES,
                            ViewKind::Graph,
                            None,
                        ))
                    }));
                }
            }
        }
        Ok(shares)
    }
}

impl View for CommunicationView {
    fn kind(&self) -> ViewKind {
        ViewKind::Communication
    }

    fn get(&self, ctx: &Arc<ViewContext>, state: &QueryState, edge: &Edge) -> Generator<QueryState> {
        Generator::new([load(ctx, state, edge, ViewKind::Communication)])
    }

    fn out(
        &self,
        ctx: &Arc<ViewContext>,
        state: &QueryState,
        label: Option<&str>,
    ) -> Generator<QueryState> {
        if label != Some(social::RECEIVED_SHARES) {
            return follow(ctx, state, label, true, ViewKind::Graph);
        }
        let ctx = Arc::clone(ctx);
        let root = state.clone();
        friends(&ctx, state).flat_map(move |friend| {
            match Self::received_from(&ctx, &root, &friend) {
                Ok(shares) => Generator::from_results(shares),
                Err(e) => Generator::error(e),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::testing::*;
    use crate::view::GraphView;
    use hg_crypto::UserKeyPair;
    use hg_graph::{Share, UserKey, UserProfile, UserRoot, Vertex, VertexUrl};
    use hg_store::MemoryCorestore;

    fn user_root(ctx: &ViewContext, name: &str, public: Option<UserKeyPair>) -> Vertex {
        let profile = put(
            ctx,
            GraphObject::UserProfile(UserProfile {
                name: Some(name.to_string()),
                ..UserProfile::default()
            }),
        );
        let mut root = Vertex::with_content(GraphObject::UserRoot(UserRoot {}));
        root.add_edge_to(&profile, social::PROFILE).unwrap();
        if let Some(pair) = public {
            let identity = put(
                ctx,
                GraphObject::UserKey(UserKey {
                    public_key: pair.public_key(),
                }),
            );
            root.add_edge_to(&identity, social::IDENTITY).unwrap();
        }
        ctx.core().put(&mut root).unwrap();
        root
    }

    /// Link `friends`, whose keys `owner` knows, into the friends of `root`.
    fn befriend(ctx: &ViewContext, root: &mut Vertex, friends: &[&Vertex], owner: &ViewContext) {
        let mut dir = Vertex::with_content(GraphObject::directory());
        for friend in friends {
            let key = owner.core().get_key(friend).unwrap();
            dir.add_edge_to(friend, social::FRIEND).unwrap().set_key(&key);
        }
        ctx.core().put(&mut dir).unwrap();
        root.add_edge_to(&dir, social::FRIENDS).unwrap();
        ctx.core().put(root).unwrap();
    }

    #[test]
    fn contacts_list_friends_with_details() {
        let ctx = solo();
        let pair = UserKeyPair::generate();
        let bob = user_root(&ctx, "bob", Some(pair.clone()));
        let carol = user_root(&ctx, "carol", None);
        let mut alice = user_root(&ctx, "alice", None);
        befriend(&ctx, &mut alice, &[&bob, &carol], &ctx);

        let state = QueryState::new(alice, ViewKind::Contacts);
        let contacts = ContactsView
            .out(&ctx, &state, Some(social::CONTACTS))
            .destruct()
            .unwrap();
        let details: Vec<_> = contacts
            .iter()
            .map(|c| match &c.value {
                VertexLike::VirtualContact(contact) => {
                    (contact.name().map(str::to_string), contact.public_key)
                }
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            details,
            [
                (Some("bob".to_string()), Some(pair.public_key())),
                (Some("carol".to_string()), None),
            ]
        );
        assert_eq!(contacts[0].path_string(), social::CONTACTS);
    }

    #[test]
    fn received_shares_come_from_friends_channels() {
        let swarm = Arc::new(MemoryCorestore::new());
        let alice = session(swarm.clone());
        let bob = session(Arc::new(swarm.replica()));
        let bob_keys = UserKeyPair::generate();
        bob.core().router().register_user_key_pair(bob_keys.clone());

        // Alice shares a vertex with bob over her channel to him.
        let target = put(&alice, named("holiday photos"));
        let mut marker = Vertex::with_content(GraphObject::Share(Share::default()));
        marker.add_edge_to(&target, social::SHARE).unwrap();
        alice.core().put(&mut marker).unwrap();
        let (feed, id) = marker.address().unwrap();
        let url = VertexUrl::new(feed, id)
            .with_key(alice.core().get_key(&marker).unwrap())
            .with_name("holiday");
        let message = put(&alice, social::share_message(&url));
        let chatter = put(&alice, GraphObject::message(serde_json::json!({"type": "text"})));
        let mut channel = Vertex::with_content(GraphObject::directory());
        channel.add_edge_to(&message, social::MESSAGE).unwrap();
        channel.add_edge_to(&chatter, social::MESSAGE).unwrap();
        alice.core().put(&mut channel).unwrap();
        let mut inbox = Inbox::create(Arc::clone(alice.core()), None).unwrap();
        inbox.post_envelope(&channel, &bob_keys.public_key()).unwrap();
        let mut alice_root = user_root(&alice, "alice", None);
        alice_root.add_edge_to(inbox.vertex(), social::INBOX).unwrap();
        alice.core().put(&mut alice_root).unwrap();

        let mut bob_root = user_root(&bob, "bob", Some(bob_keys));
        befriend(&bob, &mut bob_root, &[&alice_root], &alice);

        let state = QueryState::new(bob_root, ViewKind::Communication);
        let received = CommunicationView
            .out(&bob, &state, Some(social::RECEIVED_SHARES))
            .destruct()
            .unwrap();
        assert_eq!(received.len(), 1);
        match &received[0].value {
            VertexLike::VirtualShare(share) => {
                assert_eq!(share.name(), Some("holiday"));
                assert_eq!(share.sender, alice_root.feed());
            }
            other => panic!("unexpected {other:?}"),
        }

        let shared = GraphView
            .out(&bob, &received[0], Some(social::SHARE))
            .destruct()
            .unwrap();
        assert_eq!(text(&shared[0].value), "holiday photos");
    }

    #[test]
    fn envelopes_for_others_yield_nothing() {
        let swarm = Arc::new(MemoryCorestore::new());
        let alice = session(swarm.clone());
        let bob = session(Arc::new(swarm.replica()));
        bob.core().router().register_user_key_pair(UserKeyPair::generate());

        let channel = put(&alice, GraphObject::directory());
        let mut inbox = Inbox::create(Arc::clone(alice.core()), None).unwrap();
        inbox
            .post_envelope(&channel, &UserKeyPair::generate().public_key())
            .unwrap();
        let mut alice_root = user_root(&alice, "alice", None);
        alice_root.add_edge_to(inbox.vertex(), social::INBOX).unwrap();
        alice.core().put(&mut alice_root).unwrap();
        let mut bob_root = user_root(&bob, "bob", None);
        befriend(&bob, &mut bob_root, &[&alice_root], &alice);

        let state = QueryState::new(bob_root, ViewKind::Communication);
        let received = CommunicationView
            .out(&bob, &state, Some(social::RECEIVED_SHARES))
            .destruct()
            .unwrap();
        assert!(received.is_empty());
    }
}
