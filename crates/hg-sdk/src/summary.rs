use serde::Serialize;

use hg_query::{VirtualCommShare, VirtualContact, VirtualDriveShare};
use hg_types::FeedId;

/// Flat description of a share, for listings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ShareSummary {
    pub feed: Option<FeedId>,
    pub id: i64,
    pub info: Option<String>,
    pub revoked: bool,
    /// Feed of the shared vertex.
    pub target_feed: Option<FeedId>,
    pub target_id: Option<u64>,
}

impl From<&VirtualDriveShare> for ShareSummary {
    fn from(share: &VirtualDriveShare) -> Self {
        let marker = &share.marker;
        let content = share.share();
        let target = share.target();
        Self {
            feed: marker.feed(),
            id: marker.id(),
            info: content.and_then(|s| s.info.clone()),
            revoked: content.is_some_and(|s| s.revoked),
            target_feed: match (target, marker.feed()) {
                (Some(edge), Some(feed)) => Some(edge.target_feed(feed)),
                _ => None,
            },
            target_id: target.map(|e| e.target),
        }
    }
}

/// A share that arrived from a friend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReceivedShareSummary {
    pub name: Option<String>,
    pub sender: Option<FeedId>,
    pub url: String,
}

impl From<&VirtualCommShare> for ReceivedShareSummary {
    fn from(share: &VirtualCommShare) -> Self {
        Self {
            name: share.name().map(str::to_string),
            sender: share.sender,
            url: share.url.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContactSummary {
    pub name: Option<String>,
    pub feed: Option<FeedId>,
    /// Whether the friend published a public key, so shares can be sent.
    pub reachable: bool,
}

impl From<&VirtualContact> for ContactSummary {
    fn from(contact: &VirtualContact) -> Self {
        Self {
            name: contact.name().map(str::to_string),
            feed: contact.root.feed(),
            reachable: contact.public_key.is_some(),
        }
    }
}
