//! Labels and message formats of the social graph.
//!
//! ```text
//! UserRoot --identity--> UserKey
//!          --profile---> UserProfile
//!          --friends---> Directory --friend--> (friend's UserRoot)
//!          --inbox-----> Directory --envelope--> (sealed channel URLs)
//!          --channels--> Directory --<friend feed hex>--> channel --message--> Message
//!          --shares----> Directory --share--> Share marker --share--> shared vertex
//! ```

use serde_json::json;

use hg_graph::{GraphObject, GraphResult, VertexUrl};

pub const IDENTITY: &str = "identity";
pub const PROFILE: &str = "profile";
pub const FRIENDS: &str = "friends";
pub const FRIEND: &str = "friend";
pub const INBOX: &str = "inbox";
pub const CHANNELS: &str = "channels";
pub const MESSAGE: &str = "message";
pub const SHARES: &str = "shares";
pub const SHARE: &str = "share";

/// Computed by `ContactsView`.
pub const CONTACTS: &str = "contacts";
/// Computed by `CommunicationView`.
pub const RECEIVED_SHARES: &str = "receivedShares";

const SHARE_MESSAGE_TYPE: &str = "share";

/// Message announcing a share to a friend.
pub fn share_message(url: &VertexUrl) -> GraphObject {
    GraphObject::message(json!({
        "type": SHARE_MESSAGE_TYPE,
        "url": url.to_string(),
    }))
}

/// The share URL of a share message, `None` for any other content.
pub fn parse_share_message(content: &GraphObject) -> Option<GraphResult<VertexUrl>> {
    let json = content.as_json()?;
    if json.type_name != GraphObject::MESSAGE || json.message_type() != Some(SHARE_MESSAGE_TYPE) {
        return None;
    }
    let url = json.value.get("url")?.as_str()?;
    Some(VertexUrl::parse(url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hg_types::FeedId;

    #[test]
    fn share_messages_carry_their_url() {
        let url = VertexUrl::new(FeedId::from_bytes([4; 32]), 9).with_name("photos");
        let parsed = parse_share_message(&share_message(&url)).unwrap().unwrap();
        assert_eq!(parsed, url);
    }

    #[test]
    fn other_content_is_not_a_share() {
        assert!(parse_share_message(&GraphObject::directory()).is_none());
        let chat = GraphObject::message(json!({"type": "text", "body": "hi"}));
        assert!(parse_share_message(&chat).is_none());
        let broken = GraphObject::message(json!({"type": "share", "url": "nope"}));
        assert!(parse_share_message(&broken).unwrap().is_err());
    }
}
