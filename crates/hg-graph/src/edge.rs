use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use hg_crypto::ObjectKey;
use hg_types::FeedId;

use crate::error::{GraphError, GraphResult};
use crate::view_kind::ViewKind;

/// Well-known edge metadata keys.
pub mod meta {
    /// Symmetric key of the edge target.
    pub const KEY: &str = "key";
    /// Sealed envelope carrying a vertex URL for one recipient.
    pub const ENVELOPE: &str = "envelope";
    /// Inbox version an envelope was posted at, big-endian `u64`.
    pub const POSTED_AT: &str = "postedAt";
    /// Key of the object a referrer edge finally resolves to.
    pub const REF_KEY: &str = "refKey";
    /// Label under which the preshared vertex links the final object.
    pub const REF_LABEL: &str = "refLabel";
}

/// A path rule carried by an edge.
///
/// `rule` is a `/`-separated glob relative to the edge target: `*` matches
/// within one segment, `**` matches any number of segments. `except` carves
/// an exception out of the rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restriction {
    pub rule: String,
    pub except: Option<Box<Restriction>>,
}

impl Restriction {
    pub fn new(rule: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            except: None,
        }
    }

    pub fn except(mut self, except: Restriction) -> Self {
        self.except = Some(Box::new(except));
        self
    }
}

/// A labeled reference from one vertex to another.
///
/// `feed` is `None` for a target in the same feed as the source vertex.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub target: u64,
    pub label: String,
    pub feed: Option<FeedId>,
    /// Version pin on the target.
    pub version: Option<u64>,
    /// Interpreter the traversal switches to when following this edge.
    pub view: Option<ViewKind>,
    pub metadata: Option<BTreeMap<String, Vec<u8>>>,
    pub restrictions: Option<Vec<Restriction>>,
}

impl Edge {
    pub fn new(target: u64, label: impl Into<String>, feed: Option<FeedId>) -> Self {
        Self {
            target,
            label: label.into(),
            feed,
            version: None,
            view: None,
            metadata: None,
            restrictions: None,
        }
    }

    pub fn with_view(mut self, view: ViewKind) -> Self {
        self.view = Some(view);
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: Vec<u8>) -> Self {
        self.set_metadata(key, value);
        self
    }

    pub fn with_restrictions(mut self, restrictions: Vec<Restriction>) -> Self {
        self.restrictions = Some(restrictions);
        self
    }

    /// Feed of the target, resolving same-feed edges against `source`.
    pub fn target_feed(&self, source: FeedId) -> FeedId {
        self.feed.unwrap_or(source)
    }

    pub fn metadata(&self, key: &str) -> Option<&[u8]> {
        self.metadata.as_ref()?.get(key).map(Vec::as_slice)
    }

    pub fn set_metadata(&mut self, key: &str, value: Vec<u8>) {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value);
    }

    pub fn has_metadata(&self, key: &str) -> bool {
        self.metadata(key).is_some()
    }

    /// Target key carried in the metadata, if any.
    pub fn key(&self) -> GraphResult<Option<ObjectKey>> {
        self.metadata(meta::KEY)
            .map(|raw| {
                ObjectKey::from_metadata(raw)
                    .map_err(|e| GraphError::Structural(format!("bad key on edge '{}': {e}", self.label)))
            })
            .transpose()
    }

    pub fn set_key(&mut self, key: &ObjectKey) {
        self.set_metadata(meta::KEY, key.to_metadata());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hg_crypto::KeyKind;

    #[test]
    fn same_feed_edges_resolve_to_source() {
        let source = FeedId::from_bytes([1; 32]);
        let other = FeedId::from_bytes([2; 32]);
        assert_eq!(Edge::new(3, "a", None).target_feed(source), source);
        assert_eq!(Edge::new(3, "a", Some(other)).target_feed(source), other);
    }

    #[test]
    fn key_metadata_roundtrip() {
        let key = ObjectKey::generate(KeyKind::Stream);
        let mut edge = Edge::new(0, "child", None);
        assert!(edge.key().unwrap().is_none());
        edge.set_key(&key);
        assert_eq!(edge.key().unwrap(), Some(key));
    }

    #[test]
    fn malformed_key_is_structural() {
        let edge = Edge::new(0, "child", None).with_metadata(meta::KEY, vec![1, 2]);
        assert!(matches!(edge.key(), Err(GraphError::Structural(_))));
    }

    #[test]
    fn serialized_edge_keeps_every_field() {
        let edge = Edge::new(9, "docs", Some(FeedId::from_bytes([7; 32])))
            .with_version(12)
            .with_view(ViewKind::Share)
            .with_metadata(meta::REF_LABEL, vec![1, 2, 3])
            .with_restrictions(vec![Restriction::new("a/**").except(Restriction::new("a/b"))]);
        let bytes = bincode::serialize(&edge).unwrap();
        assert_eq!(bincode::deserialize::<Edge>(&bytes).unwrap(), edge);
    }
}
