//! Typed vertex content.
//!
//! Every variant has a stable type name that is written next to the
//! serialized data, see [`crate::codec::Codec`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use hg_crypto::BoxPublicKey;
use hg_types::FeedId;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub filename: Option<String>,
}

/// Marks a deleted path entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thombstone {}

/// Root of a user's social graph.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoot {}

/// Public half of a user's envelope key pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserKey {
    pub public_key: BoxPublicKey,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Rotating, time-limited write target of a collaboration space.
///
/// The vertex lives in a slot feed of its own; `write_capability` is that
/// feed's secret, so anyone who can read the vertex can append to it
/// without touching the owner's feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreShared {
    pub owner: Option<FeedId>,
    /// Milliseconds since the Unix epoch after which writers must not pick it.
    pub expiry_date: u64,
    pub write_capability: Option<Vec<u8>>,
}

impl PreShared {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expiry_date
    }
}

/// Collaboration-space marker.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    pub owner: Option<FeedId>,
}

/// Share indirection marker. Its `share` edge points at the shared vertex.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    #[serde(default)]
    pub revoked: bool,
    pub info: Option<String>,
    pub owner: Option<FeedId>,
}

/// Arbitrary JSON payload under an application-chosen type name
/// (messages, provisioning records).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonObject {
    pub type_name: String,
    pub value: serde_json::Value,
}

impl JsonObject {
    pub fn new(type_name: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            type_name: type_name.into(),
            value,
        }
    }

    /// The `type` field of a message payload, if it is an object with one.
    pub fn message_type(&self) -> Option<&str> {
        self.value.get("type").and_then(serde_json::Value::as_str)
    }
}

/// Generic string key-value content.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Simple {
    pub properties: BTreeMap<String, String>,
}

/// Content of a vertex.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphObject {
    Directory(Directory),
    File(File),
    Thombstone(Thombstone),
    UserRoot(UserRoot),
    UserKey(UserKey),
    UserProfile(UserProfile),
    PreShared(PreShared),
    Space(Space),
    Share(Share),
    Json(JsonObject),
    Simple(Simple),
}

impl GraphObject {
    /// Type names of the built-in variants.
    pub const DIRECTORY: &'static str = "Directory";
    pub const FILE: &'static str = "File";
    pub const THOMBSTONE: &'static str = "Thombstone";
    pub const USER_ROOT: &'static str = "UserRoot";
    pub const USER_KEY: &'static str = "UserKey";
    pub const USER_PROFILE: &'static str = "UserProfile";
    pub const PRE_SHARED: &'static str = "PreSharedGraphObject";
    pub const SPACE: &'static str = "SpaceGraphObject";
    pub const SHARE: &'static str = "ShareGraphObject";
    pub const SIMPLE: &'static str = "Simple";
    pub const MESSAGE: &'static str = "Message";

    pub fn type_name(&self) -> &str {
        match self {
            Self::Directory(_) => Self::DIRECTORY,
            Self::File(_) => Self::FILE,
            Self::Thombstone(_) => Self::THOMBSTONE,
            Self::UserRoot(_) => Self::USER_ROOT,
            Self::UserKey(_) => Self::USER_KEY,
            Self::UserProfile(_) => Self::USER_PROFILE,
            Self::PreShared(_) => Self::PRE_SHARED,
            Self::Space(_) => Self::SPACE,
            Self::Share(_) => Self::SHARE,
            Self::Json(json) => &json.type_name,
            Self::Simple(_) => Self::SIMPLE,
        }
    }

    pub fn directory() -> Self {
        Self::Directory(Directory::default())
    }

    pub fn simple<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Simple(Simple {
            properties: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        })
    }

    pub fn message(value: serde_json::Value) -> Self {
        Self::Json(JsonObject::new(Self::MESSAGE, value))
    }

    pub fn as_share(&self) -> Option<&Share> {
        match self {
            Self::Share(share) => Some(share),
            _ => None,
        }
    }

    pub fn as_pre_shared(&self) -> Option<&PreShared> {
        match self {
            Self::PreShared(psv) => Some(psv),
            _ => None,
        }
    }

    pub fn as_space(&self) -> Option<&Space> {
        match self {
            Self::Space(space) => Some(space),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&JsonObject> {
        match self {
            Self::Json(json) => Some(json),
            _ => None,
        }
    }

    pub fn as_simple(&self) -> Option<&Simple> {
        match self {
            Self::Simple(simple) => Some(simple),
            _ => None,
        }
    }
}
