use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::GraphError;

/// Name of a traversal interpreter.
///
/// Edges may carry a `ViewKind` as a hint; following such an edge hands the
/// rest of the traversal to that view. On the wire a kind is stored by its
/// name, so adding kinds never renumbers existing data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ViewKind {
    Graph,
    Static,
    Share,
    Referrer,
    Space,
    Contacts,
    Communication,
    DriveShare,
}

impl ViewKind {
    pub const ALL: [ViewKind; 8] = [
        Self::Graph,
        Self::Static,
        Self::Share,
        Self::Referrer,
        Self::Space,
        Self::Contacts,
        Self::Communication,
        Self::DriveShare,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Graph => "GraphView",
            Self::Static => "StaticView",
            Self::Share => "ShareView",
            Self::Referrer => "ReferrerView",
            Self::Space => "CollaborationSpaceView",
            Self::Contacts => "ContactsView",
            Self::Communication => "CommunicationView",
            Self::DriveShare => "DriveShareView",
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ViewKind {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| GraphError::Structural(format!("unknown view '{s}'")))
    }
}

impl Serialize for ViewKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for ViewKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}
