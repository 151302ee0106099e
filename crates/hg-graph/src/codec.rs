use std::collections::HashMap;
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::edge::Edge;
use crate::error::{GraphError, GraphResult};
use crate::object::{GraphObject, JsonObject};

/// Builds a [`GraphObject`] from the JSON data of its envelope.
pub type Decoder = fn(&str, Value) -> GraphResult<GraphObject>;

/// Tagged content envelope.
#[derive(Serialize, Deserialize)]
struct ContentEnvelope {
    type_name: String,
    data: Vec<u8>,
}

/// Stored form of a vertex: encoded content plus its edges.
#[derive(Serialize, Deserialize)]
struct VertexRecord {
    content: Option<Vec<u8>>,
    edges: Vec<Edge>,
}

fn from_json<T: DeserializeOwned>(value: Value) -> GraphResult<T> {
    serde_json::from_value(value).map_err(|e| GraphError::Serialization(e.to_string()))
}

/// Type-tag dispatching content codec.
///
/// Content is written as `{type_name, data}`; decoding looks the tag up in
/// the registry. An unregistered tag is a hard [`GraphError::UnknownType`].
/// Registering a name twice replaces the earlier decoder.
pub struct Codec {
    decoders: RwLock<HashMap<String, Decoder>>,
}

impl Codec {
    /// A codec with every built-in content type registered.
    pub fn new() -> Self {
        let codec = Self::empty();
        codec.register(GraphObject::DIRECTORY, |_, v| Ok(GraphObject::Directory(from_json(v)?)));
        codec.register(GraphObject::FILE, |_, v| Ok(GraphObject::File(from_json(v)?)));
        codec.register(GraphObject::THOMBSTONE, |_, v| Ok(GraphObject::Thombstone(from_json(v)?)));
        codec.register(GraphObject::USER_ROOT, |_, v| Ok(GraphObject::UserRoot(from_json(v)?)));
        codec.register(GraphObject::USER_KEY, |_, v| Ok(GraphObject::UserKey(from_json(v)?)));
        codec.register(GraphObject::USER_PROFILE, |_, v| {
            Ok(GraphObject::UserProfile(from_json(v)?))
        });
        codec.register(GraphObject::PRE_SHARED, |_, v| Ok(GraphObject::PreShared(from_json(v)?)));
        codec.register(GraphObject::SPACE, |_, v| Ok(GraphObject::Space(from_json(v)?)));
        codec.register(GraphObject::SHARE, |_, v| Ok(GraphObject::Share(from_json(v)?)));
        codec.register(GraphObject::SIMPLE, |_, v| Ok(GraphObject::Simple(from_json(v)?)));
        codec.register_json(GraphObject::MESSAGE);
        codec
    }

    /// A codec that knows no types at all.
    pub fn empty() -> Self {
        Self {
            decoders: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, type_name: &str, decoder: Decoder) {
        let previous = self
            .decoders
            .write()
            .expect("lock poisoned")
            .insert(type_name.to_string(), decoder);
        if previous.is_some() {
            debug!(type_name, "replaced content decoder");
        }
    }

    /// Register `type_name` as free-form JSON content.
    pub fn register_json(&self, type_name: &str) {
        self.register(type_name, |name, value| {
            Ok(GraphObject::Json(JsonObject::new(name, value)))
        });
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.decoders
            .read()
            .expect("lock poisoned")
            .contains_key(type_name)
    }

    pub fn encode(&self, object: &GraphObject) -> GraphResult<Vec<u8>> {
        let data = match object {
            GraphObject::Directory(o) => serde_json::to_vec(o),
            GraphObject::File(o) => serde_json::to_vec(o),
            GraphObject::Thombstone(o) => serde_json::to_vec(o),
            GraphObject::UserRoot(o) => serde_json::to_vec(o),
            GraphObject::UserKey(o) => serde_json::to_vec(o),
            GraphObject::UserProfile(o) => serde_json::to_vec(o),
            GraphObject::PreShared(o) => serde_json::to_vec(o),
            GraphObject::Space(o) => serde_json::to_vec(o),
            GraphObject::Share(o) => serde_json::to_vec(o),
            GraphObject::Json(o) => serde_json::to_vec(&o.value),
            GraphObject::Simple(o) => serde_json::to_vec(o),
        }
        .map_err(|e| GraphError::Serialization(e.to_string()))?;

        bincode::serialize(&ContentEnvelope {
            type_name: object.type_name().to_string(),
            data,
        })
        .map_err(|e| GraphError::Serialization(e.to_string()))
    }

    pub fn decode(&self, bytes: &[u8]) -> GraphResult<GraphObject> {
        let envelope: ContentEnvelope =
            bincode::deserialize(bytes).map_err(|e| GraphError::Serialization(e.to_string()))?;
        let decoder = self
            .decoders
            .read()
            .expect("lock poisoned")
            .get(&envelope.type_name)
            .copied()
            .ok_or_else(|| GraphError::UnknownType(envelope.type_name.clone()))?;
        let value: Value = serde_json::from_slice(&envelope.data)
            .map_err(|e| GraphError::Serialization(e.to_string()))?;
        decoder(&envelope.type_name, value)
    }

    /// Encode a whole vertex body.
    pub fn encode_vertex(&self, content: Option<&GraphObject>, edges: &[Edge]) -> GraphResult<Vec<u8>> {
        let record = VertexRecord {
            content: content.map(|c| self.encode(c)).transpose()?,
            edges: edges.to_vec(),
        };
        bincode::serialize(&record).map_err(|e| GraphError::Serialization(e.to_string()))
    }

    pub fn decode_vertex(&self, bytes: &[u8]) -> GraphResult<(Option<GraphObject>, Vec<Edge>)> {
        let record: VertexRecord =
            bincode::deserialize(bytes).map_err(|e| GraphError::Serialization(e.to_string()))?;
        let content = record.content.map(|c| self.decode(&c)).transpose()?;
        Ok((content, record.edges))
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let decoders = self.decoders.read().expect("lock poisoned");
        let mut names: Vec<&String> = decoders.keys().collect();
        names.sort();
        f.debug_struct("Codec").field("types", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::*;
    use hg_crypto::UserKeyPair;
    use hg_types::FeedId;

    fn all_variants() -> Vec<GraphObject> {
        let owner = Some(FeedId::from_bytes([3; 32]));
        vec![
            GraphObject::directory(),
            GraphObject::File(File {
                filename: Some("notes.txt".into()),
            }),
            GraphObject::Thombstone(Thombstone {}),
            GraphObject::UserRoot(UserRoot {}),
            GraphObject::UserKey(UserKey {
                public_key: UserKeyPair::generate().public_key(),
            }),
            GraphObject::UserProfile(UserProfile {
                name: Some("Ada".into()),
                properties: [("lang".to_string(), "en".to_string())].into(),
            }),
            GraphObject::PreShared(PreShared {
                owner,
                expiry_date: 1_900_000_000_000,
                write_capability: Some(vec![7; 32]),
            }),
            GraphObject::Space(Space { owner }),
            GraphObject::Share(Share {
                revoked: true,
                info: Some("photos".into()),
                owner,
            }),
            GraphObject::message(serde_json::json!({"type": "share", "url": "hyper://x/1"})),
            GraphObject::simple([("greeting", "hello")]),
        ]
    }

    #[test]
    fn every_variant_survives_encoding() {
        let codec = Codec::new();
        for object in all_variants() {
            let bytes = codec.encode(&object).unwrap();
            assert_eq!(codec.decode(&bytes).unwrap(), object, "{}", object.type_name());
        }
    }

    #[test]
    fn unregistered_type_is_a_hard_error() {
        let codec = Codec::new();
        let bytes = codec
            .encode(&GraphObject::Json(JsonObject::new("Custom", serde_json::json!(1))))
            .unwrap();
        assert!(matches!(
            codec.decode(&bytes),
            Err(GraphError::UnknownType(name)) if name == "Custom"
        ));

        codec.register_json("Custom");
        assert!(codec.decode(&bytes).is_ok());
    }

    #[test]
    fn empty_codec_knows_nothing() {
        let codec = Codec::empty();
        let bytes = Codec::new().encode(&GraphObject::directory()).unwrap();
        assert!(matches!(codec.decode(&bytes), Err(GraphError::UnknownType(_))));
    }

    #[test]
    fn registering_twice_replaces() {
        let codec = Codec::new();
        codec.register(GraphObject::SIMPLE, |_, _| Ok(GraphObject::directory()));
        let bytes = codec.encode(&GraphObject::simple([("a", "b")])).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), GraphObject::directory());
    }

    #[test]
    fn vertex_body_roundtrip() {
        let codec = Codec::new();
        let edges = vec![Edge::new(1, "child", None)];
        let bytes = codec
            .encode_vertex(Some(&GraphObject::directory()), &edges)
            .unwrap();
        let (content, decoded) = codec.decode_vertex(&bytes).unwrap();
        assert_eq!(content, Some(GraphObject::directory()));
        assert_eq!(decoded, edges);

        let bytes = codec.encode_vertex(None, &[]).unwrap();
        assert_eq!(codec.decode_vertex(&bytes).unwrap(), (None, vec![]));
    }
}
