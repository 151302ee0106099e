//! `hyper://` vertex URLs.
//!
//! ```text
//! hyper://<feedHex>[+<version>]/<id>?key=<hexKey>[&mkey=<hex>&fkey=<hex>][&name=<urlencoded>]
//! ```

use std::fmt;
use std::str::FromStr;

use url::form_urlencoded;
use url::Url;

use hg_crypto::ObjectKey;
use hg_types::FeedId;

use crate::error::{GraphError, GraphResult};

pub const SCHEME: &str = "hyper";

/// Parsed vertex URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VertexUrl {
    pub feed: FeedId,
    pub id: u64,
    pub version: Option<u64>,
    pub key: Option<ObjectKey>,
    /// Auxiliary key material of the filesystem layer, passed through.
    pub mkey: Option<Vec<u8>>,
    pub fkey: Option<Vec<u8>>,
    pub name: Option<String>,
}

impl VertexUrl {
    pub fn new(feed: FeedId, id: u64) -> Self {
        Self {
            feed,
            id,
            version: None,
            key: None,
            mkey: None,
            fkey: None,
            name: None,
        }
    }

    pub fn with_key(mut self, key: ObjectKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn parse(input: &str) -> GraphResult<Self> {
        let url = Url::parse(input).map_err(|e| GraphError::InvalidUrl(format!("{input}: {e}")))?;
        if url.scheme() != SCHEME {
            return Err(GraphError::InvalidUrl(format!(
                "expected {SCHEME}:// scheme, got {}",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| GraphError::InvalidUrl(format!("{input}: missing feed")))?;
        let (feed_hex, version) = match host.split_once('+') {
            Some((feed, version)) => {
                let numeric = !version.is_empty() && version.bytes().all(|b| b.is_ascii_digit());
                (feed, if numeric { version.parse().ok() } else { None })
            }
            None => (host, None),
        };
        let feed = FeedId::from_hex(feed_hex)?;

        let path = url.path().trim_start_matches('/');
        let id = path
            .parse::<u64>()
            .map_err(|_| GraphError::InvalidUrl(format!("{input}: non-numeric id '{path}'")))?;

        let mut parsed = Self::new(feed, id);
        parsed.version = version;
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "key" => parsed.key = Some(ObjectKey::from_metadata(&decode_hex(&value)?)?),
                "mkey" => parsed.mkey = Some(decode_hex(&value)?),
                "fkey" => parsed.fkey = Some(decode_hex(&value)?),
                "name" => parsed.name = Some(value.into_owned()),
                _ => {}
            }
        }
        Ok(parsed)
    }
}

fn decode_hex(value: &str) -> GraphResult<Vec<u8>> {
    hex::decode(value).map_err(|e| GraphError::InvalidUrl(format!("bad hex '{value}': {e}")))
}

impl fmt::Display for VertexUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}://{}", self.feed.to_hex())?;
        if let Some(version) = self.version {
            write!(f, "+{version}")?;
        }
        write!(f, "/{}", self.id)?;

        let mut query = form_urlencoded::Serializer::new(String::new());
        if let Some(key) = &self.key {
            query.append_pair("key", &hex::encode(key.to_metadata()));
        }
        if let Some(mkey) = &self.mkey {
            query.append_pair("mkey", &hex::encode(mkey));
        }
        if let Some(fkey) = &self.fkey {
            query.append_pair("fkey", &hex::encode(fkey));
        }
        if let Some(name) = &self.name {
            query.append_pair("name", name);
        }
        let query = query.finish();
        if !query.is_empty() {
            write!(f, "?{query}")?;
        }
        Ok(())
    }
}

impl FromStr for VertexUrl {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
