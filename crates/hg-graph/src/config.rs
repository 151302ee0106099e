use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use hg_crypto::KeyKind;
use hg_store::StoreConfig;

use crate::error::{GraphError, GraphResult};

/// Configuration of a graph session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub store: StoreConfig,
    /// Generate a key for every created object. Off writes public objects.
    pub encrypt_new_objects: bool,
    pub key_kind: KeyKind,
    /// Number of preshared vertices offered by a collaboration space.
    pub preshared_slots: usize,
    /// Lifetime of a preshared vertex before rotation.
    pub preshared_ttl_secs: u64,
    /// Depth bound of `repeat` when the caller passes none.
    pub max_repeat_depth: usize,
    /// Retries of a read-modify-write after a conflicting append.
    pub write_retries: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            encrypt_new_objects: true,
            key_kind: KeyKind::Stream,
            preshared_slots: 3,
            preshared_ttl_secs: 7 * 24 * 60 * 60,
            max_repeat_depth: 64,
            write_retries: 8,
        }
    }
}

impl GraphConfig {
    pub fn from_toml_str(text: &str) -> GraphResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| GraphError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> GraphResult<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn preshared_ttl(&self) -> Duration {
        Duration::from_secs(self.preshared_ttl_secs)
    }

    /// Cipher for created objects, `None` when they are written public.
    pub fn new_object_keys(&self) -> Option<KeyKind> {
        self.encrypt_new_objects.then_some(self.key_kind)
    }

    fn validate(&self) -> GraphResult<()> {
        if self.preshared_slots == 0 {
            return Err(GraphError::Config("preshared_slots must be at least 1".into()));
        }
        if self.max_repeat_depth == 0 {
            return Err(GraphError::Config("max_repeat_depth must be at least 1".into()));
        }
        Ok(())
    }
}
