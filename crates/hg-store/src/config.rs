use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Flush/sync strategy for file-backed feeds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` after every append (safest, highest latency).
    EveryWrite,
    /// Flush to the OS page cache only.
    #[default]
    OsDefault,
}

/// Where feeds live.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Backend {
    /// Process-local in-memory swarm.
    #[default]
    Memory,
    /// One segment file per feed under `path`.
    Directory { path: PathBuf },
}

/// Configuration of the feed storage layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: Backend,
    pub sync_mode: SyncMode,
    /// How long to wait for a feed no peer has provided yet.
    pub feed_wait_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            sync_mode: SyncMode::default(),
            feed_wait_timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    pub fn feed_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.feed_wait_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = StoreConfig::default();
        assert_eq!(c.backend, Backend::Memory);
        assert_eq!(c.sync_mode, SyncMode::OsDefault);
        assert_eq!(c.feed_wait_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn directory_backend_from_toml() {
        let c: StoreConfig = toml::from_str(
            r#"
            sync_mode = "every-write"
            feed_wait_timeout_ms = 250

            [backend]
            kind = "directory"
            path = "/var/lib/hypergraph"
            "#,
        )
        .unwrap();
        assert_eq!(
            c.backend,
            Backend::Directory {
                path: PathBuf::from("/var/lib/hypergraph")
            }
        );
        assert_eq!(c.sync_mode, SyncMode::EveryWrite);
        assert_eq!(c.feed_wait_timeout_ms, 250);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let c: StoreConfig = toml::from_str("").unwrap();
        assert_eq!(c, StoreConfig::default());
    }
}
