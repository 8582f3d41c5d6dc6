use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stow_adapter::AdapterConfig;

use crate::codec::Codec;
use crate::error::{StoreError, StoreResult};

/// Object store configuration, usually loaded from TOML:
///
/// ```toml
/// codec = "json"
/// lock_timeout_ms = 2000
///
/// [adapter]
/// kind = "file"
/// path = "data/stow.db"
/// sync = "every_write"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Codec for newly written payloads.
    pub codec: Codec,
    /// Upper bound on waiting for the adapter handle or an identity lock.
    pub lock_timeout_ms: u64,
    pub adapter: AdapterConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            codec: Codec::default(),
            lock_timeout_ms: 5_000,
            adapter: AdapterConfig::default(),
        }
    }
}

impl StoreConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| StoreError::Config(e.to_string()))?;
        if config.lock_timeout_ms == 0 {
            return Err(StoreError::Config("lock_timeout_ms must be positive".into()));
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> StoreResult<String> {
        toml::to_string(self).map_err(|e| StoreError::Config(e.to_string()))
    }
}
