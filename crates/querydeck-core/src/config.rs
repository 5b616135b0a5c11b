//! Configuration for the query layer
//!
//! Loaded once from a JSON file at start-up. [`DeckConfig::load`] degrades to
//! defaults on any I/O or parse error; [`DeckConfig::load_strict`] reports
//! them instead.

use crate::error::CoreError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Size-bound policy for the result cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionMode {
    /// Drop every entry once the threshold is exceeded
    #[default]
    ClearAll,
    /// Evict least recently used entries one at a time
    Lru,
}

/// Result cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// TTL applied by `set` when the caller gives none
    pub default_ttl_secs: u64,

    /// Entry count above which the size policy kicks in
    pub max_entries: usize,

    pub eviction: EvictionMode,
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
            max_entries: 1000,
            eviction: EvictionMode::ClearAll,
        }
    }
}

/// Store client connection pool options
///
/// Consumed once when the store client is constructed, never mutated after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    #[serde(rename = "maxPoolSize")]
    pub max_pool_size: u32,
    #[serde(rename = "minPoolSize")]
    pub min_pool_size: u32,
    #[serde(rename = "maxIdleTimeMS")]
    pub max_idle_time_ms: u64,
    #[serde(rename = "serverSelectionTimeoutMS")]
    pub server_selection_timeout_ms: u64,
    #[serde(rename = "socketTimeoutMS")]
    pub socket_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_pool_size: 10,
            min_pool_size: 2,
            max_idle_time_ms: 30_000,
            server_selection_timeout_ms: 5_000,
            socket_timeout_ms: 45_000,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_pool_size == 0 {
            return Err(CoreError::InvalidConfig {
                message: "maxPoolSize must be at least 1".to_string(),
            });
        }
        if self.min_pool_size > self.max_pool_size {
            return Err(CoreError::InvalidConfig {
                message: format!(
                    "minPoolSize ({}) exceeds maxPoolSize ({})",
                    self.min_pool_size, self.max_pool_size
                ),
            });
        }
        Ok(())
    }

    pub fn max_idle_time(&self) -> Duration {
        Duration::from_millis(self.max_idle_time_ms)
    }

    pub fn server_selection_timeout(&self) -> Duration {
        Duration::from_millis(self.server_selection_timeout_ms)
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }
}

/// Metrics settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsConfig {
    /// Queries slower than this are logged at warn level
    pub slow_query_ms: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { slow_query_ms: 1000 }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckConfig {
    pub cache: CacheConfig,
    pub pool: PoolConfig,
    pub metrics: MetricsConfig,
}

impl DeckConfig {
    /// Load from `path`, falling back to defaults on any error
    pub fn load(path: &Path) -> Self {
        match Self::load_strict(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Using default configuration");
                Self::default()
            }
        }
    }

    /// Load from `path`, reporting read, parse and validation errors
    pub fn load_strict(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&content).map_err(|source| CoreError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.pool.validate()?;
        debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Persist as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write configuration to {}", path.display()))
    }
}
