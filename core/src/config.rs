//! Configuration shared by every front end.
//!
//! Stored as JSON. Every field has a default, so an empty object (or no file at all) is a
//! valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::{OpContext, DEFAULT_CALL_TIMEOUT};
use crate::search::RankingConfig;
use crate::storage::{BlobKeying, DEFAULT_PAGE_SIZE};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub ranking: RankingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Timeout applied to every call to an external store, in milliseconds.
    pub call_timeout_ms: u64,
    pub blob_keying: BlobKeying,
    /// Records fetched per metadata listing page.
    pub page_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            call_timeout_ms: DEFAULT_CALL_TIMEOUT.as_millis() as u64,
            blob_keying: BlobKeying::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Config {
    /// Reads and validates a JSON config file.
    pub async fn load(path: &Path) -> Result<Config, ConfigError> {
        let raw = tokio::fs::read_to_string(path).await?;
        Config::from_json(&raw)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub async fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Config::from_json(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_json(raw: &str) -> Result<Config, ConfigError> {
        let config: Config = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid("storage.call_timeout_ms must be positive".to_string()));
        }
        if self.storage.page_size == 0 {
            return Err(ConfigError::Invalid("storage.page_size must be positive".to_string()));
        }
        self.ranking
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("ranking: {}", e)))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.storage.call_timeout_ms)
    }

    /// A fresh operation context carrying the configured timeout.
    pub fn op_context(&self) -> OpContext {
        OpContext::new(self.call_timeout())
    }
}
