use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::store::transaction::IsolationLevel;

/// Comprehensive error types for configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO-related errors (file access, permissions, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Configuration validation errors
    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Configuration for a FormStore instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path where the store will keep its data
    pub storage_path: PathBuf,
    /// Use a throwaway database that is removed when the store is dropped
    #[serde(default)]
    pub temporary: bool,
    /// Flush to disk after every write. Durable but slower; tests may turn
    /// this off.
    #[serde(default = "default_flush_on_write")]
    pub flush_on_write: bool,
    /// Defaults applied to transactions opened without explicit options
    #[serde(default)]
    pub transaction: TransactionDefaults,
}

/// Default bounds for interactive transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionDefaults {
    /// Maximum time to wait for the store write lock, in milliseconds
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
    /// Maximum lifetime of an interactive transaction, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Isolation level requested from the engine
    #[serde(default)]
    pub isolation: IsolationLevel,
}

fn default_flush_on_write() -> bool {
    true
}

fn default_max_wait_ms() -> u64 {
    2_000
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl Default for TransactionDefaults {
    fn default() -> Self {
        Self {
            max_wait_ms: default_max_wait_ms(),
            timeout_ms: default_timeout_ms(),
            isolation: IsolationLevel::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("data/formstore"),
            temporary: false,
            flush_on_write: default_flush_on_write(),
            transaction: TransactionDefaults::default(),
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with the specified storage path
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
            ..Default::default()
        }
    }

    /// Create a throwaway configuration backed by a temporary database
    pub fn temporary() -> Self {
        Self {
            temporary: true,
            ..Default::default()
        }
    }

    /// Set whether every write is flushed to disk
    pub fn with_flush_on_write(mut self, flush_on_write: bool) -> Self {
        self.flush_on_write = flush_on_write;
        self
    }

    /// Override the transaction defaults
    pub fn with_transaction_defaults(mut self, defaults: TransactionDefaults) -> Self {
        self.transaction = defaults;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.temporary && self.storage_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "storage_path must be set for a persistent store".to_string(),
            ));
        }
        if self.transaction.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "transaction timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads a store configuration from a TOML file.
pub fn load_store_config(path: &Path) -> Result<StoreConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let config: StoreConfig = toml::from_str(&raw)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert!(!config.temporary);
        assert!(config.flush_on_write);
        assert_eq!(config.transaction.max_wait_ms, 2_000);
        assert_eq!(config.transaction.timeout_ms, 5_000);
        assert_eq!(config.transaction.isolation, IsolationLevel::Serializable);
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.toml");
        std::fs::write(
            &path,
            r#"
storage_path = "/tmp/formstore-test"
flush_on_write = false

[transaction]
timeout_ms = 250
isolation = "read_committed"
"#,
        )
        .unwrap();

        let config = load_store_config(&path).unwrap();
        assert_eq!(config.storage_path, PathBuf::from("/tmp/formstore-test"));
        assert!(!config.flush_on_write);
        assert_eq!(config.transaction.timeout_ms, 250);
        assert_eq!(config.transaction.max_wait_ms, 2_000);
        assert_eq!(config.transaction.isolation, IsolationLevel::ReadCommitted);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = StoreConfig::temporary();
        config.transaction.timeout_ms = 0;
        assert!(config.validate().is_err());
    }
}
