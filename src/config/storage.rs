//! Storage configuration types.

use serde::Deserialize;

use super::ConfigError;

/// Storage type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Sqlite,
    Memory,
}

/// Storage configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// SQLite-specific configuration.
    pub sqlite: SqliteConfig,
}

impl StorageConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_type == StorageType::Sqlite {
            if self.sqlite.path.is_empty() {
                return Err(ConfigError::Missing("storage.sqlite.path"));
            }
            if self.sqlite.max_connections == 0 {
                return Err(ConfigError::Invalid {
                    key: "storage.sqlite.max_connections",
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// SQLite-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file path.
    pub path: String,
    /// Pool size.
    pub max_connections: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: "data/ledger.db".to_string(),
            max_connections: 5,
        }
    }
}
