//! Structured-store configuration

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Structured-store configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SqlStoreConfig {
    /// Directory holding one database file per account.
    ///
    /// `None` opens private in-memory databases.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// SQLite busy timeout in milliseconds
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for SqlStoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl SqlStoreConfig {
    /// Configuration for on-disk databases under `dir`
    pub fn on_disk(dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: Some(dir.as_ref().to_path_buf()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SqlStoreConfig::default();
        assert!(config.data_dir.is_none());
        assert_eq!(config.busy_timeout_ms, 5_000);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: SqlStoreConfig = serde_json::from_str(r#"{"data_dir": "/var/kestrel"}"#).unwrap();
        assert_eq!(config.data_dir, Some(PathBuf::from("/var/kestrel")));
        assert_eq!(config.busy_timeout_ms, 5_000);

        let config: SqlStoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SqlStoreConfig::default());
    }
}
