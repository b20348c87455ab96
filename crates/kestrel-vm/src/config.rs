//! Engine configuration

use crate::error::{VmError, VmResult};
use kestrel_sqlstore::SqlStoreConfig;
use serde::Deserialize;
use std::path::Path;

/// Engine configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum nesting of call and delegate-call, root invocation included
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,
    /// Structured-store settings
    #[serde(default)]
    pub sql: SqlStoreConfig,
}

fn default_max_call_depth() -> usize {
    64
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_call_depth: default_max_call_depth(),
            sql: SqlStoreConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse configuration from JSON
    pub fn from_json_str(json: &str) -> VmResult<Self> {
        serde_json::from_str(json).map_err(|e| VmError::Config(e.to_string()))
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> VmResult<Self> {
        tracing::info!("Loading engine config from {:?}", path);
        let content = std::fs::read_to_string(path)
            .map_err(|e| VmError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&content)
    }
}
