//! Engine configuration.
//!
//! Supports TOML-based configuration with serde defaults; every limit can be
//! overridden per deployment.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TabulonError};

/// Limits applied by the query services.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum rows returned by a single grouped-aggregation query.
    /// Caps group explosion on high-cardinality group columns.
    pub max_group_points: usize,
    /// Maximum `take` accepted by the search-index resolver.
    pub max_search_take: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_group_points: 5000,
            max_search_take: 1000,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| TabulonError::Validation(format!("invalid engine config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_keys() {
        let config: EngineConfig = toml::from_str("max_search_take = 200").unwrap();
        assert_eq!(config.max_search_take, 200);
        assert_eq!(config.max_group_points, EngineConfig::default().max_group_points);
    }
}
