//! Planner switches.
//!
//! Every switch defaults to on. Turning a strategy off removes its generator from
//! the enumeration entirely, except that FULL joins still get merge and hash
//! paths: they have no other way to be executed.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinSearchConfig {
    pub enable_mergejoin: bool,
    pub enable_hashjoin: bool,
    /// Consider materializing the inner side of nested loops and merge joins.
    pub enable_material: bool,
    /// Try planning an inner join once per child of an append outer relation.
    pub enable_append_pushdown: bool,
}

impl Default for JoinSearchConfig {
    fn default() -> Self {
        Self {
            enable_mergejoin: true,
            enable_hashjoin: true,
            enable_material: true,
            enable_append_pushdown: true,
        }
    }
}

impl JoinSearchConfig {
    /// Parse a JSON object. Missing fields keep their defaults.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid join search config: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_default_to_enabled() {
        let config = JoinSearchConfig::from_json_str(r#"{ "enable_hashjoin": false }"#)
            .expect("valid config");
        assert!(!config.enable_hashjoin);
        assert!(config.enable_mergejoin && config.enable_material && config.enable_append_pushdown);
    }

    #[test]
    fn test_rejects_wrong_types() {
        let err = JoinSearchConfig::from_json_str(r#"{ "enable_material": "no" }"#);
        assert!(matches!(err, Err(ConfigError::Json(_))));
    }
}
