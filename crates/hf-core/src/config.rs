//! Engine configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Default ceiling of queries run at once by a batch
pub const DEFAULT_MAX_CONCURRENT_QUERIES: usize = 10;

/// Default cap on series per query
pub const DEFAULT_SERIES_LIMIT: usize = 1000;

/// Errors raised while loading configuration
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Settings shared by every query the engine runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Queries of a batch (and event side queries) in flight at once
    pub max_concurrent_queries: usize,

    /// Series limit applied when a query does not carry its own
    pub series_limit: usize,

    /// Log filter directive used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_queries: DEFAULT_MAX_CONCURRENT_QUERIES,
            series_limit: DEFAULT_SERIES_LIMIT,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file; missing keys take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let mut config: EngineConfig = serde_json::from_str(text)?;
        config.max_concurrent_queries = config.max_concurrent_queries.max(1);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrent_queries, 10);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_partial_json() {
        let config = EngineConfig::from_json(r#"{"series_limit": 25, "max_concurrent_queries": 0}"#).unwrap();
        assert_eq!(config.series_limit, 25);
        assert_eq!(config.max_concurrent_queries, 1);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            EngineConfig::from_json("{"),
            Err(ConfigError::Parse(_))
        ));
    }
}
