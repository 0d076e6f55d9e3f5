//! Resolver configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Retry with the fallback pass when the optimistic pass is rejected.
    /// When off, that rejection is reported as a fatal error.
    pub fallback: bool,
    /// Send a constraint-graph snapshot to the trace sink after each
    /// optimistic stage
    pub dump_graph: bool,
}

impl ResolverConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fallback: true,
            dump_graph: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ResolverConfig::default();
        assert!(config.fallback);
        assert!(!config.dump_graph);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: ResolverConfig = serde_json::from_str(r#"{"dump_graph": true}"#).unwrap();
        assert!(config.fallback);
        assert!(config.dump_graph);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"fallback": false}}"#).unwrap();
        let config = ResolverConfig::from_file(file.path()).unwrap();
        assert!(!config.fallback);

        let mut broken = tempfile::NamedTempFile::new().unwrap();
        write!(broken, "fallback = false").unwrap();
        assert!(matches!(
            ResolverConfig::from_file(broken.path()),
            Err(ConfigError::Json(_))
        ));
    }
}
