//! Application configuration from file and environment variables
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Environment variables (prefixed with DRIFTWOOD_)
//! 2. Config file (driftwood.toml)
//! 3. Default values
//!
//! Secrets like the database URL belong in environment variables, not in the
//! config file.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::engine::EngineLimits;

/// Database connectivity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/driftwood".to_string(),
        }
    }
}

/// Cache tier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false the engine runs every read against the source.
    pub enabled: bool,
    pub redis_url: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redis_url: "redis://127.0.0.1/".to_string(),
        }
    }
}

/// Engine tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub default_page_size: u64,
    pub max_page_size: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

impl EngineConfig {
    pub fn limits(&self) -> EngineLimits {
        EngineLimits {
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Load from `driftwood.toml` (optional) and `DRIFTWOOD_*` environment
    /// variables, with `__` separating nesting levels
    /// (e.g. `DRIFTWOOD_DATABASE__URL`).
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Config::builder()
            .add_source(File::with_name("driftwood").required(false))
            .add_source(Environment::with_prefix("DRIFTWOOD").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Load from an explicit file path only; used by tests.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert!(config.cache.enabled);
        assert_eq!(config.engine.max_page_size, 100);
        assert_eq!(config.engine.limits().default_page_size, 20);
    }

    #[test]
    fn loads_partial_config_file_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("driftwood.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[cache]
enabled = false

[engine]
max_page_size = 50
"#
        )
        .unwrap();

        let config = AppConfig::load_from_file(&path).unwrap();
        assert!(!config.cache.enabled);
        assert_eq!(config.engine.max_page_size, 50);
        // Untouched sections keep their defaults.
        assert_eq!(config.engine.default_page_size, 20);
        assert_eq!(config.database.url, "postgres://localhost/driftwood");
    }
}
