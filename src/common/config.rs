//! Configuration loading
//!
//! Reads an [`EngineConfig`] from TOML, applies `HASHGAME_*` environment
//! overrides and validates the result.

use crate::config::{EngineConfig, StorageBackend};
use crate::errors::{ConfigurationError, HashGameResult};
use std::env;
use std::path::Path;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> HashGameResult<EngineConfig> {
        let mut config = if let Some(ref path) = self.config_path {
            self.load_from_file(path)?
        } else {
            EngineConfig::default()
        };

        self.apply_env_overrides(&mut config)?;

        config
            .validate()
            .map_err(|e| ConfigurationError::ValidationFailed(e.to_string()))?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> HashGameResult<EngineConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    fn apply_env_overrides(&self, config: &mut EngineConfig) -> HashGameResult<()> {
        if let Ok(endpoints) = env::var("HASHGAME_ORACLE_ENDPOINTS") {
            config.oracle.endpoints = endpoints
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(rps) = env::var("HASHGAME_ORACLE_RPS") {
            config.oracle.requests_per_second = parse_env("HASHGAME_ORACLE_RPS", rps, "Invalid request rate")?;
        }
        if let Ok(interval) = env::var("HASHGAME_ROUND_INTERVAL") {
            config.rooms.round_interval = parse_env("HASHGAME_ROUND_INTERVAL", interval, "Invalid round interval")?;
        }
        if let Ok(block_time) = env::var("HASHGAME_BLOCK_TIME_MS") {
            config.rooms.block_time_ms = parse_env("HASHGAME_BLOCK_TIME_MS", block_time, "Invalid block time")?;
        }
        if let Ok(data_dir) = env::var("HASHGAME_DATA_DIR") {
            config.storage.data_directory = data_dir;
        }
        if let Ok(backend) = env::var("HASHGAME_STORAGE_BACKEND") {
            config.storage.backend = match backend.to_ascii_lowercase().as_str() {
                "memory" => StorageBackend::Memory,
                "rocksdb" => StorageBackend::RocksDb,
                _ => {
                    return Err(ConfigurationError::InvalidValue {
                        field: "HASHGAME_STORAGE_BACKEND".to_string(),
                        value: backend,
                        reason: "Expected 'memory' or 'rocksdb'".to_string(),
                    }
                    .into())
                }
            };
        }
        if let Ok(filter) = env::var("HASHGAME_LOG") {
            config.monitoring.log_filter = Some(filter);
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, config: &EngineConfig, path: &str) -> HashGameResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_env<T: std::str::FromStr>(field: &str, value: String, reason: &str) -> HashGameResult<T> {
    value.parse().map_err(|_| {
        ConfigurationError::InvalidValue {
            field: field.to_string(),
            value,
            reason: reason.to_string(),
        }
        .into()
    })
}

/// Generate a sample configuration file
pub fn generate_sample_config(path: &str) -> HashGameResult<()> {
    ConfigLoader::new().save(&EngineConfig::default(), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_save_and_load_config() -> HashGameResult<()> {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let mut original = EngineConfig::default();
        original.rooms.round_interval = 40;
        original.oracle.endpoints = vec!["http://a".to_string(), "http://b".to_string()];

        let loader = ConfigLoader::new();
        loader.save(&original, path)?;

        let loaded = ConfigLoader::new().with_path(path).load()?;

        assert_eq!(loaded.rooms.round_interval, 40);
        assert_eq!(loaded.oracle.endpoints.len(), 2);
        assert_eq!(loaded.rooms.tiers, original.rooms.tiers);

        Ok(())
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "this is = = not toml").unwrap();

        let result = ConfigLoader::new().with_path(temp_file.path()).load();
        assert!(result.is_err());
    }

    #[test]
    fn test_generate_sample_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        generate_sample_config(path).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("round_interval"));
    }
}
