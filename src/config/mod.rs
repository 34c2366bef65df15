//! Configuration management for setup-rocq

pub mod schema;

pub use schema::Config;

use crate::error::{SetupError, SetupResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("setup-rocq")
            .join("config.toml")
    }

    /// Directory for run state when no CI state file is provided
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("setup-rocq")
    }

    /// Tool cache root (`RUNNER_TOOL_CACHE` on hosted runners)
    pub fn tool_cache_dir() -> PathBuf {
        std::env::var_os("RUNNER_TOOL_CACHE")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::cache_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("setup-rocq")
                    .join("tools")
            })
    }

    /// Default root of the local cache store
    pub fn cache_store_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("setup-rocq")
            .join("store")
    }

    /// Load configuration, falling back to defaults if the file is absent
    pub async fn load(&self) -> SetupResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> SetupResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| SetupError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| SetupError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.toml");
        let manager = ConfigManager::with_path(path);

        let config = manager.load().await.unwrap();
        assert_eq!(config.rocq.version, "latest");
    }

    #[tokio::test]
    async fn load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[rocq]\nversion = \"8.20.1\"\n").unwrap();

        let config = ConfigManager::with_path(path).load().await.unwrap();
        assert_eq!(config.rocq.version, "8.20.1");
    }

    #[tokio::test]
    async fn malformed_file_is_config_invalid() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[rocq\nversion = ").unwrap();

        let err = ConfigManager::with_path(path.clone()).load().await.unwrap_err();
        match err {
            SetupError::ConfigInvalid { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }
}
