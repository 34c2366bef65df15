//! Configuration schema for setup-rocq
//!
//! An optional TOML file supplies defaults; action inputs (CLI flags or
//! `INPUT_*` variables) take precedence over it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// What to install
    pub rocq: RocqConfig,

    /// Cache settings
    pub cache: CacheConfig,

    /// OS prerequisite packages
    pub system: SystemConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Rocq selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocqConfig {
    /// Exact version, or one of "latest", "dev", "weekly"
    pub version: String,

    /// Extra opam repositories as a YAML mapping of name to URL
    pub opam_repositories: Option<String>,
}

impl Default for RocqConfig {
    fn default() -> Self {
        Self {
            version: "latest".to_string(),
            opam_repositories: None,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the install cache (default: true)
    pub enabled: bool,

    /// Root of the local cache store (defaults to the user cache dir)
    pub store_dir: Option<PathBuf>,

    /// Glob of dependency manifests hashed into the cache key
    pub dependency_glob: Option<String>,

    /// Size the dune cache is trimmed to before saving
    pub dune_cache_size: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            store_dir: None,
            dependency_glob: None,
            dune_cache_size: "5GB".to_string(),
        }
    }
}

/// OS package prerequisites
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Prefix privileged commands with sudo
    pub use_sudo: bool,

    /// apt packages installed on Linux
    pub linux_packages: Vec<String>,

    /// Homebrew packages installed on macOS
    pub macos_packages: Vec<String>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            use_sudo: true,
            // bubblewrap is not needed: opam is initialised with sandboxing disabled
            linux_packages: vec![
                "rsync".to_string(),
                "libgmp-dev".to_string(),
                "sqlite3".to_string(),
            ],
            macos_packages: vec!["darcs".to_string(), "mercurial".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[rocq]"));
        assert!(toml.contains("[cache]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.rocq.version, "latest");
        assert!(config.cache.enabled);
        assert!(config.system.use_sudo);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [rocq]
            version = "weekly"

            [cache]
            dependency_glob = "*.opam"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.rocq.version, "weekly");
        assert_eq!(config.cache.dependency_glob.as_deref(), Some("*.opam"));
        assert_eq!(config.cache.dune_cache_size, "5GB"); // default preserved
        assert_eq!(config.system.linux_packages.len(), 3);
    }
}
