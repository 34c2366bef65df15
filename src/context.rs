//! Run context
//!
//! Built once at process start from the config file, the action inputs and
//! the process environment, then passed by reference into every step. Both the
//! setup and post invocations construct it the same way, which keeps cache
//! keys and cache paths identical between them.

use crate::cache::apt::{APT_ARCHIVES_DIR, APT_LISTS_DIR};
use crate::config::{Config, ConfigManager};
use crate::error::{SetupError, SetupResult};
use crate::platform::{current_arch, Platform};
use crate::rocq::RocqVersion;
use std::path::{Path, PathBuf};

/// Inputs supplied on the command line or through `INPUT_*` variables
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    pub rocq_version: Option<String>,
    pub opam_repositories: Option<String>,
    pub dependency_glob: Option<String>,
    pub no_cache: bool,
}

impl Inputs {
    /// Overlay non-empty inputs on top of the file configuration
    pub fn apply(self, config: &mut Config) {
        if let Some(version) = non_empty(self.rocq_version) {
            config.rocq.version = version;
        }
        if let Some(repos) = non_empty(self.opam_repositories) {
            config.rocq.opam_repositories = Some(repos);
        }
        if let Some(glob) = non_empty(self.dependency_glob) {
            config.cache.dependency_glob = Some(glob);
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Directories the run reads from and writes to
#[derive(Debug, Clone)]
pub struct ContextPaths {
    pub home: PathBuf,
    pub tool_cache_dir: PathBuf,
    pub state_dir: PathBuf,
    pub cache_store_dir: PathBuf,
    /// apt's downloaded packages (root-owned on a runner)
    pub apt_archives_dir: PathBuf,
    /// apt's repository indexes (root-owned on a runner)
    pub apt_lists_dir: PathBuf,
}

impl ContextPaths {
    /// Resolve from the user's home and the runner environment
    pub fn detect(config: &Config) -> SetupResult<Self> {
        let home = dirs::home_dir().ok_or(SetupError::HomeNotFound)?;
        Ok(Self {
            home,
            tool_cache_dir: ConfigManager::tool_cache_dir(),
            state_dir: ConfigManager::state_dir(),
            cache_store_dir: config
                .cache
                .store_dir
                .clone()
                .unwrap_or_else(ConfigManager::cache_store_dir),
            apt_archives_dir: PathBuf::from(APT_ARCHIVES_DIR),
            apt_lists_dir: PathBuf::from(APT_LISTS_DIR),
        })
    }

    /// Everything below a single root directory
    pub fn under(root: &Path) -> Self {
        Self {
            home: root.join("home"),
            tool_cache_dir: root.join("tools"),
            state_dir: root.join("state"),
            cache_store_dir: root.join("store"),
            apt_archives_dir: root.join("apt").join("archives"),
            apt_lists_dir: root.join("apt").join("lists"),
        }
    }
}

/// Resolved, immutable configuration of one run
#[derive(Debug, Clone)]
pub struct Context {
    pub config: Config,
    pub version: RocqVersion,
    pub platform: Platform,
    pub arch: String,
    pub paths: ContextPaths,
    /// Debug logging requested (`RUNNER_DEBUG=1` or `-vv`)
    pub debug: bool,
}

impl Context {
    /// Build a context from already-resolved parts
    pub fn new(
        config: Config,
        platform: Platform,
        arch: impl Into<String>,
        paths: ContextPaths,
        debug: bool,
    ) -> SetupResult<Self> {
        let version = config.rocq.version.parse()?;
        Ok(Self {
            config,
            version,
            platform,
            arch: arch.into(),
            paths,
            debug,
        })
    }

    /// Build the context for the current process
    pub fn resolve(mut config: Config, inputs: Inputs, debug: bool) -> SetupResult<Self> {
        inputs.apply(&mut config);
        let platform = Platform::detect().ensure_supported()?;
        let paths = ContextPaths::detect(&config)?;
        let debug = debug || std::env::var("RUNNER_DEBUG").is_ok_and(|v| v == "1");
        Self::new(config, platform, current_arch(), paths, debug)
    }

    pub fn home(&self) -> &Path {
        &self.paths.home
    }

    /// opam root directory (`OPAMROOT`)
    pub fn opam_root(&self) -> PathBuf {
        self.paths.home.join(".opam")
    }

    /// User-writable mirror of the apt archives and lists
    pub fn apt_mirror_dir(&self) -> PathBuf {
        self.paths.home.join(".apt-cache")
    }

    /// Directory holding the weekly rocq and stdlib clones
    pub fn weekly_dir(&self) -> PathBuf {
        self.paths.home.join("rocq-weekly")
    }

    /// dune shared build cache root (`DUNE_CACHE_ROOT`)
    pub fn dune_cache_dir(&self) -> PathBuf {
        self.paths.home.join(".cache").join("dune")
    }

    /// Wrap a privileged command with sudo when configured
    pub fn privileged<'a>(&self, program: &'a str, args: &[&'a str]) -> (&'a str, Vec<&'a str>) {
        if self.config.system.use_sudo {
            let mut full = Vec::with_capacity(args.len() + 1);
            full.push(program);
            full.extend_from_slice(args);
            ("sudo", full)
        } else {
            (program, args.to_vec())
        }
    }
}
