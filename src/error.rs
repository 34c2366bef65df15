//! Error types for setup-rocq
//!
//! All modules use `SetupResult<T>` as their return type. Cache and mirroring
//! code paths that must never fail the job route their errors through
//! [`NonFatal`] instead of propagating them.

use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

/// Result type alias for setup-rocq operations
pub type SetupResult<T> = Result<T, SetupError>;

/// All errors that can occur while setting up Rocq
#[derive(Error, Debug)]
pub enum SetupError {
    // Environment errors
    #[error("Unsupported platform: {0}. setup-rocq supports Linux, macOS and Windows.")]
    UnsupportedPlatform(String),

    #[error("No opam release is published for {platform}/{arch}")]
    UnsupportedArch { platform: String, arch: String },

    #[error("Could not determine the home directory")]
    HomeNotFound,

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Invalid rocq-version: {0}")]
    InvalidVersion(String),

    #[error("Invalid glob pattern {pattern}: {reason}")]
    Glob { pattern: String, reason: String },

    // Toolchain acquisition errors
    #[error("Failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("Failed to extract {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    // State errors
    #[error("Failed to persist run state: {0}")]
    StatePersist(String),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command `{command}` exited with {}", exit_label(.code))]
    CommandStatus { command: String, code: Option<i32> },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "a signal".to_string(),
    }
}

impl SetupError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error (process could not be spawned)
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create an error for a process that ran but exited unsuccessfully
    pub fn command_status(command: impl Into<String>, code: Option<i32>) -> Self {
        Self::CommandStatus {
            command: command.into(),
            code,
        }
    }

    /// Exit code of a failed external command, if this is one
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::CommandStatus { code, .. } => *code,
            _ => None,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::UnsupportedArch { .. } => {
                Some("Use an x86_64 or arm64 runner, or preinstall opam on PATH")
            }
            Self::InvalidVersion(_) => {
                Some("Use an exact version such as 9.0.0, or one of: latest, dev, weekly")
            }
            Self::HomeNotFound => Some("Set the HOME environment variable"),
            _ => None,
        }
    }
}

/// Swallow-and-warn policy for best-effort operations.
///
/// Cache restore/save and the apt mirroring steps are a performance
/// optimization only. Their failures are reported as warnings and the run
/// continues as if the step had not happened.
pub trait NonFatal<T> {
    /// Log the error as a warning and turn it into `None`
    fn non_fatal(self, what: &str) -> Option<T>;
}

impl<T, E: std::fmt::Display> NonFatal<T> for Result<T, E> {
    fn non_fatal(self, what: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Failed to {}: {}", what, e);
                None
            }
        }
    }
}
