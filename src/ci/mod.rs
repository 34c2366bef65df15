//! CI platform surface
//!
//! Environment export, PATH registration, log grouping and failure reporting
//! through the GitHub Actions file commands. Outside of a runner the same
//! calls still update this process and fall back to plain log lines.

pub mod state;

pub use state::{state_store, ActionsState, FileState, StateStore};

use console::style;
use crate::error::{SetupError, SetupResult};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Handle on the CI runner's command files
#[derive(Debug, Clone, Default)]
pub struct CiEnv {
    env_file: Option<PathBuf>,
    path_file: Option<PathBuf>,
    annotations: bool,
}

impl CiEnv {
    /// Detect the runner's command files from the environment
    pub fn detect() -> Self {
        Self {
            env_file: file_from_env("GITHUB_ENV"),
            path_file: file_from_env("GITHUB_PATH"),
            annotations: std::env::var("GITHUB_ACTIONS").is_ok_and(|v| v == "true"),
        }
    }

    /// Use explicit command files (no workflow annotations)
    pub fn with_files(env_file: Option<PathBuf>, path_file: Option<PathBuf>) -> Self {
        Self {
            env_file,
            path_file,
            annotations: false,
        }
    }

    /// Export a variable to this process and to later job steps
    pub async fn export_variable(&self, name: &str, value: impl ToString) -> SetupResult<()> {
        let value = value.to_string();
        std::env::set_var(name, &value);

        if let Some(file) = &self.env_file {
            append(file, &heredoc_entry(name, &value)).await?;
        }
        Ok(())
    }

    /// Prepend a directory to PATH for this process and later job steps
    pub async fn add_path(&self, dir: &Path) -> SetupResult<()> {
        let current = std::env::var_os("PATH").unwrap_or_default();
        let mut paths = vec![dir.to_path_buf()];
        paths.extend(std::env::split_paths(&current));
        let joined: OsString = std::env::join_paths(paths)
            .map_err(|e| SetupError::Internal(format!("invalid PATH entry {}: {}", dir.display(), e)))?;
        std::env::set_var("PATH", joined);

        if let Some(file) = &self.path_file {
            append(file, &format!("{}\n", dir.display())).await?;
        }
        Ok(())
    }

    /// Open a collapsible log group, closed when the guard drops
    pub fn group(&self, title: &str) -> Group {
        if self.annotations {
            println!("::group::{}", title);
        } else {
            info!("== {}", title);
        }
        Group {
            annotations: self.annotations,
        }
    }

    /// Report a warning annotation
    pub fn warning(&self, message: &str) {
        if self.annotations {
            println!("::warning::{}", escape_data(message));
        } else {
            warn!("{}", message);
        }
    }

    /// Mark the job as failed with `message`
    pub fn set_failed(&self, message: &str) {
        if self.annotations {
            println!("::error::{}", escape_data(message));
        } else {
            eprintln!("{} {}", style("Error:").red().bold(), message);
        }
    }
}

/// Log group guard returned by [`CiEnv::group`]
#[must_use = "the group closes when this guard is dropped"]
pub struct Group {
    annotations: bool,
}

impl Drop for Group {
    fn drop(&mut self) {
        if self.annotations {
            println!("::endgroup::");
        }
    }
}

fn file_from_env(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// `NAME<<delim` entry understood by the runner's env and state files
pub(crate) fn heredoc_entry(name: &str, value: &str) -> String {
    let delimiter = format!("ghadelimiter_{}", uuid::Uuid::new_v4());
    format!("{}<<{}\n{}\n{}\n", name, delimiter, value, delimiter)
}

/// Workflow command data escaping
fn escape_data(message: &str) -> String {
    message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

pub(crate) async fn append(file: &Path, content: &str) -> SetupResult<()> {
    let mut handle = OpenOptions::new()
        .create(true)
        .append(true)
        .open(file)
        .await
        .map_err(|e| SetupError::io(format!("opening {}", file.display()), e))?;

    handle
        .write_all(content.as_bytes())
        .await
        .map_err(|e| SetupError::io(format!("writing {}", file.display()), e))?;
    handle
        .flush()
        .await
        .map_err(|e| SetupError::io(format!("flushing {}", file.display()), e))?;
    Ok(())
}
