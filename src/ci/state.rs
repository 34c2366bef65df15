//! Run state shared between the setup and post invocations
//!
//! The two invocations are separate processes, so the only channel between
//! them is this small key-value contract.

use crate::ci::{append, heredoc_entry};
use crate::context::Context;
use crate::error::{SetupError, SetupResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Slot holding the key the cache was restored under (and will be saved as)
pub const CACHE_PRIMARY_KEY: &str = "CACHE_PRIMARY_KEY";

/// Slot holding the key that actually matched on restore
pub const CACHE_MATCHED_KEY: &str = "CACHE_MATCHED_KEY";

/// Cross-invocation key-value store
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Record a value for the post invocation
    async fn set(&self, name: &str, value: &str) -> SetupResult<()>;

    /// Read a value recorded by the setup invocation; empty values read as `None`
    async fn get(&self, name: &str) -> SetupResult<Option<String>>;

    /// Forget values left over from an earlier run
    async fn clear(&self) -> SetupResult<()> {
        Ok(())
    }
}

/// State carried by the Actions runner (`GITHUB_STATE` in, `STATE_*` out)
pub struct ActionsState {
    state_file: PathBuf,
}

impl ActionsState {
    pub fn new(state_file: PathBuf) -> Self {
        Self { state_file }
    }
}

#[async_trait]
impl StateStore for ActionsState {
    async fn set(&self, name: &str, value: &str) -> SetupResult<()> {
        append(&self.state_file, &heredoc_entry(name, value)).await
    }

    async fn get(&self, name: &str) -> SetupResult<Option<String>> {
        Ok(std::env::var(format!("STATE_{}", name))
            .ok()
            .filter(|v| !v.is_empty()))
    }
}

/// State persisted as a JSON map on disk (local runs)
pub struct FileState {
    path: PathBuf,
}

impl FileState {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// State file inside the given directory
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join("run-state.json"))
    }

    async fn load(&self) -> SetupResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path).await.map_err(|e| {
            SetupError::io(format!("reading state file {}", self.path.display()), e)
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[async_trait]
impl StateStore for FileState {
    async fn set(&self, name: &str, value: &str) -> SetupResult<()> {
        let mut state = self.load().await?;
        state.insert(name.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SetupError::io("creating state directory", e))?;
        }

        let content = serde_json::to_string_pretty(&state)?;
        fs::write(&self.path, content)
            .await
            .map_err(|e| SetupError::StatePersist(format!("{}: {}", self.path.display(), e)))
    }

    async fn get(&self, name: &str) -> SetupResult<Option<String>> {
        Ok(self
            .load()
            .await?
            .remove(name)
            .filter(|v| !v.is_empty()))
    }

    async fn clear(&self) -> SetupResult<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).await.map_err(|e| {
                SetupError::io(format!("deleting state file {}", self.path.display()), e)
            })?;
        }
        Ok(())
    }
}

/// Pick the runner-provided state channel, or a file under the state dir
pub fn state_store(ctx: &Context) -> Box<dyn StateStore> {
    match std::env::var_os("GITHUB_STATE").filter(|v| !v.is_empty()) {
        Some(file) => Box::new(ActionsState::new(PathBuf::from(file))),
        None => Box::new(FileState::in_dir(&ctx.paths.state_dir)),
    }
}
