//! Cache storage backends
//!
//! [`CacheStore`] is the seam to whatever actually holds cache entries. The
//! shipped [`LocalCacheStore`] keeps entries as directories on disk:
//!
//! ```text
//! <root>/<key>/entry.json   key, creation time, saved path list
//! <root>/<key>/data/<n>/    copy of the n-th cached path
//! ```
//!
//! Entries are written under a temporary name and renamed into place, so a
//! reader never sees half an entry.

use crate::error::SetupError;
use crate::fsutil::{copy_tree_sync, CopyPolicy};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const MANIFEST_FILE: &str = "entry.json";
const DATA_DIR: &str = "data";
const TEMP_PREFIX: &str = ".tmp-";
const KEY_DIGEST_LEN: usize = 12;

/// Store-level failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another job already saved this key
    #[error("Cache entry {0} already exists")]
    AlreadyExists(String),

    #[error("{0}")]
    Failed(String),
}

impl From<SetupError> for StoreError {
    fn from(e: SetupError) -> Self {
        StoreError::Failed(e.to_string())
    }
}

/// Remote key-value blob cache
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Whether the store can be used at all in this environment
    async fn is_available(&self) -> bool;

    /// Restore the entry for `primary`, or the newest one matching the first
    /// prefix that has any. Returns the key that matched.
    async fn restore(
        &self,
        paths: &[PathBuf],
        primary: &str,
        prefixes: &[String],
    ) -> Result<Option<String>, StoreError>;

    /// Upload `paths` under `key`
    async fn save(&self, paths: &[PathBuf], key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryManifest {
    key: String,
    created_at: DateTime<Utc>,
    paths: Vec<PathBuf>,
}

/// Directory-backed cache store
#[derive(Debug, Clone)]
pub struct LocalCacheStore {
    root: PathBuf,
}

impl LocalCacheStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of an entry. Keys with characters a file name cannot
    /// carry get a digest suffix, so `a/b` and `a_b` stay apart.
    fn entry_dir(&self, key: &str) -> PathBuf {
        let is_safe =
            |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '+');
        if key.chars().all(is_safe) {
            return self.root.join(key);
        }

        let name: String = key
            .chars()
            .map(|c| if is_safe(c) { c } else { '_' })
            .collect();
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.root.join(format!("{}-{}", name, &digest[..KEY_DIGEST_LEN]))
    }

    fn read_manifest(dir: &Path) -> Option<EntryManifest> {
        let content = fs::read_to_string(dir.join(MANIFEST_FILE)).ok()?;
        match serde_json::from_str(&content) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                debug!("Ignoring unreadable cache entry {}: {}", dir.display(), e);
                None
            }
        }
    }

    /// Complete entries saved for exactly this path set
    fn entries(&self, paths: &[PathBuf]) -> Vec<(PathBuf, EntryManifest)> {
        let Ok(read_dir) = fs::read_dir(&self.root) else {
            return Vec::new();
        };

        read_dir
            .filter_map(Result::ok)
            .filter(|entry| !entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX))
            .filter_map(|entry| {
                let dir = entry.path();
                Self::read_manifest(&dir).map(|manifest| (dir, manifest))
            })
            .filter(|(_, manifest)| manifest.paths == paths)
            .collect()
    }

    fn find(
        &self,
        paths: &[PathBuf],
        primary: &str,
        prefixes: &[String],
    ) -> Option<(PathBuf, EntryManifest)> {
        let entries = self.entries(paths);

        if let Some(exact) = entries.iter().find(|(_, m)| m.key == primary) {
            return Some(exact.clone());
        }

        prefixes.iter().find_map(|prefix| {
            entries
                .iter()
                .filter(|(_, m)| m.key.starts_with(prefix.as_str()))
                .max_by_key(|(_, m)| m.created_at)
                .cloned()
        })
    }

    fn restore_blocking(
        &self,
        paths: &[PathBuf],
        primary: &str,
        prefixes: &[String],
    ) -> Result<Option<String>, StoreError> {
        let Some((dir, manifest)) = self.find(paths, primary, prefixes) else {
            return Ok(None);
        };

        debug!("Restoring cache entry {} from {}", manifest.key, dir.display());
        for (index, target) in paths.iter().enumerate() {
            let source = dir.join(DATA_DIR).join(index.to_string());
            if source.is_dir() {
                copy_tree_sync(&source, target, &[], CopyPolicy::Strict)?;
            }
        }
        Ok(Some(manifest.key))
    }

    fn save_blocking(&self, paths: &[PathBuf], key: &str) -> Result<(), StoreError> {
        let final_dir = self.entry_dir(key);
        if final_dir.join(MANIFEST_FILE).exists() {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }

        let staging = self
            .root
            .join(format!("{}{}", TEMP_PREFIX, uuid::Uuid::new_v4()));
        let result = self.stage(&staging, paths, key).and_then(|()| {
            if final_dir.exists() {
                // leftover without a manifest is not an entry
                fs::remove_dir_all(&final_dir)
                    .map_err(|e| failed(format!("clearing {}: {}", final_dir.display(), e)))?;
            }
            fs::rename(&staging, &final_dir).map_err(|e| {
                if final_dir.join(MANIFEST_FILE).exists() {
                    StoreError::AlreadyExists(key.to_string())
                } else {
                    failed(format!("committing {}: {}", final_dir.display(), e))
                }
            })
        });

        if result.is_err() && staging.exists() {
            if let Err(e) = fs::remove_dir_all(&staging) {
                debug!("Failed to remove {}: {}", staging.display(), e);
            }
        }
        result
    }

    fn stage(&self, staging: &Path, paths: &[PathBuf], key: &str) -> Result<(), StoreError> {
        let data = staging.join(DATA_DIR);
        fs::create_dir_all(&data)
            .map_err(|e| failed(format!("creating {}: {}", data.display(), e)))?;

        for (index, source) in paths.iter().enumerate() {
            if source.is_dir() {
                copy_tree_sync(source, &data.join(index.to_string()), &[], CopyPolicy::Strict)?;
            } else {
                debug!("Cache path {} does not exist, skipping", source.display());
            }
        }

        let manifest = EntryManifest {
            key: key.to_string(),
            created_at: Utc::now(),
            paths: paths.to_vec(),
        };
        let content =
            serde_json::to_string_pretty(&manifest).map_err(|e| failed(e.to_string()))?;
        fs::write(staging.join(MANIFEST_FILE), content)
            .map_err(|e| failed(format!("writing manifest: {}", e)))
    }
}

fn failed(reason: String) -> StoreError {
    StoreError::Failed(reason)
}

#[async_trait]
impl CacheStore for LocalCacheStore {
    async fn is_available(&self) -> bool {
        match tokio::fs::create_dir_all(&self.root).await {
            Ok(()) => true,
            Err(e) => {
                debug!("Cache store {} unavailable: {}", self.root.display(), e);
                false
            }
        }
    }

    async fn restore(
        &self,
        paths: &[PathBuf],
        primary: &str,
        prefixes: &[String],
    ) -> Result<Option<String>, StoreError> {
        let store = self.clone();
        let paths = paths.to_vec();
        let primary = primary.to_string();
        let prefixes = prefixes.to_vec();

        tokio::task::spawn_blocking(move || store.restore_blocking(&paths, &primary, &prefixes))
            .await
            .map_err(|e| failed(format!("restore task failed: {}", e)))?
    }

    async fn save(&self, paths: &[PathBuf], key: &str) -> Result<(), StoreError> {
        let store = self.clone();
        let paths = paths.to_vec();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || store.save_blocking(&paths, &key))
            .await
            .map_err(|e| failed(format!("save task failed: {}", e)))?
    }
}
