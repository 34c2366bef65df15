//! Cache key derivation
//!
//! Keys are content-addressed: every axis that changes what ends up in the
//! cached directories (platform, architecture, Rocq version, the week for
//! weekly builds, tracked dependency files) is part of the key, so a changed
//! input is a new key rather than a stale hit.

use crate::context::Context;
use crate::error::{SetupError, SetupResult};
use crate::platform::Platform;
use crate::rocq::{cutoff_date, RocqVersion};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Namespace shared by every key this tool writes
pub const KEY_NAMESPACE: &str = "setup-rocq";

/// Cache format version; bump when the path set or key shape changes
pub const CACHE_VERSION: &str = "v3";

/// Hex characters of the dependency hash kept in the key
const HASH_LEN: usize = 16;

/// Primary key plus the fallbacks tried when it misses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub primary: String,
    /// Most specific first
    pub restore_prefixes: Vec<String>,
}

/// `setup-rocq-<version>-<platform>-<arch>`, the least specific prefix
pub fn platform_prefix(platform: Platform, arch: &str) -> String {
    format!("{}-{}-{}-{}", KEY_NAMESPACE, CACHE_VERSION, platform.key_name(), arch)
}

/// Build the key for one run.
///
/// Pure in its arguments: the setup and post invocations of the same week
/// with the same dependency files produce the same key.
pub fn compute_cache_key(
    version: &RocqVersion,
    platform: Platform,
    arch: &str,
    dependency_hash: Option<&str>,
    now: DateTime<Utc>,
) -> CacheKey {
    let prefix = platform_prefix(platform, arch);
    let versioned = format!("{}-rocq-{}", prefix, version);

    let mut base = versioned.clone();
    if version.is_weekly() {
        base = format!("{}-{}", base, cutoff_date(now));
    }

    let primary = match dependency_hash {
        Some(hash) => format!("{}-{}", base, hash),
        None => base.clone(),
    };

    let mut candidates = Vec::with_capacity(3);
    if dependency_hash.is_some() {
        candidates.push(format!("{}-", base));
    }
    candidates.push(format!("{}-", versioned));
    candidates.push(format!("{}-", prefix));

    let mut restore_prefixes: Vec<String> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !restore_prefixes.contains(&candidate) {
            restore_prefixes.push(candidate);
        }
    }

    CacheKey {
        primary,
        restore_prefixes,
    }
}

/// Hash of every file matching `pattern`, or `None` when nothing matches
pub fn hash_dependency_files(pattern: &str) -> SetupResult<Option<String>> {
    let glob_error = |reason: String| SetupError::Glob {
        pattern: pattern.to_string(),
        reason,
    };

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in glob::glob(pattern).map_err(|e| glob_error(e.to_string()))? {
        let path = entry.map_err(|e| glob_error(e.to_string()))?;
        if path.is_file() {
            files.push(path);
        }
    }

    if files.is_empty() {
        debug!("No files match {}", pattern);
        return Ok(None);
    }

    files.sort();
    debug!("Hashing {} dependency files", files.len());
    hash_files(&files).map(Some)
}

/// SHA-256 over each path and its contents, truncated to [`HASH_LEN`]
fn hash_files(files: &[PathBuf]) -> SetupResult<String> {
    let mut hasher = Sha256::new();

    for path in files {
        let contents = fs::read(path)
            .map_err(|e| SetupError::io(format!("reading dependency file {}", path.display()), e))?;
        hasher.update(normalized(path).as_bytes());
        hasher.update([0u8]);
        hasher.update(&contents);
        hasher.update([0u8]);
    }

    let digest = hex::encode(hasher.finalize());
    Ok(digest[..HASH_LEN].to_string())
}

/// Hash the dependency files on the blocking pool
async fn dependency_hash(pattern: String) -> Option<String> {
    let result = tokio::task::spawn_blocking(move || hash_dependency_files(&pattern))
        .await
        .map_err(|e| SetupError::Internal(format!("dependency hash task failed: {}", e)))
        .and_then(|hashed| hashed);

    match result {
        Ok(hash) => hash,
        Err(e) => {
            warn!("Ignoring cache-dependency-glob: {}", e);
            None
        }
    }
}

/// Forward-slash form so the same checkout hashes alike on every runner
fn normalized(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Key for the current run; a bad glob degrades to a key without hash
pub async fn cache_key_for(ctx: &Context, now: DateTime<Utc>) -> CacheKey {
    let hash = match ctx.config.cache.dependency_glob.clone() {
        Some(pattern) => dependency_hash(pattern).await,
        None => None,
    };

    compute_cache_key(&ctx.version, ctx.platform, &ctx.arch, hash.as_deref(), now)
}
