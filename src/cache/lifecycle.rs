//! Cache restore and save
//!
//! Both halves are best-effort. A store that is missing, slow or broken costs
//! install time, never the job, so neither function returns an error.

use crate::cache::apt::AptMirror;
use crate::cache::key::cache_key_for;
use crate::cache::paths::compute_cache_paths;
use crate::cache::store::{CacheStore, StoreError};
use crate::ci::state::{StateStore, CACHE_MATCHED_KEY, CACHE_PRIMARY_KEY};
use crate::context::Context;
use crate::error::NonFatal;
use crate::opam::Opam;
use crate::process::CommandRunner;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// What the save step ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(String),
    /// Another job saved the same key first
    AlreadyExists(String),
    Skipped(&'static str),
    Failed(String),
}

/// Restore the cached directories; `true` on an exact or prefix hit
pub async fn restore_cache(
    ctx: &Context,
    store: &dyn CacheStore,
    state: &dyn StateStore,
    runner: &dyn CommandRunner,
    now: DateTime<Utc>,
) -> bool {
    if !ctx.config.cache.enabled {
        info!("Cache disabled, not restoring");
        return false;
    }
    if !store.is_available().await {
        warn!("Cache store is not available, not restoring");
        return false;
    }

    let key = cache_key_for(ctx, now).await;
    let paths = compute_cache_paths(ctx);
    info!("Cache key: {}", key.primary);
    info!("Restore keys: {}", key.restore_prefixes.join(", "));

    state.clear().await.non_fatal("reset run state");
    // Recorded even on a miss: the post step saves under this key
    state
        .set(CACHE_PRIMARY_KEY, &key.primary)
        .await
        .non_fatal("record cache key");

    let matched = match store
        .restore(paths.as_slice(), &key.primary, &key.restore_prefixes)
        .await
    {
        Ok(Some(matched)) => matched,
        Ok(None) => {
            info!("Cache not found");
            return false;
        }
        Err(e) => {
            warn!("Failed to restore cache: {}", e);
            return false;
        }
    };

    if matched == key.primary {
        info!("Cache restored from key: {}", matched);
    } else {
        info!("Cache partially restored from key: {}", matched);
    }
    state
        .set(CACHE_MATCHED_KEY, &matched)
        .await
        .non_fatal("record matched cache key");

    if ctx.platform.is_linux() {
        AptMirror::new(ctx)
            .restore_to_system(ctx, runner)
            .await
            .non_fatal("restore apt cache");
    }
    true
}

/// Trim and upload the cached directories under the recorded primary key
pub async fn save_cache(
    ctx: &Context,
    store: &dyn CacheStore,
    state: &dyn StateStore,
    runner: &dyn CommandRunner,
    opam: &Opam<'_>,
) -> SaveOutcome {
    let Some(primary) = state.get(CACHE_PRIMARY_KEY).await.non_fatal("read run state").flatten() else {
        warn!("No cache key found, skipping save");
        return SaveOutcome::Skipped("no cache key recorded");
    };

    let matched = state
        .get(CACHE_MATCHED_KEY)
        .await
        .non_fatal("read run state")
        .flatten();
    if matched.as_deref() == Some(primary.as_str()) {
        info!("Cache hit occurred on the primary key {}, not saving cache", primary);
        return SaveOutcome::Skipped("exact cache hit");
    }

    if !ctx.config.cache.enabled || !store.is_available().await {
        warn!("Cache store is not available, not saving");
        return SaveOutcome::Skipped("cache store unavailable");
    }

    opam.clean().await.non_fatal("clean opam");
    opam.trim_dune_cache().await.non_fatal("trim dune cache");
    tokio::fs::create_dir_all(ctx.dune_cache_dir())
        .await
        .non_fatal("recreate dune cache directory");

    if ctx.platform.is_linux() {
        AptMirror::new(ctx)
            .mirror_to_user(ctx, runner)
            .await
            .non_fatal("mirror apt cache");
    }

    let paths = compute_cache_paths(ctx);
    match store.save(paths.as_slice(), &primary).await {
        Ok(()) => {
            info!("Cache saved with key: {}", primary);
            SaveOutcome::Saved(primary)
        }
        Err(StoreError::AlreadyExists(key)) => {
            info!("Cache already exists, skipping save");
            SaveOutcome::AlreadyExists(key)
        }
        Err(e) => {
            warn!("Failed to save cache: {}", e);
            SaveOutcome::Failed(e.to_string())
        }
    }
}
