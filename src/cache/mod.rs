//! Install cache
//!
//! The opam root, the dune build cache, the weekly source clones and (on
//! Linux) a mirror of the apt package cache are saved after a job and
//! restored before the next one.
//!
//! # Keys
//!
//! | Part | Example | Present |
//! |------|---------|---------|
//! | prefix | `setup-rocq-v3-linux-x86_64` | always |
//! | version | `-rocq-weekly` | always |
//! | week | `-2026-10-12` | weekly builds |
//! | dependency hash | `-0123456789abcdef` | when the dependency glob matches |
//!
//! A miss on the full key falls back to the newest entry sharing a prefix,
//! so a partial restore still saves most of the install time.

pub mod apt;
pub mod key;
pub mod lifecycle;
pub mod paths;
pub mod store;

pub use key::{cache_key_for, compute_cache_key, hash_dependency_files, CacheKey, CACHE_VERSION};
pub use lifecycle::{restore_cache, save_cache, SaveOutcome};
pub use paths::{compute_cache_paths, CachePathSet};
pub use store::{CacheStore, LocalCacheStore, StoreError};
