//! Directories that make up the cached payload

use crate::context::Context;
use std::path::PathBuf;

/// Ordered set of cached directories.
///
/// Built from the [`Context`] alone, so restore and save see the same set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePathSet {
    paths: Vec<PathBuf>,
}

impl CachePathSet {
    pub fn as_slice(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn contains(&self, path: &std::path::Path) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// opam root and dune cache always; the weekly clones and the apt mirror
/// when they apply
pub fn compute_cache_paths(ctx: &Context) -> CachePathSet {
    let mut paths = vec![ctx.opam_root(), ctx.dune_cache_dir()];
    if ctx.version.is_weekly() {
        paths.push(ctx.weekly_dir());
    }
    if ctx.platform.is_linux() {
        paths.push(ctx.apt_mirror_dir());
    }
    CachePathSet { paths }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::{context, context_on};
    use crate::platform::Platform;
    use tempfile::TempDir;

    #[test]
    fn linux_latest_includes_apt_mirror() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "latest");
        let paths = compute_cache_paths(&ctx);

        assert_eq!(
            paths.as_slice(),
            &[ctx.opam_root(), ctx.dune_cache_dir(), ctx.apt_mirror_dir()]
        );
        assert!(!paths.contains(&ctx.weekly_dir()));
    }

    #[test]
    fn weekly_on_macos_includes_clones_only() {
        let dir = TempDir::new().unwrap();
        let ctx = context_on(dir.path(), "weekly", Platform::MacOS);
        let paths = compute_cache_paths(&ctx);

        assert_eq!(paths.len(), 3);
        assert!(paths.contains(&ctx.weekly_dir()));
        assert!(!paths.contains(&ctx.apt_mirror_dir()));
    }

    #[test]
    fn same_context_same_paths() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "weekly");
        assert_eq!(compute_cache_paths(&ctx), compute_cache_paths(&ctx));
    }
}
