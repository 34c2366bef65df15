//! Directory tree copies used by the cache store and the apt mirror

use crate::error::{SetupError, SetupResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// What to do when a single entry cannot be copied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyPolicy {
    /// Abort the whole copy
    Strict,
    /// Log at debug level and continue (privileged, concurrently-written sources)
    SkipUnreadable,
}

/// Outcome of a tree copy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub copied: usize,
    pub skipped: usize,
}

/// Copy `src` into `dest`, merging with existing contents.
///
/// Entries whose file name is in `excludes` are skipped at any depth along
/// with everything below them.
pub fn copy_tree_sync(
    src: &Path,
    dest: &Path,
    excludes: &[String],
    policy: CopyPolicy,
) -> SetupResult<CopyReport> {
    fs::create_dir_all(dest)
        .map_err(|e| SetupError::io(format!("creating {}", dest.display()), e))?;

    let mut report = CopyReport::default();
    let walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            !excludes
                .iter()
                .any(|name| entry.file_name().to_string_lossy() == name.as_str())
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| src.to_path_buf());
                skip_or_fail(policy, &path, std::io::Error::other(e.to_string()), &mut report)?;
                continue;
            }
        };

        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| SetupError::Internal(format!("walked outside {}: {}", src.display(), e)))?;
        let target = dest.join(rel);
        let file_type = entry.file_type();

        let result = if file_type.is_dir() {
            fs::create_dir_all(&target)
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)
        } else {
            fs::copy(entry.path(), &target).map(|_| ())
        };

        match result {
            Ok(()) if file_type.is_dir() => {}
            Ok(()) => report.copied += 1,
            Err(e) => skip_or_fail(policy, entry.path(), e, &mut report)?,
        }
    }

    Ok(report)
}

/// Async wrapper running the copy on the blocking pool
pub async fn copy_tree(
    src: &Path,
    dest: &Path,
    excludes: &[&str],
    policy: CopyPolicy,
) -> SetupResult<CopyReport> {
    let src: PathBuf = src.to_path_buf();
    let dest: PathBuf = dest.to_path_buf();
    let excludes: Vec<String> = excludes.iter().map(|s| s.to_string()).collect();

    tokio::task::spawn_blocking(move || copy_tree_sync(&src, &dest, &excludes, policy))
        .await
        .map_err(|e| SetupError::Internal(format!("copy task failed: {}", e)))?
}

fn skip_or_fail(
    policy: CopyPolicy,
    path: &Path,
    error: std::io::Error,
    report: &mut CopyReport,
) -> SetupResult<()> {
    match policy {
        CopyPolicy::Strict => Err(SetupError::io(format!("copying {}", path.display()), error)),
        CopyPolicy::SkipUnreadable => {
            debug!("Skipped copying {}: {}", path.display(), error);
            report.skipped += 1;
            Ok(())
        }
    }
}

#[cfg(unix)]
fn copy_symlink(src: &Path, target: &Path) -> std::io::Result<()> {
    let link = fs::read_link(src)?;
    if target.symlink_metadata().is_ok() {
        fs::remove_file(target)?;
    }
    std::os::unix::fs::symlink(link, target)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, target: &Path) -> std::io::Result<()> {
    fs::copy(src, target).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn excludes(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn copies_nested_tree_and_merges() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        fs::create_dir_all(src.join("a/b")).unwrap();
        fs::write(src.join("top.txt"), "top").unwrap();
        fs::write(src.join("a/b/deep.txt"), "deep").unwrap();
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("existing.txt"), "keep").unwrap();

        let report = copy_tree_sync(&src, &dest, &[], CopyPolicy::Strict).unwrap();

        assert_eq!(report, CopyReport { copied: 2, skipped: 0 });
        assert_eq!(fs::read_to_string(dest.join("a/b/deep.txt")).unwrap(), "deep");
        assert_eq!(fs::read_to_string(dest.join("existing.txt")).unwrap(), "keep");
    }

    #[test]
    fn excluded_names_are_skipped_at_any_depth() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("partial")).unwrap();
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("lock"), "").unwrap();
        fs::write(src.join("partial/x.deb"), "x").unwrap();
        fs::write(src.join("sub/lock"), "").unwrap();
        fs::write(src.join("sub/pkg.deb"), "deb").unwrap();
        let dest = dir.path().join("dest");

        let report =
            copy_tree_sync(&src, &dest, &excludes(&["lock", "partial"]), CopyPolicy::Strict).unwrap();

        assert_eq!(report.copied, 1);
        assert!(dest.join("sub/pkg.deb").exists());
        assert!(!dest.join("lock").exists());
        assert!(!dest.join("sub/lock").exists());
        assert!(!dest.join("partial").exists());
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_files_are_skipped_when_allowed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("ok.deb"), "ok").unwrap();
        let secret = src.join("secret.deb");
        fs::write(&secret, "secret").unwrap();
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o000)).unwrap();

        // root can read anything; nothing to assert then
        if fs::read(&secret).is_ok() {
            return;
        }

        let dest = dir.path().join("dest");
        let report = copy_tree_sync(&src, &dest, &[], CopyPolicy::SkipUnreadable).unwrap();
        assert_eq!(report, CopyReport { copied: 1, skipped: 1 });

        let strict = copy_tree_sync(&src, &dir.path().join("strict"), &[], CopyPolicy::Strict);
        assert!(strict.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_recreated() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("real"), "data").unwrap();
        std::os::unix::fs::symlink("real", src.join("link")).unwrap();
        let dest = dir.path().join("dest");

        copy_tree_sync(&src, &dest, &[], CopyPolicy::Strict).unwrap();
        copy_tree_sync(&src, &dest, &[], CopyPolicy::Strict).unwrap();

        assert_eq!(fs::read_link(dest.join("link")).unwrap(), PathBuf::from("real"));
    }
}
