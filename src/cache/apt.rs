//! apt archive and list mirroring
//!
//! The system apt directories are root-owned and the cache store restores as
//! the runner user, so they travel through a user-writable mirror under the
//! home directory. Restores copy the mirror back with sudo.

use crate::context::Context;
use crate::error::{NonFatal, SetupResult};
use crate::fsutil::{copy_tree, CopyPolicy, CopyReport};
use crate::process::CommandRunner;
use std::path::PathBuf;
use tracing::info;

pub const APT_ARCHIVES_DIR: &str = "/var/cache/apt/archives";
pub const APT_LISTS_DIR: &str = "/var/lib/apt/lists";

/// apt's lock files and in-flight downloads
const EXCLUDES: [&str; 2] = ["lock", "partial"];

/// One system directory and its mirror
#[derive(Debug, Clone)]
struct MirroredDir {
    system: PathBuf,
    mirror: PathBuf,
}

/// Mapping between the apt system directories and the user mirror
#[derive(Debug, Clone)]
pub struct AptMirror {
    dirs: Vec<MirroredDir>,
}

impl AptMirror {
    /// The run's apt directories mirrored into `~/.apt-cache`
    pub fn new(ctx: &Context) -> Self {
        Self::with_system_dirs(
            ctx.apt_mirror_dir(),
            ctx.paths.apt_archives_dir.clone(),
            ctx.paths.apt_lists_dir.clone(),
        )
    }

    pub fn with_system_dirs(mirror_root: PathBuf, archives: PathBuf, lists: PathBuf) -> Self {
        Self {
            dirs: vec![
                MirroredDir {
                    system: archives,
                    mirror: mirror_root.join("archives"),
                },
                MirroredDir {
                    system: lists,
                    mirror: mirror_root.join("lists"),
                },
            ],
        }
    }

    /// Copy the system directories into the mirror before a save.
    ///
    /// Files that cannot be read are skipped.
    pub async fn mirror_to_user(
        &self,
        ctx: &Context,
        runner: &dyn CommandRunner,
    ) -> SetupResult<CopyReport> {
        let mut total = CopyReport::default();

        for dir in &self.dirs {
            if !dir.system.exists() {
                info!("Creating missing {}", dir.system.display());
                let system = dir.system.to_string_lossy();
                let (program, args) = ctx.privileged("mkdir", &["-p", &system]);
                runner.run(program, &args).await?;
            }

            let report = copy_tree(&dir.system, &dir.mirror, &EXCLUDES, CopyPolicy::SkipUnreadable).await?;
            info!(
                "Mirrored {} files from {} ({} skipped)",
                report.copied,
                dir.system.display(),
                report.skipped
            );
            total.copied += report.copied;
            total.skipped += report.skipped;
        }
        Ok(total)
    }

    /// Copy a restored mirror back into the system directories.
    ///
    /// Returns `false` when there is no mirrored archive to restore. A failed
    /// copy of one directory is a warning and the next one is still tried.
    pub async fn restore_to_system(
        &self,
        ctx: &Context,
        runner: &dyn CommandRunner,
    ) -> SetupResult<bool> {
        let Some(archives) = self.dirs.first() else {
            return Ok(false);
        };
        if !archives.mirror.is_dir() {
            info!("No apt mirror at {}, nothing to restore", archives.mirror.display());
            return Ok(false);
        }

        for dir in &self.dirs {
            if !dir.mirror.is_dir() {
                continue;
            }
            let system = dir.system.to_string_lossy();
            let (program, args) = ctx.privileged("mkdir", &["-p", &system]);
            if runner
                .run(program, &args)
                .await
                .non_fatal(&format!("create {}", system))
                .is_none()
            {
                continue;
            }

            let source = format!("{}/.", dir.mirror.display());
            let dest = format!("{}/", system);
            let (program, args) = ctx.privileged("cp", &["-r", &source, &dest]);
            runner
                .run(program, &args)
                .await
                .non_fatal(&format!("restore {}", system));
        }
        info!("Restored apt cache");
        Ok(true)
    }
}
