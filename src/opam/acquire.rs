//! opam binary acquisition
//!
//! Release binaries are downloaded once per version and architecture into a
//! tool cache laid out like the hosted runners' own:
//! `<root>/opam/<version>/<arch>/` next to a `<arch>.complete` marker.

use crate::ci::CiEnv;
use crate::context::Context;
use crate::error::{SetupError, SetupResult};
use crate::opam::OPAM_VERSION;
use crate::platform::Platform;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

const RELEASE_BASE: &str = "https://github.com/ocaml/opam/releases/download";

/// Tool name inside the tool cache
const TOOL_NAME: &str = "opam";

/// Release asset URL for a platform and architecture
pub fn release_url(platform: Platform, arch: &str) -> SetupResult<String> {
    let unsupported = || SetupError::UnsupportedArch {
        platform: platform.name().to_string(),
        arch: arch.to_string(),
    };

    let asset = match (platform, arch) {
        (Platform::Windows, "x86_64") => "x86_64-windows.zip",
        (Platform::MacOS, "aarch64") => "arm64-macos",
        (Platform::MacOS, "x86_64") => "x86_64-macos",
        (Platform::Linux, "aarch64") => "arm64-linux",
        (Platform::Linux, "x86_64") => "x86_64-linux",
        _ => return Err(unsupported()),
    };

    Ok(format!(
        "{}/{}/opam-{}-{}",
        RELEASE_BASE, OPAM_VERSION, OPAM_VERSION, asset
    ))
}

/// File name of the opam executable
fn binary_name(platform: Platform) -> &'static str {
    if platform.is_windows() {
        "opam.exe"
    } else {
        "opam"
    }
}

/// Versioned directory cache for downloaded tools
#[derive(Debug, Clone)]
pub struct ToolCache {
    root: PathBuf,
}

impl ToolCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn version_dir(&self, tool: &str, version: &str) -> PathBuf {
        self.root.join(tool).join(version)
    }

    fn marker(&self, tool: &str, version: &str, arch: &str) -> PathBuf {
        self.version_dir(tool, version)
            .join(format!("{}.complete", arch))
    }

    /// Cached directory for a tool, if a previous run completed it
    pub fn find(&self, tool: &str, version: &str, arch: &str) -> Option<PathBuf> {
        let dir = self.version_dir(tool, version).join(arch);
        (dir.is_dir() && self.marker(tool, version, arch).exists()).then_some(dir)
    }

    /// Copy `source` into the cache as `file_name` and mark the entry complete
    pub async fn cache_file(
        &self,
        source: &Path,
        file_name: &str,
        tool: &str,
        version: &str,
        arch: &str,
    ) -> SetupResult<PathBuf> {
        let dir = self.version_dir(tool, version).join(arch);
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .await
                .map_err(|e| SetupError::io(format!("clearing {}", dir.display()), e))?;
        }
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| SetupError::io(format!("creating {}", dir.display()), e))?;

        let target = dir.join(file_name);
        fs::copy(source, &target)
            .await
            .map_err(|e| SetupError::io(format!("copying {} into tool cache", source.display()), e))?;
        make_executable(&target).await?;

        let marker = self.marker(tool, version, arch);
        fs::write(&marker, "")
            .await
            .map_err(|e| SetupError::io(format!("writing {}", marker.display()), e))?;
        Ok(dir)
    }
}

/// Directory holding a previously acquired opam, if any
pub fn locate_opam(ctx: &Context) -> Option<PathBuf> {
    ToolCache::new(ctx.paths.tool_cache_dir.clone()).find(TOOL_NAME, OPAM_VERSION, &ctx.arch)
}

/// Make opam available on PATH, downloading it on a tool-cache miss
pub async fn acquire_opam(ctx: &Context, ci: &CiEnv) -> SetupResult<PathBuf> {
    let cache = ToolCache::new(ctx.paths.tool_cache_dir.clone());

    let dir = match cache.find(TOOL_NAME, OPAM_VERSION, &ctx.arch) {
        Some(dir) => {
            info!("Found opam {} in tool cache: {}", OPAM_VERSION, dir.display());
            dir
        }
        None => {
            let url = release_url(ctx.platform, &ctx.arch)?;
            let staging = ctx
                .paths
                .tool_cache_dir
                .join(format!(".download-{}", uuid::Uuid::new_v4()));
            fs::create_dir_all(&staging)
                .await
                .map_err(|e| SetupError::io(format!("creating {}", staging.display()), e))?;

            let result = download_and_cache(ctx, &cache, &url, &staging).await;
            if let Err(e) = fs::remove_dir_all(&staging).await {
                debug!("Failed to remove {}: {}", staging.display(), e);
            }
            result?
        }
    };

    ci.add_path(&dir).await?;
    Ok(dir)
}

async fn download_and_cache(
    ctx: &Context,
    cache: &ToolCache,
    url: &str,
    staging: &Path,
) -> SetupResult<PathBuf> {
    let binary = binary_name(ctx.platform);
    info!("Downloading opam {} from {}", OPAM_VERSION, url);

    let source = if ctx.platform.is_windows() {
        let archive = staging.join("opam.zip");
        download(url, &archive).await?;
        let extracted = staging.join("extracted");
        extract_zip(&archive, &extracted).await?;
        find_binary(&extracted, binary)?
    } else {
        let file = staging.join(binary);
        download(url, &file).await?;
        file
    };

    cache
        .cache_file(&source, binary, TOOL_NAME, OPAM_VERSION, &ctx.arch)
        .await
}

/// Stream a URL to disk on the blocking pool
async fn download(url: &str, dest: &Path) -> SetupResult<()> {
    let url = url.to_string();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || -> SetupResult<()> {
        let failed = |reason: String| SetupError::Download {
            url: url.clone(),
            reason,
        };

        let response = ureq::get(&url).call().map_err(|e| failed(e.to_string()))?;
        let mut reader = response.into_body().into_reader();
        let mut file = std::fs::File::create(&dest)
            .map_err(|e| SetupError::io(format!("creating {}", dest.display()), e))?;
        let bytes = std::io::copy(&mut reader, &mut file).map_err(|e| failed(e.to_string()))?;
        debug!("Downloaded {} bytes to {}", bytes, dest.display());
        Ok(())
    })
    .await
    .map_err(|e| SetupError::Internal(format!("download task failed: {}", e)))?
}

async fn extract_zip(archive: &Path, dest: &Path) -> SetupResult<()> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || -> SetupResult<()> {
        let failed = |reason: String| SetupError::Archive {
            path: archive.clone(),
            reason,
        };

        let file = std::fs::File::open(&archive)
            .map_err(|e| SetupError::io(format!("opening {}", archive.display()), e))?;
        let mut zip = zip::ZipArchive::new(file).map_err(|e| failed(e.to_string()))?;
        zip.extract(&dest).map_err(|e| failed(e.to_string()))
    })
    .await
    .map_err(|e| SetupError::Internal(format!("extract task failed: {}", e)))?
}

/// Locate the executable anywhere inside an extracted archive
fn find_binary(root: &Path, name: &str) -> SetupResult<PathBuf> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .find(|entry| entry.file_type().is_file() && entry.file_name() == name)
        .map(|entry| entry.into_path())
        .ok_or_else(|| SetupError::Archive {
            path: root.to_path_buf(),
            reason: format!("{} not found in archive", name),
        })
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> SetupResult<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|e| SetupError::io(format!("setting permissions on {}", path.display()), e))
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> SetupResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::context;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn release_urls_per_platform() {
        assert_eq!(
            release_url(Platform::Linux, "x86_64").unwrap(),
            "https://github.com/ocaml/opam/releases/download/2.5.0/opam-2.5.0-x86_64-linux"
        );
        assert!(release_url(Platform::MacOS, "aarch64")
            .unwrap()
            .ends_with("opam-2.5.0-arm64-macos"));
        assert!(release_url(Platform::Windows, "x86_64")
            .unwrap()
            .ends_with("opam-2.5.0-x86_64-windows.zip"));

        let err = release_url(Platform::Linux, "riscv64").unwrap_err();
        assert!(matches!(err, SetupError::UnsupportedArch { .. }));
        assert!(err.hint().is_some());
    }

    #[tokio::test]
    async fn tool_cache_requires_marker() {
        let dir = TempDir::new().unwrap();
        let cache = ToolCache::new(dir.path().to_path_buf());
        std::fs::create_dir_all(dir.path().join("opam/2.5.0/x86_64")).unwrap();
        assert_eq!(cache.find("opam", "2.5.0", "x86_64"), None);

        let source = dir.path().join("opam-download");
        std::fs::write(&source, "#!/bin/sh\n").unwrap();
        let cached = cache
            .cache_file(&source, "opam", "opam", "2.5.0", "x86_64")
            .await
            .unwrap();

        assert_eq!(cache.find("opam", "2.5.0", "x86_64"), Some(cached.clone()));
        assert!(cached.join("opam").exists());
        assert!(dir.path().join("opam/2.5.0/x86_64.complete").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(cached.join("opam")).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[tokio::test]
    #[serial]
    async fn cached_opam_is_added_to_path_without_download() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "latest");
        let cache = ToolCache::new(ctx.paths.tool_cache_dir.clone());
        let source = dir.path().join("opam-binary");
        std::fs::write(&source, "").unwrap();
        let cached = cache
            .cache_file(&source, "opam", TOOL_NAME, OPAM_VERSION, &ctx.arch)
            .await
            .unwrap();
        let path_file = dir.path().join("path");
        let ci = CiEnv::with_files(None, Some(path_file.clone()));
        let original = std::env::var_os("PATH");

        let acquired = acquire_opam(&ctx, &ci).await.unwrap();

        assert_eq!(acquired, cached);
        assert_eq!(locate_opam(&ctx), Some(cached.clone()));
        assert_eq!(
            std::fs::read_to_string(&path_file).unwrap().trim(),
            cached.display().to_string()
        );
        match original {
            Some(p) => std::env::set_var("PATH", p),
            None => std::env::remove_var("PATH"),
        }
    }

    #[tokio::test]
    async fn zip_archive_is_extracted_and_binary_found() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("opam.zip");
        {
            let file = std::fs::File::create(&archive).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            writer
                .start_file("opam-2.5.0/bin/opam.exe", zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"MZ").unwrap();
            writer.finish().unwrap();
        }

        let out = dir.path().join("out");
        extract_zip(&archive, &out).await.unwrap();
        let found = find_binary(&out, "opam.exe").unwrap();
        assert!(found.ends_with("opam-2.5.0/bin/opam.exe"));
        assert!(find_binary(&out, "missing").is_err());
    }
}
