//! `opam env` export
//!
//! `opam env` prints shell assignments. Every variable is exported as is
//! except PATH, whose new segments are prepended one by one so entries added
//! earlier in the job (the opam binary itself, for one) survive.

use crate::ci::CiEnv;
use crate::error::SetupResult;
use regex::Regex;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::debug;

static EXPORT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:export\s+)?([A-Z_][A-Z0-9_]*)='([^']*)'").expect("export pattern is valid")
});

/// `NAME='value'` pairs from `opam env` output; other lines are ignored
pub fn parse_env_exports(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| EXPORT_LINE.captures(line.trim()))
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

/// Segments of `value` missing from `current`, in their original order
pub fn missing_path_segments(current: &OsString, value: &str) -> Vec<PathBuf> {
    let present: Vec<PathBuf> = std::env::split_paths(current).collect();
    let mut missing: Vec<PathBuf> = Vec::new();

    for segment in std::env::split_paths(value) {
        if segment.as_os_str().is_empty() || present.contains(&segment) || missing.contains(&segment) {
            continue;
        }
        missing.push(segment);
    }
    missing
}

/// Export parsed `opam env` output through the CI surface
pub async fn export_shell_env(ci: &CiEnv, output: &str) -> SetupResult<()> {
    for (name, value) in parse_env_exports(output) {
        if name == "PATH" {
            let current = std::env::var_os("PATH").unwrap_or_default();
            // add_path prepends, so walk backwards to keep opam's order
            for segment in missing_path_segments(&current, &value).into_iter().rev() {
                debug!("Adding {} to PATH", segment.display());
                ci.add_path(&segment).await?;
            }
        } else {
            ci.export_variable(&name, &value).await?;
        }
    }
    Ok(())
}
