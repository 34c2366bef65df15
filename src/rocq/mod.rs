//! Rocq version tiers and installation
//!
//! An exact version or `latest` is a plain `opam install`. The `dev` and
//! `weekly` tiers pin the component packages to source first and install
//! the umbrella package last, over the whole pin set.

pub mod weekly;

pub use weekly::{cutoff_date, monday_cutoff, resolve_monday_commit, WeeklyCommitSelection};

use crate::context::Context;
use crate::error::{SetupError, SetupResult};
use crate::opam::Opam;
use crate::process::CommandRunner;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Rocq sources cloned for weekly snapshots
pub const ROCQ_REPO_URL: &str = "https://github.com/rocq-prover/rocq";
pub const STDLIB_REPO_URL: &str = "https://github.com/rocq-prover/stdlib";

/// opam pin targets tracking the repository heads
const ROCQ_DEV_PIN: &str = "git+https://github.com/rocq-prover/rocq.git";
const STDLIB_DEV_PIN: &str = "git+https://github.com/rocq-prover/stdlib.git";

/// Packages built from the rocq repository
const ROCQ_COMPONENTS: [&str; 3] = ["rocq-runtime.dev", "rocq-core.dev", "coq-core.dev"];

/// Package built from the stdlib repository
const STDLIB_COMPONENT: &str = "coq-stdlib.dev";

/// Umbrella package, only published in the core-dev repository
const UMBRELLA: &str = "coq.dev";

/// Requested Rocq version tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RocqVersion {
    /// A released version, installed as `coq.<version>`
    Exact(String),
    /// Newest released version
    Latest,
    /// Repository heads
    Dev,
    /// Last commit before this week's Monday cutoff
    Weekly,
}

impl RocqVersion {
    /// Tiers that need the core-dev opam repository
    pub fn is_prerelease(&self) -> bool {
        matches!(self, RocqVersion::Dev | RocqVersion::Weekly)
    }

    pub fn is_weekly(&self) -> bool {
        matches!(self, RocqVersion::Weekly)
    }
}

impl FromStr for RocqVersion {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "" => Err(SetupError::InvalidVersion("empty version".to_string())),
            "latest" => Ok(RocqVersion::Latest),
            "dev" => Ok(RocqVersion::Dev),
            "weekly" => Ok(RocqVersion::Weekly),
            // The version lands in cache keys and opam package specs
            v if v.chars().any(|c| c.is_whitespace() || c == '/') => {
                Err(SetupError::InvalidVersion(v.to_string()))
            }
            v => Ok(RocqVersion::Exact(v.to_string())),
        }
    }
}

impl fmt::Display for RocqVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RocqVersion::Exact(v) => write!(f, "{}", v),
            RocqVersion::Latest => write!(f, "latest"),
            RocqVersion::Dev => write!(f, "dev"),
            RocqVersion::Weekly => write!(f, "weekly"),
        }
    }
}

/// Install the requested Rocq version into the current switch
pub async fn install_rocq(
    ctx: &Context,
    opam: &Opam<'_>,
    runner: &dyn CommandRunner,
    now: DateTime<Utc>,
) -> SetupResult<()> {
    match &ctx.version {
        RocqVersion::Exact(version) => {
            info!("Installing Rocq version {}", version);
            opam.install(&format!("coq.{}", version)).await
        }
        RocqVersion::Latest => {
            info!("Installing latest Rocq version");
            opam.install("coq").await
        }
        RocqVersion::Dev => {
            info!("Installing Rocq dev version");
            pin_sources(opam, ROCQ_DEV_PIN, STDLIB_DEV_PIN).await?;
            opam.install(UMBRELLA).await
        }
        RocqVersion::Weekly => {
            info!("Installing Rocq weekly version");
            let root = ctx.weekly_dir();
            let rocq =
                weekly::select_weekly_commit(runner, ROCQ_REPO_URL, &root.join("rocq"), now)
                    .await?;
            let stdlib =
                weekly::select_weekly_commit(runner, STDLIB_REPO_URL, &root.join("stdlib"), now)
                    .await?;
            info!("Using rocq commit: {}", rocq.commit);
            info!("Using stdlib commit: {}", stdlib.commit);

            pin_sources(opam, &rocq.pin_target(), &stdlib.pin_target()).await?;
            opam.install(UMBRELLA).await
        }
    }
}

/// Pin every component, then the umbrella to its development repository
async fn pin_sources(opam: &Opam<'_>, rocq_target: &str, stdlib_target: &str) -> SetupResult<()> {
    for package in ROCQ_COMPONENTS {
        opam.pin(package, rocq_target).await?;
    }
    opam.pin(STDLIB_COMPONENT, stdlib_target).await?;
    opam.pin(UMBRELLA, "--dev-repo").await
}
