//! opam bootstrap and command wrappers
//!
//! [`Opam`] binds the run context, the process runner and the CI surface so
//! each opam operation reads as a single call in the setup pipeline.

pub mod acquire;
pub mod env;
pub mod repository;

pub use acquire::{acquire_opam, locate_opam, release_url, ToolCache};
pub use env::parse_env_exports;
pub use repository::{repository_plan, Repository};

use crate::ci::CiEnv;
use crate::context::Context;
use crate::error::SetupResult;
use crate::process::CommandRunner;
use tracing::info;

/// opam release installed by the bootstrapper
pub const OPAM_VERSION: &str = "2.5.0";

/// Compiler the default switch is created with
pub const OCAML_VERSION: &str = "5.4.0";

/// Name of the switch created on a cache miss
pub const SWITCH_NAME: &str = "default";

/// Applied to every install and pin so the working directory is not treated
/// as a root project
const UNSET_ROOT: &str = "--unset-root";

/// opam operations for one run
pub struct Opam<'a> {
    ctx: &'a Context,
    runner: &'a dyn CommandRunner,
    ci: &'a CiEnv,
}

impl<'a> Opam<'a> {
    pub fn new(ctx: &'a Context, runner: &'a dyn CommandRunner, ci: &'a CiEnv) -> Self {
        Self { ctx, runner, ci }
    }

    async fn run(&self, args: &[&str]) -> SetupResult<()> {
        self.runner.run("opam", args).await
    }

    /// Export the opam tuning variables and create the root if absent
    pub async fn initialize(&self) -> SetupResult<()> {
        let jobs = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let root = self.ctx.opam_root();

        if self.ctx.debug {
            self.ci.export_variable("OPAMVERBOSE", 1).await?;
        }
        self.ci.export_variable("OPAMCOLOR", "always").await?;
        self.ci.export_variable("OPAMCONFIRMLEVEL", "unsafe-yes").await?;
        self.ci.export_variable("OPAMDOWNLOADJOBS", jobs).await?;
        self.ci.export_variable("OPAMERRLOGLEN", 0).await?;
        self.ci
            .export_variable("OPAMEXTERNALSOLVER", "builtin-0install")
            .await?;
        self.ci.export_variable("OPAMJOBS", jobs).await?;
        self.ci.export_variable("OPAMPRECISETRACKING", 1).await?;
        self.ci.export_variable("OPAMRETRIES", 10).await?;
        self.ci.export_variable("OPAMROOT", root.display()).await?;
        self.ci.export_variable("OPAMSOLVERTIMEOUT", 600).await?;
        self.ci.export_variable("OPAMYES", 1).await?;
        self.ci.export_variable("OPAMROOTISOK", "true").await?;

        if root.exists() {
            info!("opam root {} already present, skipping init", root.display());
            return Ok(());
        }

        self.run(&[
            "init",
            "--bare",
            "--disable-sandboxing",
            "--auto-setup",
            "--enable-shell-hook",
        ])
        .await
    }

    /// Create the default switch with the pinned compiler
    pub async fn create_switch(&self) -> SetupResult<()> {
        let compiler = format!("ocaml-base-compiler.{}", OCAML_VERSION);
        self.run(&["switch", "create", SWITCH_NAME, &compiler]).await
    }

    /// Refresh repository metadata of a restored root
    pub async fn update_repositories(&self) -> SetupResult<()> {
        self.run(&["update", "--development"]).await
    }

    pub async fn list_installed(&self) -> SetupResult<()> {
        self.run(&["list"]).await
    }

    /// Register a repository for all switches with the highest priority
    pub async fn add_repository(&self, name: &str, url: &str) -> SetupResult<()> {
        info!("Adding opam repository {} ({})", name, url);
        self.run(&[
            "repository",
            "add",
            "--all-switches",
            "--set-default",
            name,
            url,
        ])
        .await
    }

    /// Register the Rocq repositories, then the user-supplied ones
    pub async fn setup_repositories(&self) -> SetupResult<()> {
        let plan = repository_plan(
            &self.ctx.version,
            self.ctx.config.rocq.opam_repositories.as_deref(),
        );
        for repository in &plan {
            self.add_repository(&repository.name, &repository.url).await?;
        }
        Ok(())
    }

    /// Export `opam env` into this process and later job steps
    pub async fn export_env(&self) -> SetupResult<()> {
        let output = self.runner.output("opam", &["env"]).await?;
        env::export_shell_env(self.ci, &output).await
    }

    /// Point dune's shared cache into the cached directory set
    pub async fn configure_dune_cache(&self) -> SetupResult<()> {
        self.ci.export_variable("DUNE_CACHE", "enabled").await?;
        self.ci
            .export_variable("DUNE_CACHE_ROOT", self.ctx.dune_cache_dir().display())
            .await
    }

    pub async fn install(&self, package: &str) -> SetupResult<()> {
        self.run(&["install", package, UNSET_ROOT]).await
    }

    /// Record a pin without building anything
    pub async fn pin(&self, package: &str, target: &str) -> SetupResult<()> {
        self.run(&["pin", "add", "--no-action", package, target, UNSET_ROOT])
            .await
    }

    /// Drop build logs and stale switch state before a cache upload
    pub async fn clean(&self) -> SetupResult<()> {
        self.run(&["clean", "--logs", "--switch-cleanup"]).await
    }

    /// Bound the dune cache to the configured size
    pub async fn trim_dune_cache(&self) -> SetupResult<()> {
        let size = format!("--size={}", self.ctx.config.cache.dune_cache_size);
        self.run(&["exec", "--", "dune", "cache", "trim", &size]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::context;
    use crate::process::fake::FakeRunner;
    use serial_test::serial;
    use tempfile::TempDir;

    #[tokio::test]
    #[serial]
    async fn initialize_exports_and_runs_init() {
        let dir = TempDir::new().unwrap();
        let env_file = dir.path().join("env");
        let ctx = context(dir.path(), "latest");
        let runner = FakeRunner::new();
        let ci = CiEnv::with_files(Some(env_file.clone()), None);

        Opam::new(&ctx, &runner, &ci).initialize().await.unwrap();

        assert_eq!(
            runner.calls(),
            vec!["opam init --bare --disable-sandboxing --auto-setup --enable-shell-hook"]
        );
        let exported = std::fs::read_to_string(&env_file).unwrap();
        for name in ["OPAMROOT<<", "OPAMYES<<", "OPAMJOBS<<", "OPAMEXTERNALSOLVER<<"] {
            assert!(exported.contains(name), "missing {}", name);
        }
        assert!(!exported.contains("OPAMVERBOSE<<"));
        assert_eq!(
            std::env::var("OPAMROOT").unwrap(),
            ctx.opam_root().display().to_string()
        );
    }

    #[tokio::test]
    #[serial]
    async fn initialize_skips_existing_root() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(dir.path(), "latest");
        ctx.debug = true;
        std::fs::create_dir_all(ctx.opam_root()).unwrap();
        let runner = FakeRunner::new();
        let ci = CiEnv::with_files(None, None);

        Opam::new(&ctx, &runner, &ci).initialize().await.unwrap();

        assert!(runner.calls().is_empty());
        assert_eq!(std::env::var("OPAMVERBOSE").unwrap(), "1");
        std::env::remove_var("OPAMVERBOSE");
    }

    #[tokio::test]
    async fn switch_and_maintenance_commands() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "latest");
        let runner = FakeRunner::new();
        let ci = CiEnv::with_files(None, None);
        let opam = Opam::new(&ctx, &runner, &ci);

        opam.create_switch().await.unwrap();
        opam.update_repositories().await.unwrap();
        opam.clean().await.unwrap();
        opam.trim_dune_cache().await.unwrap();

        assert_eq!(
            runner.calls(),
            vec![
                "opam switch create default ocaml-base-compiler.5.4.0",
                "opam update --development",
                "opam clean --logs --switch-cleanup",
                "opam exec -- dune cache trim --size=5GB",
            ]
        );
    }

    #[tokio::test]
    async fn repositories_registered_in_priority_order() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(dir.path(), "dev");
        ctx.config.rocq.opam_repositories =
            Some("first: https://a.example/opam\nsecond: https://b.example/opam\n".to_string());
        let runner = FakeRunner::new();
        let ci = CiEnv::with_files(None, None);

        Opam::new(&ctx, &runner, &ci).setup_repositories().await.unwrap();

        let names: Vec<String> = runner
            .calls()
            .iter()
            .map(|c| c.split_whitespace().nth(5).unwrap_or_default().to_string())
            .collect();
        assert_eq!(names, vec!["rocq-released", "rocq-core-dev", "second", "first"]);
        assert!(runner.calls()[0]
            .starts_with("opam repository add --all-switches --set-default rocq-released"));
    }

    #[tokio::test]
    #[serial]
    async fn dune_cache_points_into_home() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "latest");
        let runner = FakeRunner::new();
        let ci = CiEnv::with_files(None, None);

        Opam::new(&ctx, &runner, &ci).configure_dune_cache().await.unwrap();

        assert_eq!(std::env::var("DUNE_CACHE").unwrap(), "enabled");
        assert_eq!(
            std::env::var("DUNE_CACHE_ROOT").unwrap(),
            ctx.dune_cache_dir().display().to_string()
        );
    }
}
