//! Setup command - restore the cache, then provision opam and Rocq

use crate::cache::{restore_cache, LocalCacheStore};
use crate::ci::{state_store, CiEnv};
use crate::cli::args::SetupArgs;
use crate::cli::commands::{step, Services};
use crate::config::Config;
use crate::context::Context;
use crate::error::SetupResult;
use crate::opam::{acquire_opam, Opam, OCAML_VERSION, OPAM_VERSION};
use crate::process::SystemRunner;
use crate::rocq::install_rocq;
use crate::system::install_system_packages;
use chrono::{DateTime, Utc};
use tracing::info;

/// Execute the setup command
pub async fn execute(args: SetupArgs, config: Config, debug: bool) -> SetupResult<()> {
    let ctx = Context::resolve(config, args.inputs.into(), debug)?;
    let ci = CiEnv::detect();
    let runner = SystemRunner::new();
    let store = LocalCacheStore::new(ctx.paths.cache_store_dir.clone());
    let state = state_store(&ctx);

    let services = Services {
        runner: &runner,
        store: &store,
        state: state.as_ref(),
        ci: &ci,
    };
    run_setup(&ctx, &services, Utc::now()).await
}

/// The setup pipeline against explicit collaborators
pub async fn run_setup(ctx: &Context, services: &Services<'_>, now: DateTime<Utc>) -> SetupResult<()> {
    let ci = services.ci;
    info!(
        "Setting up Rocq {} on {} ({})",
        ctx.version,
        ctx.platform.name(),
        ctx.arch
    );

    let cache_hit = {
        let _group = ci.group("Restoring cache");
        restore_cache(ctx, services.store, services.state, services.runner, now).await
    };

    // After the restore, so apt can use the restored package cache
    step(ci, "Installing system packages", install_system_packages(ctx, services.runner)).await?;

    step(ci, &format!("Installing opam {}", OPAM_VERSION), acquire_opam(ctx, ci)).await?;

    let opam = Opam::new(ctx, services.runner, ci);
    step(ci, "Initializing opam", opam.initialize()).await?;
    step(ci, "Setting up opam repositories", opam.setup_repositories()).await?;

    if cache_hit {
        info!("Cache restored, updating repositories instead of creating a switch");
        step(ci, "Updating opam repositories", opam.update_repositories()).await?;
    } else {
        step(ci, &format!("Installing OCaml {}", OCAML_VERSION), opam.create_switch()).await?;
    }

    step(ci, "Setting up opam environment", opam.export_env()).await?;
    step(ci, "Installed opam packages", opam.list_installed()).await?;
    step(ci, "Configuring dune cache", opam.configure_dune_cache()).await?;
    step(ci, "Installing Rocq", install_rocq(ctx, &opam, services.runner, now)).await?;

    info!("Rocq development environment set up successfully");
    Ok(())
}
