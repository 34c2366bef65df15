//! Post command - save the install cache
//!
//! Runs after the job in a separate process. It never fails the job: the
//! worst outcome is a warning and no cache for the next run.

use crate::cache::{save_cache, LocalCacheStore, SaveOutcome};
use crate::ci::{state_store, CiEnv};
use crate::cli::args::PostArgs;
use crate::cli::commands::Services;
use crate::config::Config;
use crate::context::Context;
use crate::error::{NonFatal, SetupResult};
use crate::opam::{locate_opam, Opam};
use crate::process::SystemRunner;
use tracing::debug;

/// Execute the post command
pub async fn execute(args: PostArgs, config: Config, debug: bool) -> SetupResult<()> {
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
    let outcome = run_post(&ctx, &services).await;
    debug!("Cache save outcome: {:?}", outcome);
    Ok(())
}

/// Save the cache with opam made reachable again for the cleanup commands
pub async fn run_post(ctx: &Context, services: &Services<'_>) -> SaveOutcome {
    let _group = services.ci.group("Saving cache");

    // Job steps inherit OPAMROOT from the runner; local runs do not
    if std::env::var_os("OPAMROOT").is_none() {
        std::env::set_var("OPAMROOT", ctx.opam_root());
    }
    if let Some(dir) = locate_opam(ctx) {
        services.ci.add_path(&dir).await.non_fatal("add opam to PATH");
    }

    let opam = Opam::new(ctx, services.runner, services.ci);
    save_cache(ctx, services.store, services.state, services.runner, &opam).await
}
