//! OS prerequisite packages
//!
//! opam needs a few host tools before it can build anything: rsync and GMP
//! headers on Linux, darcs and mercurial on macOS for source pins.

use crate::context::Context;
use crate::error::SetupResult;
use crate::platform::Platform;
use crate::process::CommandRunner;
use tracing::{info, warn};

/// Install the configured prerequisites for the current platform
pub async fn install_system_packages(ctx: &Context, runner: &dyn CommandRunner) -> SetupResult<()> {
    match ctx.platform {
        Platform::Linux => install_apt(ctx, runner, &ctx.config.system.linux_packages).await,
        Platform::MacOS => install_brew(runner, &ctx.config.system.macos_packages).await,
        Platform::Windows | Platform::Unsupported => {
            info!("No system packages needed on {}", ctx.platform.name());
            Ok(())
        }
    }
}

/// `apt-get install`, refreshing the package lists once if it fails
async fn install_apt(ctx: &Context, runner: &dyn CommandRunner, packages: &[String]) -> SetupResult<()> {
    if packages.is_empty() {
        return Ok(());
    }

    let mut args = vec!["install", "-y"];
    args.extend(packages.iter().map(String::as_str));
    let (program, install) = ctx.privileged("apt-get", &args);

    match runner.run(program, &install).await {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!("apt-get install failed ({}), updating package lists and retrying", e);
            let (program, update) = ctx.privileged("apt-get", &["update"]);
            runner.run(program, &update).await?;
            runner.run(program, &install).await
        }
    }
}

async fn install_brew(runner: &dyn CommandRunner, packages: &[String]) -> SetupResult<()> {
    if packages.is_empty() {
        return Ok(());
    }

    let mut args = vec!["install"];
    args.extend(packages.iter().map(String::as_str));
    runner.run("brew", &args).await
}
