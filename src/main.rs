//! setup-rocq - CI setup for the Rocq prover
//!
//! CLI entry point that dispatches to the setup and post steps.

use clap::Parser;
use console::style;
use setup_rocq::ci::CiEnv;
use setup_rocq::cli::{Cli, Commands};
use setup_rocq::config::{Config, ConfigManager};
use setup_rocq::error::SetupResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let ci = CiEnv::detect();
    let is_post = matches!(cli.command, Commands::Post(_));

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        // The post step must never fail the job
        Err(e) if is_post => {
            ci.warning(&e.to_string());
            ExitCode::SUCCESS
        }
        Err(e) => {
            ci.set_failed(&e.to_string());
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> SetupResult<()> {
    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    let runner_debug = std::env::var("RUNNER_DEBUG").is_ok_and(|v| v == "1");
    init_tracing(&config, cli.verbose, runner_debug);
    let debug = cli.verbose >= 2;

    match cli.command {
        Commands::Setup(args) => setup_rocq::cli::commands::setup(args, config, debug).await,
        Commands::Post(args) => setup_rocq::cli::commands::post(args, config, debug).await,
    }
}

/// 0 = info, 1 = debug, 2+ = trace; `RUNNER_DEBUG=1` raises the default to debug
fn init_tracing(config: &Config, verbose: u8, runner_debug: bool) {
    let level = match verbose {
        0 if runner_debug => "debug",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::new(format!("setup_rocq={}", level));

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .init();
    }
}
