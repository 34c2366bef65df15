//! CLI argument definitions using clap derive

use crate::context::Inputs;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// setup-rocq - Provision opam and the Rocq prover in CI
///
/// `setup` runs before the job and `post` after it; the two share the
/// cache key through the runner state.
#[derive(Parser, Debug)]
#[command(name = "setup-rocq")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "SETUP_ROCQ_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Restore the cache, install opam and Rocq
    Setup(SetupArgs),

    /// Save the install cache after the job
    Post(PostArgs),
}

/// Action inputs, also read from the runner's `INPUT_*` variables
#[derive(Args, Debug, Clone, Default)]
pub struct InputArgs {
    /// Rocq version: an exact version, latest, dev or weekly
    #[arg(long, env = "INPUT_ROCQ-VERSION")]
    pub rocq_version: Option<String>,

    /// Extra opam repositories as a YAML mapping of name to URL
    #[arg(long, env = "INPUT_OPAM-REPOSITORIES")]
    pub opam_repositories: Option<String>,

    /// Glob of files whose contents are hashed into the cache key
    #[arg(long, env = "INPUT_CACHE-DEPENDENCY-GLOB")]
    pub cache_dependency_glob: Option<String>,

    /// Skip cache restore and save
    #[arg(long)]
    pub no_cache: bool,
}

impl From<InputArgs> for Inputs {
    fn from(args: InputArgs) -> Self {
        Inputs {
            rocq_version: args.rocq_version,
            opam_repositories: args.opam_repositories,
            dependency_glob: args.cache_dependency_glob,
            no_cache: args.no_cache,
        }
    }
}

/// Arguments for the setup command
#[derive(Parser, Debug)]
pub struct SetupArgs {
    #[command(flatten)]
    pub inputs: InputArgs,
}

/// Arguments for the post command
#[derive(Parser, Debug)]
pub struct PostArgs {
    /// Must match the setup invocation so the cache paths line up
    #[command(flatten)]
    pub inputs: InputArgs,
}
