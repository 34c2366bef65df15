//! CLI command implementations

pub mod post;
pub mod setup;

pub use post::execute as post;
pub use setup::execute as setup;

use crate::cache::CacheStore;
use crate::ci::{CiEnv, StateStore};
use crate::error::SetupResult;
use crate::process::CommandRunner;
use std::future::Future;

/// Collaborators a command runs against
pub struct Services<'a> {
    pub runner: &'a dyn CommandRunner,
    pub store: &'a dyn CacheStore,
    pub state: &'a dyn StateStore,
    pub ci: &'a CiEnv,
}

/// Run one pipeline step inside a collapsible log group
pub(crate) async fn step<T>(
    ci: &CiEnv,
    title: &str,
    work: impl Future<Output = SetupResult<T>>,
) -> SetupResult<T> {
    let _group = ci.group(title);
    work.await
}
