//! opam repository selection

use crate::error::{SetupError, SetupResult};
use crate::rocq::RocqVersion;
use serde_yaml::{Mapping, Value};
use tracing::warn;

/// Released Rocq packages, registered on every run
pub const ROCQ_RELEASED: (&str, &str) = ("rocq-released", "https://rocq-prover.org/opam/released");

/// Development packages, registered for the dev and weekly tiers
pub const ROCQ_CORE_DEV: (&str, &str) = ("rocq-core-dev", "https://rocq-prover.org/opam/core-dev");

/// A named opam repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub name: String,
    pub url: String,
}

impl Repository {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Parse a `name: url` YAML mapping, keeping declaration order
pub fn parse_repositories(yaml: &str) -> SetupResult<Vec<Repository>> {
    let mapping: Mapping = serde_yaml::from_str(yaml)?;

    mapping
        .into_iter()
        .map(|(name, url)| match (name, url) {
            (Value::String(name), Value::String(url)) => Ok(Repository::new(name, url)),
            (name, _) => Err(SetupError::User(format!(
                "opam repository {:?} must map a name to a URL",
                name
            ))),
        })
        .collect()
}

/// Repositories in the order they are added.
///
/// Each `opam repository add --set-default` takes priority over the previous
/// ones, so user repositories go last and in reverse: the first one declared
/// ends up with the highest priority.
pub fn repository_plan(version: &RocqVersion, user_yaml: Option<&str>) -> Vec<Repository> {
    let mut plan = vec![Repository::new(ROCQ_RELEASED.0, ROCQ_RELEASED.1)];
    if version.is_prerelease() {
        plan.push(Repository::new(ROCQ_CORE_DEV.0, ROCQ_CORE_DEV.1));
    }

    if let Some(yaml) = user_yaml.filter(|y| !y.trim().is_empty()) {
        match parse_repositories(yaml) {
            Ok(user) => plan.extend(user.into_iter().rev()),
            Err(e) => warn!("Failed to parse opam-repositories as YAML: {}", e),
        }
    }
    plan
}
