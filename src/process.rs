//! External process execution
//!
//! opam, git, apt-get, brew and sudo are opaque collaborators: a zero exit
//! code is success, anything else is a [`SetupError::CommandStatus`] carrying
//! the exit code so callers can special-case it.

use crate::error::{SetupError, SetupResult};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Abstract process runner
///
/// Every external command in the setup pipeline goes through this trait so the
/// pipeline can be driven against a recording fake in tests.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command with its output streamed to the job log
    async fn run(&self, program: &str, args: &[&str]) -> SetupResult<()>;

    /// Run a command and capture its stdout
    async fn output(&self, program: &str, args: &[&str]) -> SetupResult<String>;
}

/// Render a command line for logs and error messages
pub fn display_command(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Runner that spawns real processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[&str]) -> SetupResult<()> {
        let command = display_command(program, args);
        info!("[command]{}", command);

        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| SetupError::command_failed(&command, e))?;

        if status.success() {
            Ok(())
        } else {
            Err(SetupError::command_status(command, status.code()))
        }
    }

    async fn output(&self, program: &str, args: &[&str]) -> SetupResult<String> {
        let command = display_command(program, args);
        debug!("Executing: {}", command);

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .output()
            .await
            .map_err(|e| SetupError::command_failed(&command, e))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(SetupError::command_status(command, output.status.code()))
        }
    }
}
