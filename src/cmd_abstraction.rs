//! Running external programs behind a mockable seam.
//!
//! The rule-set compiler is the only caller. Tests script its exit code and
//! stderr through `MockCommandExecutor` instead of spawning `sing-box`.

use anyhow::{Context, Result};
use std::process::{Command, Stdio};

#[cfg(test)]
use mockall::automock;

/// What a finished process leaves behind that a build reports on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stderr: String,
}

impl CommandOutput {
    pub fn succeeded(&self) -> bool {
        self.code == Some(0)
    }
}

#[cfg_attr(test, automock)]
pub trait CommandExecutor: Send + Sync {
    /// Run `program` to completion.
    ///
    /// `Err` only when the process could not be started; a non-zero exit is
    /// reported through [`CommandOutput::code`].
    fn execute(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Spawns real processes with stdin closed and stdout discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl CommandExecutor for SystemExecutor {
    fn execute(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("Failed to start {}", program))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
