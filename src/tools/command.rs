//! External command execution
//!
//! Tools that wrap akashic-cli, node or the formatter build a
//! [`CommandSpec`] and hand it to a [`CommandRunner`]. The runner is a trait
//! object on [`ToolContext`](super::ToolContext) so tests can substitute a
//! mock instead of spawning processes.

use async_trait::async_trait;
use rmcp::model::CallToolResult;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;

use super::{error_result, text_result};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Command is empty")]
    EmptyCommand,

    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl CommandSpec {
    /// Builds a spec from a configured command string
    ///
    /// The string may carry leading arguments (`npx prettier`); it is split
    /// on whitespace, no shell is involved.
    pub fn parse(command: &str, cwd: &Path) -> Result<Self, CommandError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(CommandError::EmptyCommand)?;
        Ok(Self {
            program,
            args: parts.collect(),
            cwd: cwd.to_path_buf(),
        })
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Command line for messages and logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: CommandSpec) -> Result<CommandOutput, CommandError>;
}

/// Runs commands as child processes and waits for them to exit
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: CommandSpec) -> Result<CommandOutput, CommandError> {
        tracing::debug!(command = %spec.display(), cwd = %spec.cwd.display(), "Running command");

        let output = tokio::process::Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| CommandError::Spawn {
                program: spec.program.clone(),
                source,
            })?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runs `spec` and reports the outcome as a tool result
///
/// Non-zero exits and spawn failures become error results carrying exit
/// status, stdout and stderr.
pub async fn run_to_result(runner: &dyn CommandRunner, spec: CommandSpec) -> CallToolResult {
    let command_line = spec.display();
    match runner.run(spec).await {
        Ok(output) if output.success() => {
            text_result(format_report(&format!("`{}` succeeded.", command_line), &output))
        }
        Ok(output) => {
            tracing::warn!(command = %command_line, status = ?output.status, "Command failed");
            error_result(format_report(
                &format!(
                    "`{}` failed with exit status {}.",
                    command_line,
                    describe_status(output.status)
                ),
                &output,
            ))
        }
        Err(e) => {
            tracing::warn!(command = %command_line, error = %e, "Command could not be started");
            error_result(e.to_string())
        }
    }
}

pub fn describe_status(status: Option<i32>) -> String {
    status.map_or_else(|| "signal".to_string(), |code| code.to_string())
}

pub fn format_report(headline: &str, output: &CommandOutput) -> String {
    let mut report = headline.to_string();
    if !output.stdout.trim().is_empty() {
        report.push_str("\n\nstdout:\n");
        report.push_str(output.stdout.trim_end());
    }
    if !output.stderr.trim().is_empty() {
        report.push_str("\n\nstderr:\n");
        report.push_str(output.stderr.trim_end());
    }
    report
}
