//! Command execution with captured exit status and output

use std::fmt;
use std::future::Future;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use super::quote;

/// Errors launching an external command
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// A program and its argument list, never a shell string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Program followed by its arguments
    pub fn argv(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str))
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match quote::shell_join(self.argv()) {
            Ok(line) => f.write_str(&line),
            Err(_) => write!(f, "{} {:?}", self.program, self.args),
        }
    }
}

/// Exit status and captured output of a finished command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external commands to completion off the caller's context
pub trait ProcessRunner: Send + Sync + 'static {
    fn run(
        &self,
        command: &CommandLine,
    ) -> impl Future<Output = Result<CommandOutput, ProcessError>> + Send;
}

/// Runner backed by real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    async fn run(&self, command: &CommandLine) -> Result<CommandOutput, ProcessError> {
        debug!(%command, "running command");

        let output = Command::new(command.program())
            .args(command.arguments())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ProcessError::Spawn {
                program: command.program().to_string(),
                source,
            })?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(program = command.program(), code = ?result.code, "command finished");

        Ok(result)
    }
}
