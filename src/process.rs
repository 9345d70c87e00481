//! External command execution with a deadline and cooperative cancellation.
//!
//! Every git and linter invocation goes through [`CommandRunner::run`], so an
//! operator abort or a per-attempt timeout stops the child process instead of
//! leaving it orphaned.

use crate::errors::CommandError;
use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

static CREDENTIALS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?P<scheme>[a-z][a-z0-9+.-]*://)[^/\s@'"]+@"#).unwrap());

/// Captured output of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs external programs, bounded by a timeout and a cancellation token.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run `program` with `args` in `dir` and return its output whatever the exit code.
    ///
    /// The child is spawned with `kill_on_drop`, so losing the race against the
    /// deadline or the token kills it.
    pub async fn run(
        &self,
        program: &str,
        args: &[&str],
        dir: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, CommandError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?;

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(CommandError::Cancelled { program: program.to_string() });
            }
            result = tokio::time::timeout(self.timeout, child.wait_with_output()) => match result {
                Ok(output) => output.map_err(|source| CommandError::Spawn {
                    program: program.to_string(),
                    source,
                })?,
                Err(_) => {
                    return Err(CommandError::Timeout {
                        program: program.to_string(),
                        after: self.timeout,
                    });
                }
            },
        };

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Like [`Self::run`], but a non-zero exit is an error.
    pub async fn run_checked(
        &self,
        program: &str,
        args: &[&str],
        dir: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, CommandError> {
        let output = self.run(program, args, dir, cancel).await?;
        if !output.success() {
            return Err(CommandError::Failed {
                program: program.to_string(),
                status: output.status,
                stderr: redact_credentials(output.stderr.trim()),
            });
        }
        Ok(output)
    }
}

/// Strip `user:secret@` credentials from any URLs in `text`.
pub fn redact_credentials(text: &str) -> String {
    CREDENTIALS_REGEX.replace_all(text, "${scheme}***@").into_owned()
}
