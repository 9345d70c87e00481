//! Typed error hierarchy for stylesweep.
//!
//! Four enums cover the subsystems:
//! - `ConfigError`: startup failures that stop a run before any task starts
//! - `CommandError`: failures of an external process (git, linter)
//! - `HostingError`: hosting API failures, including the "already exists" race
//! - `ProcessError`: per-repository failures, classified as retryable or terminal

use std::time::Duration;
use thiserror::Error;

/// Startup failures. These are the only errors that change the exit code.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No organization owner configured. Set [github].owner, STYLESWEEP_OWNER or --owner")]
    MissingOwner,

    #[error("No hosting token found. Set GITHUB_TOKEN")]
    MissingToken,

    #[error("GITHUB_TOKEN does not look like a GitHub token")]
    InvalidToken,

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Invalid repository pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// Failure of an external command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", .after.as_secs())]
    Timeout { program: String, after: Duration },

    #[error("{program} was cancelled")]
    Cancelled { program: String },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: i32,
        stderr: String,
    },
}

/// Errors returned by the hosting API client.
#[derive(Debug, Error)]
pub enum HostingError {
    /// The platform refused creation because an equivalent artifact exists.
    #[error("Artifact already exists: {0}")]
    AlreadyExists(String),

    #[error("Hosting API rejected credentials ({status})")]
    Unauthorized { status: u16 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited by hosting API")]
    RateLimited,

    #[error("Hosting API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Hosting API transport error: {0}")]
    Transport(String),

    #[error("Failed to decode hosting API response: {0}")]
    Decode(String),
}

impl HostingError {
    /// Transport failures, rate limiting and server-side errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            HostingError::Transport(_) | HostingError::RateLimited => true,
            HostingError::Api { status, .. } => *status >= 500,
            HostingError::Decode(_) => true,
            HostingError::AlreadyExists(_)
            | HostingError::Unauthorized { .. }
            | HostingError::NotFound(_) => false,
        }
    }
}

/// Errors from processing a single repository.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to sync working copy: {0:#}")]
    Sync(#[source] anyhow::Error),

    #[error("Linter invocation failed: {0}")]
    Analyze(#[source] CommandError),

    #[error("Linter report could not be parsed: {0}")]
    ReportParse(String),

    #[error("Autocorrect failed: {0}")]
    Autocorrect(#[source] CommandError),

    #[error("Failed to inspect working copy changes: {0:#}")]
    Diff(#[source] anyhow::Error),

    #[error("Failed to commit and push branch {branch}: {source:#}")]
    Push {
        branch: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Artifact reconciliation failed: {0}")]
    Hosting(#[from] HostingError),

    #[error("Attempt timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Processing was cancelled")]
    Cancelled,

    #[error("Malformed repository: {0}")]
    InvalidRepository(String),
}

impl ProcessError {
    /// Whether the retry coordinator should spend budget on another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProcessError::Sync(_)
            | ProcessError::Analyze(_)
            | ProcessError::ReportParse(_)
            | ProcessError::Autocorrect(_)
            | ProcessError::Diff(_)
            | ProcessError::Push { .. }
            | ProcessError::Timeout(_) => true,
            ProcessError::Hosting(e) => e.is_retryable(),
            ProcessError::Cancelled | ProcessError::InvalidRepository(_) => false,
        }
    }
}

impl From<CommandError> for ProcessError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Cancelled { .. } => ProcessError::Cancelled,
            other => ProcessError::Analyze(other),
        }
    }
}
