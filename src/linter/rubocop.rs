use super::{Finding, LintReport, Linter};
use crate::errors::{CommandError, ProcessError};
use crate::process::CommandRunner;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Exit codes: 0 = no offenses, 1 = offenses found, anything else = tool failure.
const EXIT_CLEAN: i32 = 0;
const EXIT_OFFENSES: i32 = 1;

#[derive(Debug, Deserialize)]
struct RawReport {
    #[serde(default)]
    files: Vec<RawFile>,
    summary: Option<RawSummary>,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    path: String,
    #[serde(default)]
    offenses: Vec<RawOffense>,
}

#[derive(Debug, Deserialize)]
struct RawOffense {
    cop_name: String,
    message: String,
    #[serde(default)]
    correctable: bool,
    location: Option<RawLocation>,
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    line: Option<u32>,
    start_line: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawSummary {
    #[serde(default)]
    inspected_file_count: usize,
}

/// Parse the tool's `--format json` document.
pub fn parse_report(json: &str) -> Result<LintReport, ProcessError> {
    let raw: RawReport =
        serde_json::from_str(json.trim()).map_err(|e| ProcessError::ReportParse(e.to_string()))?;

    let inspected_files = raw
        .summary
        .map(|s| s.inspected_file_count)
        .unwrap_or(raw.files.len());

    let findings = raw
        .files
        .into_iter()
        .flat_map(|file| {
            let path = file.path;
            file.offenses.into_iter().map(move |o| Finding {
                path: path.clone(),
                line: o.location.and_then(|l| l.line.or(l.start_line)),
                cop: o.cop_name,
                message: o.message,
                correctable: o.correctable,
            })
        })
        .collect();

    Ok(LintReport {
        findings,
        inspected_files,
    })
}

/// RuboCop-compatible linter driven through its JSON formatter.
pub struct RubocopLinter {
    runner: CommandRunner,
    command: String,
    extra_args: Vec<String>,
}

impl RubocopLinter {
    pub fn new(runner: CommandRunner, command: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            runner,
            command: command.into(),
            extra_args,
        }
    }

    fn args<'a>(&'a self, mode: &[&'a str]) -> Vec<&'a str> {
        let mut args: Vec<&str> = mode.to_vec();
        args.extend(["--format", "json", "--force-exclusion"]);
        args.extend(self.extra_args.iter().map(String::as_str));
        args
    }
}

#[async_trait]
impl Linter for RubocopLinter {
    async fn analyze(
        &self,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<LintReport, ProcessError> {
        let args = self.args(&[]);
        let output = self
            .runner
            .run(&self.command, &args, Some(dir), cancel)
            .await?;

        if output.status != EXIT_CLEAN && output.status != EXIT_OFFENSES {
            return Err(ProcessError::Analyze(CommandError::Failed {
                program: self.command.clone(),
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            }));
        }

        let report = parse_report(&output.stdout)?;
        if output.status == EXIT_OFFENSES && report.is_clean() {
            return Err(ProcessError::ReportParse(
                "linter reported offenses but the report lists none".to_string(),
            ));
        }
        tracing::debug!(
            findings = report.count(),
            inspected = report.inspected_files,
            "Linter finished"
        );
        Ok(report)
    }

    async fn autocorrect(&self, dir: &Path, cancel: &CancellationToken) -> Result<(), ProcessError> {
        let args = self.args(&["--autocorrect"]);
        let output = self
            .runner
            .run(&self.command, &args, Some(dir), cancel)
            .await
            .map_err(|e| match e {
                CommandError::Cancelled { .. } => ProcessError::Cancelled,
                other => ProcessError::Autocorrect(other),
            })?;

        if output.status != EXIT_CLEAN && output.status != EXIT_OFFENSES {
            return Err(ProcessError::Autocorrect(CommandError::Failed {
                program: self.command.clone(),
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            }));
        }
        Ok(())
    }
}
