//! Static-analysis seam and its structured report.
//!
//! The linter is a black box that emits a machine-readable report. Findings
//! are parsed into typed values; nothing is ever scraped from free-form
//! console output.

mod rubocop;

pub use rubocop::RubocopLinter;

use crate::errors::ProcessError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// One issue reported by the linter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub path: String,
    #[serde(default)]
    pub line: Option<u32>,
    /// Name of the rule that fired.
    pub cop: String,
    pub message: String,
    /// Whether the linter can rewrite this finding itself.
    pub correctable: bool,
}

/// Parsed result of one linter run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintReport {
    pub findings: Vec<Finding>,
    pub inspected_files: usize,
}

/// Per-file rollup used in artifact descriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSummary {
    pub path: String,
    pub correctable: usize,
    pub manual: usize,
    /// Distinct rule names, sorted.
    pub cops: Vec<String>,
}

impl LintReport {
    pub fn count(&self) -> usize {
        self.findings.len()
    }

    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn correctable(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.correctable)
    }

    pub fn manual(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| !f.correctable)
    }

    pub fn correctable_count(&self) -> usize {
        self.correctable().count()
    }

    pub fn manual_count(&self) -> usize {
        self.manual().count()
    }

    /// Findings grouped by file, in path order.
    pub fn file_summaries(&self) -> Vec<FileSummary> {
        let mut by_file: BTreeMap<&str, FileSummary> = BTreeMap::new();
        for finding in &self.findings {
            let entry = by_file.entry(&finding.path).or_insert_with(|| FileSummary {
                path: finding.path.clone(),
                correctable: 0,
                manual: 0,
                cops: Vec::new(),
            });
            if finding.correctable {
                entry.correctable += 1;
            } else {
                entry.manual += 1;
            }
            if !entry.cops.contains(&finding.cop) {
                entry.cops.push(finding.cop.clone());
            }
        }
        by_file
            .into_values()
            .map(|mut s| {
                s.cops.sort();
                s
            })
            .collect()
    }
}

#[async_trait]
pub trait Linter: Send + Sync {
    /// Run the linter against the working copy in `dir`.
    async fn analyze(&self, dir: &Path, cancel: &CancellationToken)
    -> Result<LintReport, ProcessError>;

    /// Let the linter rewrite every auto-correctable finding in place.
    async fn autocorrect(&self, dir: &Path, cancel: &CancellationToken)
    -> Result<(), ProcessError>;
}
