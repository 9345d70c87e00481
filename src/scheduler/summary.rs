//! Aggregated results of one run.

use crate::hosting::Artifact;
use crate::task::{OutcomeStatus, ProcessingOutcome};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A repository that ended in error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub repo: String,
    pub detail: String,
    pub attempts: u32,
}

/// Summary of a run. Built only by the scheduler's aggregation loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Tasks dispatched.
    pub total: usize,
    pub clean: usize,
    pub issues_found: usize,
    pub skipped: usize,
    pub errored: usize,
    /// Skips served from the result cache.
    pub cache_hits: usize,
    /// Pull requests and issues created or updated.
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub failures: Vec<Failure>,
    /// One outcome per dispatched task, in repository order once finished.
    #[serde(default)]
    pub outcomes: Vec<ProcessingOutcome>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl RunSummary {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn add_outcome(&mut self, outcome: ProcessingOutcome) {
        match outcome.status {
            OutcomeStatus::Clean => self.clean += 1,
            OutcomeStatus::IssuesFound => self.issues_found += 1,
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Error => {
                self.errored += 1;
                self.failures.push(Failure {
                    repo: outcome.repo.clone(),
                    detail: outcome.error_detail.clone().unwrap_or_default(),
                    attempts: outcome.attempts,
                });
            }
        }
        if outcome.from_cache {
            self.cache_hits += 1;
        }
        if let Some(artifact) = &outcome.artifact {
            self.artifacts.push(artifact.clone());
        }
        self.outcomes.push(outcome);
    }

    /// Every dispatched task produced exactly one outcome.
    pub fn is_complete(&self) -> bool {
        self.outcomes.len() == self.total
            && self.clean + self.issues_found + self.skipped + self.errored == self.total
    }

    pub fn all_success(&self) -> bool {
        self.errored == 0
    }

    /// Sort outcomes, artifacts and failures by repository for stable reporting.
    pub fn finish(&mut self, duration: Duration) {
        self.duration = duration;
        self.outcomes.sort_by(|a, b| a.repo.cmp(&b.repo));
        self.artifacts.sort_by(|a, b| a.repo.cmp(&b.repo));
        self.failures.sort_by(|a, b| a.repo.cmp(&b.repo));
    }

    pub fn outcome_for(&self, repo: &str) -> Option<&ProcessingOutcome> {
        self.outcomes.iter().find(|o| o.repo == repo)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
