//! Per-repository pipeline.
//!
//! Each attempt walks a fixed sequence of stages:
//!
//! ```text
//! Sync -> Analyze -> Decide -> Clean
//!                          \-> Commit -> Reconcile -> IssuesFound
//! ```
//!
//! | Stage     | Work                                                        |
//! |-----------|-------------------------------------------------------------|
//! | Sync      | clone or hard-reset the working copy to the default branch  |
//! | Analyze   | run the linter and parse its report                         |
//! | Decide    | clean, auto-fix (correctable and a real diff) or manual-fix |
//! | Commit    | push corrections, or an empty commit for manual-fix PRs     |
//! | Reconcile | create or update the single artifact for the fix branch     |
//!
//! Every stage failure becomes an error outcome carrying its retry
//! classification; nothing panics across the worker boundary.

pub mod describe;

use crate::errors::{CommandError, ProcessError};
use crate::hosting::{Artifact, ArtifactKind};
use crate::linter::{LintReport, Linter};
use crate::reconcile::{ArtifactReconciler, ArtifactRequest};
use crate::retry::AttemptContext;
use crate::task::{ProcessingOutcome, RepositoryTask};
use crate::vcs::Vcs;
use describe::Remedy;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Knobs that shape what the processor pushes and opens.
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    /// Working copies live under `<workspace_root>/<owner>/<name>`.
    pub workspace_root: PathBuf,
    /// Fix branch shared by every run.
    pub branch: String,
    pub commit_message: String,
    pub pr_title: String,
    pub issue_title: String,
    pub labels: Vec<String>,
    /// Open an artifact when findings exist but nothing could be auto-corrected.
    pub manual_fix: bool,
    pub manual_fix_kind: ArtifactKind,
    /// Wall-clock bound for one attempt.
    pub attempt_timeout: Duration,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("workspaces"),
            branch: "stylesweep/auto-fix".to_string(),
            commit_message: "Apply automatic style corrections".to_string(),
            pr_title: "Style fixes for {repo}".to_string(),
            issue_title: "Style issues need attention in {repo}".to_string(),
            labels: vec!["style".to_string(), "automated".to_string()],
            manual_fix: true,
            manual_fix_kind: ArtifactKind::Issue,
            attempt_timeout: Duration::from_secs(900),
        }
    }
}

/// A synced working copy.
#[derive(Debug)]
struct Checkout {
    dir: PathBuf,
    default_branch: String,
    fingerprint: String,
}

#[derive(Debug)]
enum Decision {
    Clean,
    AutoFix { changed: Vec<PathBuf> },
    ManualFix,
}

enum Stage {
    Sync,
    Analyze(Checkout),
    Decide(Checkout, LintReport),
    Commit(Checkout, LintReport, Decision),
    Reconcile(Checkout, LintReport, Decision),
    Done(ProcessingOutcome),
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Stage::Sync => "sync",
            Stage::Analyze(..) => "analyze",
            Stage::Decide(..) => "decide",
            Stage::Commit(..) => "commit",
            Stage::Reconcile(..) => "reconcile",
            Stage::Done(_) => "done",
        }
    }
}

pub struct RepositoryProcessor {
    vcs: Arc<dyn Vcs>,
    linter: Arc<dyn Linter>,
    reconciler: ArtifactReconciler,
    settings: ProcessorSettings,
}

impl RepositoryProcessor {
    pub fn new(
        vcs: Arc<dyn Vcs>,
        linter: Arc<dyn Linter>,
        reconciler: ArtifactReconciler,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            vcs,
            linter,
            reconciler,
            settings,
        }
    }

    pub fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }

    /// Working copy location for `task`.
    pub fn workspace_for(&self, task: &RepositoryTask) -> PathBuf {
        self.settings
            .workspace_root
            .join(&task.owner)
            .join(&task.name)
    }

    /// Run one attempt for `task`. Never fails; errors come back as outcomes.
    pub async fn process(
        &self,
        task: &RepositoryTask,
        ctx: AttemptContext,
        cancel: &CancellationToken,
    ) -> ProcessingOutcome {
        let started = Instant::now();
        let repo = task.full_name();
        let span = tracing::info_span!("process", repo = %repo, attempt = ctx.attempt);

        let attempt_cancel = cancel.child_token();
        let result = tokio::time::timeout(
            self.settings.attempt_timeout,
            self.run_stages(task, &attempt_cancel).instrument(span),
        )
        .await;

        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                tracing::warn!(repo = %repo, attempt = ctx.attempt, error = %err, "Processing failed");
                ProcessingOutcome::error(&repo, err.to_string(), err.is_retryable())
            }
            Err(_) => {
                attempt_cancel.cancel();
                let err = ProcessError::Timeout(self.settings.attempt_timeout);
                tracing::warn!(repo = %repo, attempt = ctx.attempt, "Attempt timed out");
                ProcessingOutcome::error(&repo, err.to_string(), err.is_retryable())
            }
        };
        outcome.with_duration(started.elapsed())
    }

    async fn run_stages(
        &self,
        task: &RepositoryTask,
        cancel: &CancellationToken,
    ) -> Result<ProcessingOutcome, ProcessError> {
        validate_task(task)?;
        let mut stage = Stage::Sync;

        loop {
            if cancel.is_cancelled() {
                return Err(ProcessError::Cancelled);
            }
            tracing::debug!(stage = stage.name(), "Entering stage");

            stage = match stage {
                Stage::Sync => Stage::Analyze(self.sync(task, cancel).await?),
                Stage::Analyze(checkout) => {
                    let report = self.linter.analyze(&checkout.dir, cancel).await?;
                    tracing::info!(
                        findings = report.count(),
                        correctable = report.correctable_count(),
                        "Analysis complete"
                    );
                    Stage::Decide(checkout, report)
                }
                Stage::Decide(checkout, report) => {
                    match self.decide(&checkout, &report, cancel).await? {
                        Decision::Clean => Stage::Done(ProcessingOutcome::clean(
                            &task.full_name(),
                            &checkout.fingerprint,
                        )),
                        Decision::ManualFix if !self.settings.manual_fix => {
                            Stage::Done(ProcessingOutcome::issues_found(
                                &task.full_name(),
                                &checkout.fingerprint,
                                describe::summarize(&report),
                                None,
                            ))
                        }
                        decision => Stage::Commit(checkout, report, decision),
                    }
                }
                Stage::Commit(checkout, report, decision) => {
                    self.commit(task, &checkout, &decision, cancel).await?;
                    Stage::Reconcile(checkout, report, decision)
                }
                Stage::Reconcile(checkout, report, decision) => {
                    let artifact = self.reconcile(task, &checkout, &report, &decision).await?;
                    Stage::Done(ProcessingOutcome::issues_found(
                        &task.full_name(),
                        &checkout.fingerprint,
                        describe::summarize(&report),
                        Some(artifact),
                    ))
                }
                Stage::Done(outcome) => return Ok(outcome),
            };
        }
    }

    async fn sync(
        &self,
        task: &RepositoryTask,
        cancel: &CancellationToken,
    ) -> Result<Checkout, ProcessError> {
        let dir = self.workspace_for(task);
        let result = self.sync_working_copy(task, &dir, cancel).await;

        match result {
            Ok(checkout) => Ok(checkout),
            Err(e) if is_cancellation(&e) => Err(ProcessError::Cancelled),
            Err(e) => {
                // A half-fetched working copy is re-cloned on the next attempt.
                if dir.exists()
                    && let Err(rm) = std::fs::remove_dir_all(&dir)
                {
                    tracing::warn!(dir = %dir.display(), error = %rm, "Failed to discard working copy");
                }
                Err(ProcessError::Sync(e))
            }
        }
    }

    async fn sync_working_copy(
        &self,
        task: &RepositoryTask,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Checkout> {
        if dir.exists() && !dir.join(".git").exists() {
            std::fs::remove_dir_all(dir)?;
        }
        if !dir.exists() {
            tracing::info!(dir = %dir.display(), "Cloning");
            self.vcs.clone_repo(&task.clone_url, dir, cancel).await?;
        }

        let default_branch = self.vcs.default_branch(dir, &task.clone_url, cancel).await?;
        self.vcs
            .sync(dir, &task.clone_url, &default_branch, cancel)
            .await?;
        let fingerprint = self.vcs.current_fingerprint(dir)?;
        tracing::debug!(branch = %default_branch, %fingerprint, "Working copy synced");

        Ok(Checkout {
            dir: dir.to_path_buf(),
            default_branch,
            fingerprint,
        })
    }

    async fn decide(
        &self,
        checkout: &Checkout,
        report: &LintReport,
        cancel: &CancellationToken,
    ) -> Result<Decision, ProcessError> {
        if report.is_clean() {
            return Ok(Decision::Clean);
        }
        if report.correctable_count() > 0 {
            self.linter.autocorrect(&checkout.dir, cancel).await?;
            let changed = self
                .vcs
                .changed_files(&checkout.dir)
                .map_err(ProcessError::Diff)?;
            if !changed.is_empty() {
                tracing::info!(files = changed.len(), "Autocorrect produced changes");
                return Ok(Decision::AutoFix { changed });
            }
            tracing::info!("Autocorrect produced no diff, treating as manual fix");
        }
        Ok(Decision::ManualFix)
    }

    async fn commit(
        &self,
        task: &RepositoryTask,
        checkout: &Checkout,
        decision: &Decision,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessError> {
        let branch = &self.settings.branch;
        let message = &self.settings.commit_message;
        let pushed = match decision {
            Decision::AutoFix { .. } => {
                self.vcs
                    .commit_and_push(&checkout.dir, &task.clone_url, branch, message, cancel)
                    .await
            }
            Decision::ManualFix if self.settings.manual_fix_kind == ArtifactKind::PullRequest => {
                self.vcs
                    .create_empty_commit_and_push(&checkout.dir, &task.clone_url, branch, message, cancel)
                    .await
            }
            Decision::ManualFix | Decision::Clean => return Ok(()),
        };

        pushed.map_err(|e| {
            if is_cancellation(&e) {
                ProcessError::Cancelled
            } else {
                ProcessError::Push {
                    branch: branch.clone(),
                    source: e,
                }
            }
        })
    }

    async fn reconcile(
        &self,
        task: &RepositoryTask,
        checkout: &Checkout,
        report: &LintReport,
        decision: &Decision,
    ) -> Result<Artifact, ProcessError> {
        let (kind, remedy) = match decision {
            Decision::AutoFix { changed } => (ArtifactKind::PullRequest, Remedy::AutoFixed { changed }),
            _ => (self.settings.manual_fix_kind, Remedy::Manual),
        };
        let template = match kind {
            ArtifactKind::PullRequest => &self.settings.pr_title,
            ArtifactKind::Issue => &self.settings.issue_title,
        };
        let title = describe::render_title(template, task);
        let body = describe::describe(task, &checkout.fingerprint, report, remedy);
        let repo = task.full_name();

        let artifact = self
            .reconciler
            .reconcile(&ArtifactRequest {
                repo: &repo,
                branch: &self.settings.branch,
                base: &checkout.default_branch,
                kind,
                title: &title,
                body: &body,
                labels: &self.settings.labels,
            })
            .await?;
        tracing::info!(url = %artifact.url, kind = %artifact.kind, "Artifact reconciled");
        Ok(artifact)
    }
}

fn validate_task(task: &RepositoryTask) -> Result<(), ProcessError> {
    let bad = |part: &str| part.is_empty() || part.contains('/') || part == "." || part == "..";
    if bad(&task.owner) || bad(&task.name) {
        return Err(ProcessError::InvalidRepository(format!(
            "'{}' is not a valid owner/name pair",
            task.full_name()
        )));
    }
    if task.clone_url.trim().is_empty() {
        return Err(ProcessError::InvalidRepository(format!(
            "{} has no clone URL",
            task.full_name()
        )));
    }
    Ok(())
}

fn is_cancellation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<CommandError>(),
        Some(CommandError::Cancelled { .. })
    )
}
