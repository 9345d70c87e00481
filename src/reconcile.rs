//! Create-or-update of the single canonical artifact per (repository, branch).
//!
//! Protocol:
//! 1. Search open artifacts of the requested kind for one on `branch`.
//! 2. Found: update title/body in place, then union-merge labels.
//! 3. Not found: create. If the platform answers "already exists" (another
//!    creator won the race), search again and update that artifact instead.
//!
//! Labels are only ever added. Re-reconciling with fewer labels leaves the
//! extra ones in place.

use crate::errors::HostingError;
use crate::hosting::{Artifact, ArtifactKind, HostingApi, NewArtifact, branch_marker};
use std::collections::HashSet;
use std::sync::Arc;

/// Everything needed to reconcile one artifact.
#[derive(Debug, Clone)]
pub struct ArtifactRequest<'a> {
    pub repo: &'a str,
    pub branch: &'a str,
    /// Target branch for pull requests.
    pub base: &'a str,
    pub kind: ArtifactKind,
    pub title: &'a str,
    pub body: &'a str,
    pub labels: &'a [String],
}

pub struct ArtifactReconciler {
    api: Arc<dyn HostingApi>,
}

impl ArtifactReconciler {
    pub fn new(api: Arc<dyn HostingApi>) -> Self {
        Self { api }
    }

    pub async fn reconcile(&self, req: &ArtifactRequest<'_>) -> Result<Artifact, HostingError> {
        let body = with_marker(req.body, req.branch);

        if let Some(existing) = self.find_open(req).await? {
            return self.update(req, existing.number, &body).await;
        }

        let new = NewArtifact {
            title: req.title,
            body: &body,
            branch: req.branch,
            base: req.base,
        };
        let created = match req.kind {
            ArtifactKind::PullRequest => self.api.create_pull_request(req.repo, &new).await,
            ArtifactKind::Issue => self.api.create_issue(req.repo, &new).await,
        };

        match created {
            Ok(artifact) => {
                tracing::info!(
                    repo = req.repo,
                    kind = %req.kind,
                    number = artifact.number,
                    "Created artifact"
                );
                self.merge_labels(req.repo, artifact.number, req.labels)
                    .await?;
                Ok(artifact)
            }
            Err(HostingError::AlreadyExists(msg)) => {
                tracing::debug!(repo = req.repo, %msg, "Lost creation race, falling back to search");
                match self.find_open(req).await? {
                    Some(existing) => self.update(req, existing.number, &body).await,
                    None => Err(HostingError::AlreadyExists(msg)),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Lowest-numbered open artifact on the branch, so repeated runs converge on the oldest.
    async fn find_open(&self, req: &ArtifactRequest<'_>) -> Result<Option<Artifact>, HostingError> {
        let mut found = self
            .api
            .search_open_artifacts(req.repo, req.kind, req.branch)
            .await?;
        found.sort_by_key(|a| a.number);
        Ok(found.into_iter().next())
    }

    async fn update(
        &self,
        req: &ArtifactRequest<'_>,
        number: u64,
        body: &str,
    ) -> Result<Artifact, HostingError> {
        let artifact = match req.kind {
            ArtifactKind::PullRequest => {
                self.api
                    .update_pull_request(req.repo, number, req.title, body)
                    .await?
            }
            ArtifactKind::Issue => {
                self.api
                    .update_issue(req.repo, number, req.title, body)
                    .await?
            }
        };
        tracing::info!(repo = req.repo, kind = %req.kind, number, "Updated artifact");
        self.merge_labels(req.repo, number, req.labels).await?;
        Ok(artifact)
    }

    async fn merge_labels(
        &self,
        repo: &str,
        number: u64,
        labels: &[String],
    ) -> Result<(), HostingError> {
        if labels.is_empty() {
            return Ok(());
        }
        let existing: HashSet<String> = self.api.list_labels(repo, number).await?.into_iter().collect();
        let missing = missing_labels(&existing, labels);
        if !missing.is_empty() {
            self.api.add_labels(repo, number, &missing).await?;
        }
        Ok(())
    }
}

/// Labels in `wanted` not yet present, deduplicated, in request order.
fn missing_labels(existing: &HashSet<String>, wanted: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    wanted
        .iter()
        .filter(|l| !existing.contains(*l) && seen.insert((*l).clone()))
        .cloned()
        .collect()
}

fn with_marker(body: &str, branch: &str) -> String {
    let marker = branch_marker(branch);
    if body.contains(&marker) {
        body.to_string()
    } else {
        format!("{}\n\n{}", body.trim_end(), marker)
    }
}
