//! In-memory collaborators for unit and scenario tests.

use crate::errors::{HostingError, ProcessError};
use crate::hosting::{Artifact, ArtifactKind, HostingApi, NewArtifact, branch_marker};
use crate::linter::{Finding, LintReport, Linter};
use crate::vcs::Vcs;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_FINGERPRINT: &str = "0000000000000000000000000000000000000000";

pub fn finding(path: &str, cop: &str, correctable: bool) -> Finding {
    Finding {
        path: path.to_string(),
        line: Some(1),
        cop: cop.to_string(),
        message: format!("{} violation", cop),
        correctable,
    }
}

pub fn report(findings: Vec<Finding>) -> LintReport {
    LintReport {
        inspected_files: findings.len().max(1),
        findings,
    }
}

// ── Hosting ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct HostedArtifact {
    repo: String,
    number: u64,
    kind: ArtifactKind,
    branch: String,
    title: String,
    body: String,
    labels: Vec<String>,
}

impl HostedArtifact {
    fn to_artifact(&self) -> Artifact {
        let path = match self.kind {
            ArtifactKind::PullRequest => "pull",
            ArtifactKind::Issue => "issues",
        };
        Artifact {
            repo: self.repo.clone(),
            number: self.number,
            url: format!("https://github.com/{}/{}/{}", self.repo, path, self.number),
            title: self.title.clone(),
            kind: self.kind,
        }
    }
}

#[derive(Debug, Default)]
struct HostingState {
    repositories: Vec<String>,
    artifacts: Vec<HostedArtifact>,
    next_number: u64,
    creates: usize,
    updates: usize,
    last_added: Option<(u64, Vec<String>)>,
    races: HashSet<(String, String)>,
    write_failure: Option<HostingError>,
}

impl HostingState {
    fn insert(&mut self, repo: &str, kind: ArtifactKind, new: &NewArtifact<'_>) -> HostedArtifact {
        self.next_number += 1;
        let hosted = HostedArtifact {
            repo: repo.to_string(),
            number: self.next_number,
            kind,
            branch: new.branch.to_string(),
            title: new.title.to_string(),
            body: new.body.to_string(),
            labels: Vec::new(),
        };
        self.artifacts.push(hosted.clone());
        hosted
    }

    fn find_mut(&mut self, repo: &str, number: u64) -> Option<&mut HostedArtifact> {
        self.artifacts
            .iter_mut()
            .find(|a| a.repo == repo && a.number == number)
    }
}

/// Hosting platform held in memory.
#[derive(Debug, Default)]
pub struct FakeHosting {
    state: Mutex<HostingState>,
}

impl FakeHosting {
    /// Clone URLs returned by repository search.
    pub fn with_repositories(urls: &[&str]) -> Self {
        let fake = Self::default();
        fake.state().repositories = urls.iter().map(|s| s.to_string()).collect();
        fake
    }

    fn state(&self) -> std::sync::MutexGuard<'_, HostingState> {
        self.state.lock().unwrap()
    }

    pub fn open_count(&self, repo: &str, kind: ArtifactKind) -> usize {
        self.state()
            .artifacts
            .iter()
            .filter(|a| a.repo == repo && a.kind == kind)
            .count()
    }

    pub fn labels_of(&self, repo: &str, number: u64) -> Vec<String> {
        self.state()
            .find_mut(repo, number)
            .map(|a| a.labels.clone())
            .unwrap_or_default()
    }

    pub fn body_of(&self, repo: &str, number: u64) -> Option<String> {
        self.state().find_mut(repo, number).map(|a| a.body.clone())
    }

    pub fn create_calls(&self) -> usize {
        self.state().creates
    }

    pub fn update_calls(&self) -> usize {
        self.state().updates
    }

    pub fn last_added_labels(&self) -> Option<(u64, Vec<String>)> {
        self.state().last_added.clone()
    }

    /// The next create on `branch` loses a race: a competing artifact
    /// appears and the platform answers "already exists".
    pub fn simulate_concurrent_creator(&self, repo: &str, branch: &str) {
        self.state()
            .races
            .insert((repo.to_string(), branch.to_string()));
    }

    /// The next create or update fails with `err` and leaves no artifact behind.
    pub fn fail_next_write(&self, err: HostingError) {
        self.state().write_failure = Some(err);
    }

    fn create(
        &self,
        repo: &str,
        kind: ArtifactKind,
        new: &NewArtifact<'_>,
    ) -> Result<Artifact, HostingError> {
        let mut state = self.state();
        state.creates += 1;
        if let Some(err) = state.write_failure.take() {
            return Err(err);
        }
        if state.races.remove(&(repo.to_string(), new.branch.to_string())) {
            let competing = NewArtifact {
                title: "Competing artifact",
                body: new.body,
                branch: new.branch,
                base: new.base,
            };
            state.insert(repo, kind, &competing);
            return Err(HostingError::AlreadyExists(format!(
                "A {} already exists for {}",
                kind, new.branch
            )));
        }
        Ok(state.insert(repo, kind, new).to_artifact())
    }

    fn update(
        &self,
        repo: &str,
        number: u64,
        title: &str,
        body: &str,
    ) -> Result<Artifact, HostingError> {
        let mut state = self.state();
        state.updates += 1;
        if let Some(err) = state.write_failure.take() {
            return Err(err);
        }
        let hosted = state
            .find_mut(repo, number)
            .ok_or_else(|| HostingError::NotFound(format!("{}#{}", repo, number)))?;
        hosted.title = title.to_string();
        hosted.body = body.to_string();
        Ok(hosted.to_artifact())
    }
}

#[async_trait]
impl HostingApi for FakeHosting {
    async fn search_repositories(
        &self,
        _owner: &str,
        _topics: &[String],
    ) -> Result<Vec<String>, HostingError> {
        Ok(self.state().repositories.clone())
    }

    async fn search_open_artifacts(
        &self,
        repo: &str,
        kind: ArtifactKind,
        branch: &str,
    ) -> Result<Vec<Artifact>, HostingError> {
        let marker = branch_marker(branch);
        Ok(self
            .state()
            .artifacts
            .iter()
            .filter(|a| a.repo == repo && a.kind == kind)
            .filter(|a| match kind {
                ArtifactKind::PullRequest => a.branch == branch,
                ArtifactKind::Issue => a.body.contains(&marker),
            })
            .map(HostedArtifact::to_artifact)
            .collect())
    }

    async fn create_pull_request(
        &self,
        repo: &str,
        new: &NewArtifact<'_>,
    ) -> Result<Artifact, HostingError> {
        self.create(repo, ArtifactKind::PullRequest, new)
    }

    async fn update_pull_request(
        &self,
        repo: &str,
        number: u64,
        title: &str,
        body: &str,
    ) -> Result<Artifact, HostingError> {
        self.update(repo, number, title, body)
    }

    async fn create_issue(&self, repo: &str, new: &NewArtifact<'_>) -> Result<Artifact, HostingError> {
        self.create(repo, ArtifactKind::Issue, new)
    }

    async fn update_issue(
        &self,
        repo: &str,
        number: u64,
        title: &str,
        body: &str,
    ) -> Result<Artifact, HostingError> {
        self.update(repo, number, title, body)
    }

    async fn add_labels(&self, repo: &str, number: u64, labels: &[String]) -> Result<(), HostingError> {
        let mut state = self.state();
        let hosted = state
            .find_mut(repo, number)
            .ok_or_else(|| HostingError::NotFound(format!("{}#{}", repo, number)))?;
        for label in labels {
            if !hosted.labels.contains(label) {
                hosted.labels.push(label.clone());
            }
        }
        state.last_added = Some((number, labels.to_vec()));
        Ok(())
    }

    async fn list_labels(&self, repo: &str, number: u64) -> Result<Vec<String>, HostingError> {
        Ok(self.labels_of(repo, number))
    }
}

// ── Version control ──────────────────────────────────────────────────

#[derive(Debug, Default)]
struct VcsState {
    fingerprints: HashMap<String, String>,
    unreachable: HashSet<String>,
    sync_failures: HashMap<String, u32>,
    changed: HashMap<String, Vec<PathBuf>>,
    checkouts: HashMap<PathBuf, String>,
    clone_calls: usize,
    sync_calls: usize,
    remote_calls: usize,
    pushes: Vec<Push>,
}

/// A recorded push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Push {
    pub url: String,
    pub branch: String,
    pub empty: bool,
}

/// Version control that touches nothing but a `.git` marker directory.
#[derive(Debug, Default)]
pub struct FakeVcs {
    state: Mutex<VcsState>,
}

impl FakeVcs {
    fn state(&self) -> std::sync::MutexGuard<'_, VcsState> {
        self.state.lock().unwrap()
    }

    /// Point the remote default branch of `url` at `fingerprint`.
    pub fn set_fingerprint(&self, url: &str, fingerprint: &str) {
        self.state()
            .fingerprints
            .insert(url.to_string(), fingerprint.to_string());
    }

    pub fn set_unreachable(&self, url: &str) {
        self.state().unreachable.insert(url.to_string());
    }

    /// Make the next `times` syncs of `url` fail.
    pub fn fail_sync(&self, url: &str, times: u32) {
        self.state().sync_failures.insert(url.to_string(), times);
    }

    /// Files reported as changed after autocorrect, keyed by repository name.
    pub fn set_changed_files(&self, name: &str, files: &[&str]) {
        self.state()
            .changed
            .insert(name.to_string(), files.iter().map(PathBuf::from).collect());
    }

    pub fn clone_calls(&self) -> usize {
        self.state().clone_calls
    }

    pub fn sync_calls(&self) -> usize {
        self.state().sync_calls
    }

    pub fn remote_fingerprint_calls(&self) -> usize {
        self.state().remote_calls
    }

    pub fn pushes(&self) -> Vec<Push> {
        self.state().pushes.clone()
    }

    fn fingerprint_of(state: &VcsState, url: &str) -> String {
        state
            .fingerprints
            .get(url)
            .cloned()
            .unwrap_or_else(|| DEFAULT_FINGERPRINT.to_string())
    }
}

#[async_trait]
impl Vcs for FakeVcs {
    async fn remote_fingerprint(&self, url: &str, _cancel: &CancellationToken) -> Result<String> {
        let mut state = self.state();
        state.remote_calls += 1;
        if state.unreachable.contains(url) {
            return Err(anyhow!("could not read from remote {}", url));
        }
        Ok(Self::fingerprint_of(&state, url))
    }

    async fn clone_repo(&self, url: &str, dir: &Path, _cancel: &CancellationToken) -> Result<()> {
        std::fs::create_dir_all(dir.join(".git"))?;
        let mut state = self.state();
        state.clone_calls += 1;
        state.checkouts.insert(dir.to_path_buf(), url.to_string());
        Ok(())
    }

    async fn default_branch(&self, _dir: &Path, _url: &str, _cancel: &CancellationToken) -> Result<String> {
        Ok("main".to_string())
    }

    async fn sync(&self, dir: &Path, url: &str, _branch: &str, _cancel: &CancellationToken) -> Result<()> {
        let mut state = self.state();
        state.sync_calls += 1;
        if let Some(remaining) = state.sync_failures.get_mut(url)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(anyhow!("fetch from {} failed", url));
        }
        state.checkouts.insert(dir.to_path_buf(), url.to_string());
        Ok(())
    }

    fn current_fingerprint(&self, dir: &Path) -> Result<String> {
        let state = self.state();
        let url = state
            .checkouts
            .get(dir)
            .ok_or_else(|| anyhow!("{} is not a checkout", dir.display()))?;
        Ok(Self::fingerprint_of(&state, url))
    }

    fn changed_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(self.state().changed.get(&name).cloned().unwrap_or_default())
    }

    async fn commit_and_push(
        &self,
        _dir: &Path,
        url: &str,
        branch: &str,
        _message: &str,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        self.state().pushes.push(Push {
            url: url.to_string(),
            branch: branch.to_string(),
            empty: false,
        });
        Ok(())
    }

    async fn create_empty_commit_and_push(
        &self,
        _dir: &Path,
        url: &str,
        branch: &str,
        _message: &str,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        self.state().pushes.push(Push {
            url: url.to_string(),
            branch: branch.to_string(),
            empty: true,
        });
        Ok(())
    }
}

// ── Linter ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct LinterState {
    reports: HashMap<String, LintReport>,
    broken: HashSet<String>,
    analyze_calls: HashMap<String, usize>,
    autocorrect_calls: usize,
}

/// Linter returning canned reports keyed by repository name.
#[derive(Debug, Default)]
pub struct FakeLinter {
    state: Mutex<LinterState>,
}

impl FakeLinter {
    fn state(&self) -> std::sync::MutexGuard<'_, LinterState> {
        self.state.lock().unwrap()
    }

    pub fn set_report(&self, name: &str, report: LintReport) {
        self.state().reports.insert(name.to_string(), report);
    }

    /// Every analysis of `name` fails with an unparseable report.
    pub fn break_for(&self, name: &str) {
        self.state().broken.insert(name.to_string());
    }

    pub fn analyze_calls(&self, name: &str) -> usize {
        self.state().analyze_calls.get(name).copied().unwrap_or(0)
    }

    pub fn total_analyze_calls(&self) -> usize {
        self.state().analyze_calls.values().sum()
    }

    pub fn autocorrect_calls(&self) -> usize {
        self.state().autocorrect_calls
    }
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[async_trait]
impl Linter for FakeLinter {
    async fn analyze(&self, dir: &Path, _cancel: &CancellationToken) -> Result<LintReport, ProcessError> {
        let name = dir_name(dir);
        let mut state = self.state();
        *state.analyze_calls.entry(name.clone()).or_default() += 1;
        if state.broken.contains(&name) {
            return Err(ProcessError::ReportParse("unexpected token at line 1".to_string()));
        }
        Ok(state.reports.get(&name).cloned().unwrap_or_default())
    }

    async fn autocorrect(&self, _dir: &Path, _cancel: &CancellationToken) -> Result<(), ProcessError> {
        self.state().autocorrect_calls += 1;
        Ok(())
    }
}
