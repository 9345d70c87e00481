//! Version-control seam.
//!
//! The processor only talks to [`Vcs`]; [`GitCli`] shells out to `git` for
//! network operations and uses `git2` to inspect the working copy.

mod git;

pub use git::GitCli;

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait Vcs: Send + Sync {
    /// Commit id the remote default branch currently points at.
    async fn remote_fingerprint(&self, url: &str, cancel: &CancellationToken) -> Result<String>;

    /// Clone `url` into `dir`, which must not exist yet.
    async fn clone_repo(&self, url: &str, dir: &Path, cancel: &CancellationToken) -> Result<()>;

    /// Name of the remote default branch for the working copy in `dir`.
    async fn default_branch(&self, dir: &Path, url: &str, cancel: &CancellationToken)
    -> Result<String>;

    /// Make `dir` match the remote `branch` exactly: fetch, hard reset, clean.
    async fn sync(
        &self,
        dir: &Path,
        url: &str,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Commit id of HEAD in `dir`.
    fn current_fingerprint(&self, dir: &Path) -> Result<String>;

    /// Modified, added or deleted files in the working copy, relative to `dir`.
    fn changed_files(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    /// Stage everything, commit and force-push to `branch`.
    async fn commit_and_push(
        &self,
        dir: &Path,
        url: &str,
        branch: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Push an empty commit to `branch` so a pull request has something to anchor on.
    async fn create_empty_commit_and_push(
        &self,
        dir: &Path,
        url: &str,
        branch: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<()>;
}
