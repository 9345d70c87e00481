//! Hosting platform seam: repository discovery and pull request / issue operations.
//!
//! [`HostingApi`] is the only way the pipeline talks to the platform. The
//! production implementation is [`GitHubClient`]; tests use an in-memory fake.

mod github;

pub use github::{DEFAULT_API_URL, GitHubClient, is_valid_github_token};

use crate::errors::HostingError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Kind of remote artifact opened for a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    PullRequest,
    #[default]
    Issue,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::PullRequest => write!(f, "pull_request"),
            ArtifactKind::Issue => write!(f, "issue"),
        }
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "pull_request" | "pr" => Ok(ArtifactKind::PullRequest),
            "issue" => Ok(ArtifactKind::Issue),
            _ => anyhow::bail!(
                "Invalid artifact kind '{}'. Valid values: pull_request, issue",
                s
            ),
        }
    }
}

/// A pull request or issue on the hosting platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// `owner/name` of the repository.
    pub repo: String,
    pub number: u64,
    pub url: String,
    pub title: String,
    pub kind: ArtifactKind,
}

/// Fields for creating an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArtifact<'a> {
    pub title: &'a str,
    pub body: &'a str,
    /// Source branch of a pull request; recorded via a body marker for issues.
    pub branch: &'a str,
    /// Target branch of a pull request. Ignored for issues.
    pub base: &'a str,
}

/// Operations the pipeline needs from the hosting platform.
#[async_trait]
pub trait HostingApi: Send + Sync {
    /// Clone URLs of repositories owned by `owner` carrying every topic in `topics`.
    async fn search_repositories(
        &self,
        owner: &str,
        topics: &[String],
    ) -> Result<Vec<String>, HostingError>;

    /// Open artifacts of `kind` in `repo` whose source branch is `branch`.
    async fn search_open_artifacts(
        &self,
        repo: &str,
        kind: ArtifactKind,
        branch: &str,
    ) -> Result<Vec<Artifact>, HostingError>;

    async fn create_pull_request(
        &self,
        repo: &str,
        new: &NewArtifact<'_>,
    ) -> Result<Artifact, HostingError>;

    async fn update_pull_request(
        &self,
        repo: &str,
        number: u64,
        title: &str,
        body: &str,
    ) -> Result<Artifact, HostingError>;

    async fn create_issue(&self, repo: &str, new: &NewArtifact<'_>)
    -> Result<Artifact, HostingError>;

    async fn update_issue(
        &self,
        repo: &str,
        number: u64,
        title: &str,
        body: &str,
    ) -> Result<Artifact, HostingError>;

    async fn add_labels(&self, repo: &str, number: u64, labels: &[String])
    -> Result<(), HostingError>;

    async fn list_labels(&self, repo: &str, number: u64) -> Result<Vec<String>, HostingError>;
}

/// Hidden marker tying an issue to the branch it reports on.
pub fn branch_marker(branch: &str) -> String {
    format!("<!-- stylesweep:branch={} -->", branch)
}
