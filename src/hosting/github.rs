use super::{Artifact, ArtifactKind, HostingApi, NewArtifact, branch_marker};
use crate::errors::HostingError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = "stylesweep";
const PER_PAGE: usize = 100;
/// GitHub's search endpoints never return more than this many results.
const SEARCH_RESULT_CAP: u64 = 1000;
/// Recently created issues checked alongside search, which indexes with a delay.
const RECENT_ISSUES: &str = "30";

/// Known GitHub token prefixes.
/// See: https://github.blog/2021-04-05-behind-githubs-new-authentication-token-formats/
const GITHUB_TOKEN_PREFIXES: &[&str] = &[
    "ghp_",        // Personal access tokens (classic)
    "github_pat_", // Fine-grained personal access tokens
    "gho_",        // OAuth access tokens
    "ghu_",        // GitHub App user-to-server tokens
    "ghs_",        // GitHub App server-to-server tokens
    "ghr_",        // GitHub App refresh tokens
];

/// Validate that a string looks like a valid GitHub token based on its prefix.
///
/// This performs a format check only; it does not verify the token is active
/// or has appropriate scopes.
pub fn is_valid_github_token(token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    GITHUB_TOKEN_PREFIXES
        .iter()
        .any(|prefix| token.starts_with(prefix))
}

/// A GitHub repository (subset of fields we care about).
#[derive(Debug, Serialize, Deserialize)]
struct GitHubRepo {
    full_name: String,
    clone_url: String,
    #[serde(default)]
    archived: bool,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct SearchResponse<T> {
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    items: Vec<T>,
}

/// Whether another search page can hold results, given what has been fetched so far.
fn search_has_more(fetched: usize, page_len: usize, total_count: u64) -> bool {
    let fetched = fetched as u64;
    page_len == PER_PAGE && fetched < total_count.min(SEARCH_RESULT_CAP)
}

/// Search query for open issues whose body carries the marker of `branch`.
fn issue_search_query(repo: &str, branch: &str) -> String {
    format!(
        "repo:{} is:issue is:open in:body \"{}\"",
        repo,
        branch_marker(branch)
    )
}

#[derive(Debug, Deserialize)]
struct GitHubRef {
    #[serde(rename = "ref")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct GitHubPull {
    number: u64,
    title: String,
    html_url: String,
    head: GitHubRef,
}

/// A GitHub issue (subset of fields).
#[derive(Debug, Deserialize)]
struct GitHubIssue {
    number: u64,
    title: String,
    body: Option<String>,
    html_url: String,
    /// Pull requests also come through the issues endpoint; filter them out.
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GitHubLabel {
    name: String,
}

/// Whether an issue from the issues endpoint reports on `branch`.
fn issue_matches_branch(issue: &GitHubIssue, branch: &str) -> bool {
    let marker = branch_marker(branch);
    issue.pull_request.is_none()
        && issue
            .body
            .as_deref()
            .is_some_and(|body| body.contains(&marker))
}

/// Flatten GitHub's `{"message": ..., "errors": [{"message": ...}]}` error body.
fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };
    let mut parts = Vec::new();
    if let Some(msg) = value.get("message").and_then(|m| m.as_str()) {
        parts.push(msg.to_string());
    }
    if let Some(errors) = value.get("errors").and_then(|e| e.as_array()) {
        for err in errors {
            if let Some(msg) = err.get("message").and_then(|m| m.as_str()) {
                parts.push(msg.to_string());
            }
        }
    }
    if parts.is_empty() {
        body.trim().to_string()
    } else {
        parts.join("; ")
    }
}

/// Map a non-success response onto a [`HostingError`].
fn classify_status(status: StatusCode, body: &str, rate_limit_exhausted: bool) -> HostingError {
    let message = error_message(body);
    match status.as_u16() {
        401 => HostingError::Unauthorized { status: 401 },
        403 if rate_limit_exhausted => HostingError::RateLimited,
        403 => HostingError::Unauthorized { status: 403 },
        429 => HostingError::RateLimited,
        404 => HostingError::NotFound(message),
        422 if message.to_lowercase().contains("already exists") => {
            HostingError::AlreadyExists(message)
        }
        code => HostingError::Api {
            status: code,
            message,
        },
    }
}

/// GitHub REST API client.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(token: impl Into<String>, api_url: impl Into<String>) -> Result<Self, HostingError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| HostingError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, HostingError> {
        let resp = req
            .send()
            .await
            .map_err(|e| HostingError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let exhausted = resp
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                == Some("0");
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body, exhausted));
        }

        resp.json::<T>()
            .await
            .map_err(|e| HostingError::Decode(e.to_string()))
    }

    fn pull_to_artifact(repo: &str, pull: GitHubPull) -> Artifact {
        Artifact {
            repo: repo.to_string(),
            number: pull.number,
            url: pull.html_url,
            title: pull.title,
            kind: ArtifactKind::PullRequest,
        }
    }

    fn issue_to_artifact(repo: &str, issue: GitHubIssue) -> Artifact {
        Artifact {
            repo: repo.to_string(),
            number: issue.number,
            url: issue.html_url,
            title: issue.title,
            kind: ArtifactKind::Issue,
        }
    }
}

#[async_trait]
impl HostingApi for GitHubClient {
    async fn search_repositories(
        &self,
        owner: &str,
        topics: &[String],
    ) -> Result<Vec<String>, HostingError> {
        let mut query = format!("org:{} archived:false", owner);
        for topic in topics {
            query.push_str(&format!(" topic:{}", topic));
        }

        let mut urls = Vec::new();
        let mut fetched = 0usize;
        let mut page = 1u32;
        loop {
            let result: Result<SearchResponse<GitHubRepo>, HostingError> = self
                .send(
                    self.request(reqwest::Method::GET, "/search/repositories")
                        .query(&[
                            ("q", query.as_str()),
                            ("per_page", &PER_PAGE.to_string()),
                            ("page", &page.to_string()),
                        ]),
                )
                .await;
            let resp = match result {
                Ok(resp) => resp,
                // Later pages can fall past the result cap when the org grows mid-search.
                Err(HostingError::Api { status: 422, message }) if page > 1 => {
                    tracing::warn!(owner, page, %message, "Search stopped at the result cap");
                    break;
                }
                Err(e) => return Err(e),
            };

            let page_len = resp.items.len();
            fetched += page_len;
            urls.extend(
                resp.items
                    .into_iter()
                    .filter(|r| !r.archived)
                    .map(|r| r.clone_url),
            );
            if !search_has_more(fetched, page_len, resp.total_count) {
                if resp.total_count > SEARCH_RESULT_CAP {
                    tracing::warn!(
                        owner,
                        total = resp.total_count,
                        "Search matched more repositories than GitHub returns; narrow the topics"
                    );
                }
                break;
            }
            page += 1;
        }

        tracing::debug!(owner, count = urls.len(), "Repository search finished");
        Ok(urls)
    }

    async fn search_open_artifacts(
        &self,
        repo: &str,
        kind: ArtifactKind,
        branch: &str,
    ) -> Result<Vec<Artifact>, HostingError> {
        match kind {
            ArtifactKind::PullRequest => {
                let owner = repo.split('/').next().unwrap_or(repo);
                let head = format!("{}:{}", owner, branch);
                let pulls: Vec<GitHubPull> = self
                    .send(
                        self.request(reqwest::Method::GET, &format!("/repos/{}/pulls", repo))
                            .query(&[("state", "open"), ("head", head.as_str()), ("per_page", "100")]),
                    )
                    .await?;
                Ok(pulls
                    .into_iter()
                    .filter(|p| p.head.name == branch)
                    .map(|p| Self::pull_to_artifact(repo, p))
                    .collect())
            }
            ArtifactKind::Issue => {
                let query = issue_search_query(repo, branch);
                let resp: SearchResponse<GitHubIssue> = self
                    .send(
                        self.request(reqwest::Method::GET, "/search/issues")
                            .query(&[("q", query.as_str()), ("per_page", "100")]),
                    )
                    .await?;
                let recent: Vec<GitHubIssue> = self
                    .send(
                        self.request(reqwest::Method::GET, &format!("/repos/{}/issues", repo))
                            .query(&[
                                ("state", "open"),
                                ("sort", "created"),
                                ("direction", "desc"),
                                ("per_page", RECENT_ISSUES),
                            ]),
                    )
                    .await?;

                let mut found: Vec<Artifact> = Vec::new();
                for issue in resp.items.into_iter().chain(recent) {
                    if issue_matches_branch(&issue, branch)
                        && !found.iter().any(|a| a.number == issue.number)
                    {
                        found.push(Self::issue_to_artifact(repo, issue));
                    }
                }
                Ok(found)
            }
        }
    }

    async fn create_pull_request(
        &self,
        repo: &str,
        new: &NewArtifact<'_>,
    ) -> Result<Artifact, HostingError> {
        let pull: GitHubPull = self
            .send(
                self.request(reqwest::Method::POST, &format!("/repos/{}/pulls", repo))
                    .json(&serde_json::json!({
                        "title": new.title,
                        "body": new.body,
                        "head": new.branch,
                        "base": new.base,
                    })),
            )
            .await?;
        Ok(Self::pull_to_artifact(repo, pull))
    }

    async fn update_pull_request(
        &self,
        repo: &str,
        number: u64,
        title: &str,
        body: &str,
    ) -> Result<Artifact, HostingError> {
        let pull: GitHubPull = self
            .send(
                self.request(
                    reqwest::Method::PATCH,
                    &format!("/repos/{}/pulls/{}", repo, number),
                )
                .json(&serde_json::json!({ "title": title, "body": body })),
            )
            .await?;
        Ok(Self::pull_to_artifact(repo, pull))
    }

    async fn create_issue(
        &self,
        repo: &str,
        new: &NewArtifact<'_>,
    ) -> Result<Artifact, HostingError> {
        let issue: GitHubIssue = self
            .send(
                self.request(reqwest::Method::POST, &format!("/repos/{}/issues", repo))
                    .json(&serde_json::json!({ "title": new.title, "body": new.body })),
            )
            .await?;
        Ok(Self::issue_to_artifact(repo, issue))
    }

    async fn update_issue(
        &self,
        repo: &str,
        number: u64,
        title: &str,
        body: &str,
    ) -> Result<Artifact, HostingError> {
        let issue: GitHubIssue = self
            .send(
                self.request(
                    reqwest::Method::PATCH,
                    &format!("/repos/{}/issues/{}", repo, number),
                )
                .json(&serde_json::json!({ "title": title, "body": body })),
            )
            .await?;
        Ok(Self::issue_to_artifact(repo, issue))
    }

    async fn add_labels(
        &self,
        repo: &str,
        number: u64,
        labels: &[String],
    ) -> Result<(), HostingError> {
        let _: Vec<GitHubLabel> = self
            .send(
                self.request(
                    reqwest::Method::POST,
                    &format!("/repos/{}/issues/{}/labels", repo, number),
                )
                .json(&serde_json::json!({ "labels": labels })),
            )
            .await?;
        Ok(())
    }

    async fn list_labels(&self, repo: &str, number: u64) -> Result<Vec<String>, HostingError> {
        let labels: Vec<GitHubLabel> = self
            .send(
                self.request(
                    reqwest::Method::GET,
                    &format!("/repos/{}/issues/{}/labels", repo, number),
                )
                .query(&[("per_page", "100")]),
            )
            .await?;
        Ok(labels.into_iter().map(|l| l.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── is_valid_github_token ────────────────────────────────────────

    #[test]
    fn test_valid_personal_access_token_classic() {
        assert!(is_valid_github_token("ghp_abc123def456"));
    }

    #[test]
    fn test_valid_fine_grained_pat() {
        assert!(is_valid_github_token("github_pat_abc123def456"));
    }

    #[test]
    fn test_valid_server_to_server_token() {
        assert!(is_valid_github_token("ghs_xyz789"));
    }

    #[test]
    fn test_empty_token_is_invalid() {
        assert!(!is_valid_github_token(""));
    }

    #[test]
    fn test_wrong_prefix_is_invalid() {
        assert!(!is_valid_github_token("ghx_abc123"));
        assert!(!is_valid_github_token("GHP_abc123"));
        assert!(!is_valid_github_token(" ghp_abc123"));
    }

    // ── classify_status ──────────────────────────────────────────────

    #[test]
    fn test_already_exists_is_detected() {
        let body = r#"{"message":"Validation Failed","errors":[{"resource":"PullRequest","code":"custom","message":"A pull request already exists for acme:stylesweep/auto-fix."}]}"#;
        let err = classify_status(StatusCode::UNPROCESSABLE_ENTITY, body, false);
        match err {
            HostingError::AlreadyExists(msg) => assert!(msg.contains("already exists")),
            other => panic!("Expected AlreadyExists, got {other:?}"),
        }
    }

    #[test]
    fn test_other_validation_errors_stay_api_errors() {
        let body = r#"{"message":"Validation Failed","errors":[{"message":"No commits between main and branch"}]}"#;
        let err = classify_status(StatusCode::UNPROCESSABLE_ENTITY, body, false);
        assert!(matches!(err, HostingError::Api { status: 422, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_forbidden_with_exhausted_quota_is_rate_limit() {
        let err = classify_status(StatusCode::FORBIDDEN, "{}", true);
        assert!(matches!(err, HostingError::RateLimited));
        let err = classify_status(StatusCode::FORBIDDEN, "{}", false);
        assert!(matches!(err, HostingError::Unauthorized { status: 403 }));
    }

    #[test]
    fn test_server_error_is_retryable() {
        let err = classify_status(StatusCode::BAD_GATEWAY, "upstream down", false);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("upstream down"));
    }

    // ── deserialization ──────────────────────────────────────────────

    #[test]
    fn test_issue_marker_filter() {
        let issues_json = format!(
            r#"[
                {{"number": 1, "title": "Style", "body": "text\n{}", "html_url": "https://github.com/o/r/issues/1"}},
                {{"number": 2, "title": "Other", "body": null, "html_url": "https://github.com/o/r/issues/2"}},
                {{"number": 3, "title": "PR", "body": "{}", "html_url": "https://github.com/o/r/pull/3", "pull_request": {{"url": "..."}}}}
            ]"#,
            branch_marker("fix").replace('"', "\\\""),
            branch_marker("fix").replace('"', "\\\"")
        );
        let issues: Vec<GitHubIssue> = serde_json::from_str(&issues_json).unwrap();
        let matching: Vec<u64> = issues
            .iter()
            .filter(|i| issue_matches_branch(i, "fix"))
            .map(|i| i.number)
            .collect();
        assert_eq!(matching, vec![1]);
    }

    #[test]
    fn test_pull_deserialize() {
        let json = r#"{
            "number": 7,
            "title": "Style fixes",
            "html_url": "https://github.com/acme/widgets/pull/7",
            "head": {"ref": "stylesweep/auto-fix", "sha": "abc"}
        }"#;
        let pull: GitHubPull = serde_json::from_str(json).unwrap();
        let artifact = GitHubClient::pull_to_artifact("acme/widgets", pull);
        assert_eq!(artifact.number, 7);
        assert_eq!(artifact.kind, ArtifactKind::PullRequest);
        assert_eq!(artifact.repo, "acme/widgets");
    }

    #[test]
    fn test_search_response_deserialize() {
        let json = r#"{
            "total_count": 2,
            "items": [
                {"full_name": "acme/a", "clone_url": "https://github.com/acme/a.git"},
                {"full_name": "acme/b", "clone_url": "https://github.com/acme/b.git", "archived": true}
            ]
        }"#;
        let resp: SearchResponse<GitHubRepo> = serde_json::from_str(json).unwrap();
        assert_eq!(resp.total_count, 2);
        assert_eq!(resp.items.len(), 2);
        assert!(!resp.items[0].archived);
        assert!(resp.items[1].archived);
    }

    // ── search paging ────────────────────────────────────────────────

    #[test]
    fn test_search_stops_at_total_count() {
        assert!(search_has_more(100, 100, 250));
        assert!(search_has_more(200, 100, 250));
        assert!(!search_has_more(300, 100, 300));
        assert!(!search_has_more(250, 50, 250));
    }

    #[test]
    fn test_search_stops_at_result_cap() {
        // Ten full pages exhaust the cap; page 11 would be rejected with 422.
        assert!(search_has_more(900, 100, 4200));
        assert!(!search_has_more(1000, 100, 4200));
    }

    #[test]
    fn test_search_with_unknown_total_stops() {
        assert!(!search_has_more(100, 100, 0));
    }

    #[test]
    fn test_issue_search_query_scopes_to_marker() {
        let query = issue_search_query("acme/widgets", "stylesweep/auto-fix");
        assert!(query.starts_with("repo:acme/widgets is:issue is:open in:body "));
        assert!(query.ends_with("\"<!-- stylesweep:branch=stylesweep/auto-fix -->\""));
    }

    #[test]
    fn test_issue_search_response_deserialize() {
        let json = r#"{
            "total_count": 1,
            "items": [
                {"number": 4, "title": "Style", "body": "<!-- stylesweep:branch=fix -->", "html_url": "https://github.com/o/r/issues/4"}
            ]
        }"#;
        let resp: SearchResponse<GitHubIssue> = serde_json::from_str(json).unwrap();
        assert_eq!(resp.items.len(), 1);
        assert!(issue_matches_branch(&resp.items[0], "fix"));
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = GitHubClient::new("ghp_x", "https://ghe.example.com/api/v3/").unwrap();
        assert_eq!(client.url("/repos/a/b"), "https://ghe.example.com/api/v3/repos/a/b");
    }
}
