//! Repository discovery: hosting search plus include/exclude/filter rules.

use crate::config::ReposSection;
use crate::errors::{ConfigError, HostingError};
use crate::hosting::HostingApi;
use crate::task::RepositoryTask;
use glob::Pattern;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Compiled `[repos]` rules.
#[derive(Debug, Clone, Default)]
pub struct RepoSelection {
    include: Vec<String>,
    exclude: Vec<Pattern>,
    filter: Vec<Pattern>,
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>, ConfigError> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| ConfigError::InvalidPattern {
                pattern: p.clone(),
                message: e.msg.to_string(),
            })
        })
        .collect()
}

impl RepoSelection {
    pub fn new(section: &ReposSection) -> Result<Self, ConfigError> {
        Ok(Self {
            include: section.include.clone(),
            exclude: compile(&section.exclude)?,
            filter: compile(&section.filter)?,
        })
    }

    /// Patterns match either the bare name or `owner/name`.
    fn any_match(patterns: &[Pattern], task: &RepositoryTask) -> bool {
        let full = task.full_name();
        patterns
            .iter()
            .any(|p| p.matches(&task.name) || p.matches(&full))
    }

    /// Exclusion wins over both the filter and explicit includes.
    pub fn accepts(&self, task: &RepositoryTask) -> bool {
        if Self::any_match(&self.exclude, task) {
            return false;
        }
        self.filter.is_empty() || Self::any_match(&self.filter, task)
    }
}

/// Web host that serves clone URLs for an API base URL.
///
/// `https://api.github.com` → `https://github.com`,
/// `https://ghe.example.com/api/v3` → `https://ghe.example.com`.
pub fn clone_host_for(api_url: &str) -> String {
    let trimmed = api_url.trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("https://api.") {
        return format!("https://{}", rest);
    }
    trimmed
        .strip_suffix("/api/v3")
        .unwrap_or(trimmed)
        .to_string()
}

pub struct Discovery {
    api: Arc<dyn HostingApi>,
    clone_host: String,
}

impl Discovery {
    pub fn new(api: Arc<dyn HostingApi>, clone_host: impl Into<String>) -> Self {
        Self {
            api,
            clone_host: clone_host.into(),
        }
    }

    /// Repositories to process, sorted by full name and free of duplicates.
    pub async fn discover(
        &self,
        owner: &str,
        topics: &[String],
        selection: &RepoSelection,
    ) -> Result<Vec<RepositoryTask>, HostingError> {
        let urls = self.api.search_repositories(owner, topics).await?;
        tracing::info!(owner, found = urls.len(), "Repository search complete");

        let mut tasks: BTreeMap<String, RepositoryTask> = BTreeMap::new();
        for url in &urls {
            match RepositoryTask::from_clone_url(url) {
                Some(task) => {
                    tasks.entry(task.full_name().to_lowercase()).or_insert(task);
                }
                None => tracing::warn!(url = %url, "Skipping unparseable clone URL"),
            }
        }

        for name in &selection.include {
            let (repo_owner, repo_name) = name.split_once('/').unwrap_or((owner, name.as_str()));
            let task = RepositoryTask::new(
                repo_owner,
                repo_name,
                format!("{}/{}/{}.git", self.clone_host, repo_owner, repo_name),
            );
            tasks.entry(task.full_name().to_lowercase()).or_insert(task);
        }

        let before = tasks.len();
        let selected: Vec<RepositoryTask> = tasks
            .into_values()
            .filter(|t| selection.accepts(t))
            .collect();
        tracing::debug!(
            selected = selected.len(),
            dropped = before - selected.len(),
            "Applied repository rules"
        );
        Ok(selected)
    }
}
