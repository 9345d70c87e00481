//! Configuration for stylesweep.
//!
//! Settings are read from `stylesweep.toml` and layered file → environment → CLI.
//!
//! # Configuration File Format
//!
//! ```toml
//! [github]
//! owner = "my-org"
//! topics = ["ruby"]
//!
//! [run]
//! threads = 4
//! retries = 2
//! retry_delay_ms = 1000
//! task_timeout_secs = 900
//!
//! [cache]
//! dir = "~/.cache/stylesweep"
//! max_age_hours = 24
//!
//! [repos]
//! include = ["legacy-billing"]
//! exclude = ["*-archive"]
//! filter = []
//!
//! [artifacts]
//! branch = "stylesweep/auto-fix"
//! pr_title = "Style fixes for {repo}"
//! labels = ["style", "automated"]
//! manual_fix = true
//! manual_fix_kind = "issue"
//!
//! [linter]
//! command = "rubocop"
//! args = []
//! ```
//!
//! Environment: `GITHUB_TOKEN`, `STYLESWEEP_OWNER`, `STYLESWEEP_THREADS`,
//! `STYLESWEEP_CACHE_DIR`.

use crate::errors::ConfigError;
use crate::hosting::{ArtifactKind, is_valid_github_token};
use crate::processor::ProcessorSettings;
use crate::scheduler::SchedulerConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "stylesweep.toml";

pub const ENV_TOKEN: &str = "GITHUB_TOKEN";
pub const ENV_OWNER: &str = "STYLESWEEP_OWNER";
pub const ENV_THREADS: &str = "STYLESWEEP_THREADS";
pub const ENV_CACHE_DIR: &str = "STYLESWEEP_CACHE_DIR";

/// A century; larger ages would overflow the timestamp arithmetic.
const MAX_AGE_HOURS_CAP: u64 = 24 * 365 * 100;

/// Hosting account and discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubSection {
    /// Organization or user whose repositories are swept
    #[serde(default)]
    pub owner: Option<String>,
    /// Only repositories carrying every one of these topics
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_api_url() -> String {
    crate::hosting::DEFAULT_API_URL.to_string()
}

impl Default for GithubSection {
    fn default() -> Self {
        Self {
            owner: None,
            topics: Vec::new(),
            api_url: default_api_url(),
        }
    }
}

/// Worker pool and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSection {
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Extra attempts per repository after the first failure
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Wall-clock bound for one attempt
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    #[serde(default)]
    pub force_refresh: bool,
}

fn default_threads() -> usize {
    4
}

fn default_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_task_timeout_secs() -> u64 {
    900
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            task_timeout_secs: default_task_timeout_secs(),
            force_refresh: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSection {
    /// Defaults to the platform cache directory
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,
}

fn default_max_age_hours() -> u64 {
    24
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            dir: None,
            max_age_hours: default_max_age_hours(),
        }
    }
}

/// Repository selection on top of discovery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReposSection {
    /// Repository names always processed, even without the topics
    #[serde(default)]
    pub include: Vec<String>,
    /// Glob patterns removed from the list
    #[serde(default)]
    pub exclude: Vec<String>,
    /// When non-empty, only names matching one of these globs
    #[serde(default)]
    pub filter: Vec<String>,
}

/// What gets pushed and opened on the hosting platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsSection {
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
    #[serde(default = "default_pr_title")]
    pub pr_title: String,
    #[serde(default = "default_issue_title")]
    pub issue_title: String,
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
    #[serde(default = "default_manual_fix")]
    pub manual_fix: bool,
    #[serde(default)]
    pub manual_fix_kind: ArtifactKind,
}

fn default_branch() -> String {
    "stylesweep/auto-fix".to_string()
}

fn default_commit_message() -> String {
    "Apply automatic style corrections".to_string()
}

fn default_pr_title() -> String {
    "Style fixes for {repo}".to_string()
}

fn default_issue_title() -> String {
    "Style issues need attention in {repo}".to_string()
}

fn default_labels() -> Vec<String> {
    vec!["style".to_string(), "automated".to_string()]
}

fn default_manual_fix() -> bool {
    true
}

impl Default for ArtifactsSection {
    fn default() -> Self {
        Self {
            branch: default_branch(),
            commit_message: default_commit_message(),
            pr_title: default_pr_title(),
            issue_title: default_issue_title(),
            labels: default_labels(),
            manual_fix: default_manual_fix(),
            manual_fix_kind: ArtifactKind::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinterSection {
    #[serde(default = "default_linter_command")]
    pub command: String,
    /// Extra arguments appended to every invocation
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_linter_command() -> String {
    "rubocop".to_string()
}

impl Default for LinterSection {
    fn default() -> Self {
        Self {
            command: default_linter_command(),
            args: Vec::new(),
        }
    }
}

/// The complete stylesweep.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StyleSweepToml {
    #[serde(default)]
    pub github: GithubSection,
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub repos: ReposSection,
    #[serde(default)]
    pub artifacts: ArtifactsSection,
    #[serde(default)]
    pub linter: LinterSection,
}

impl StyleSweepToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse stylesweep.toml")
    }

    /// Load `path`, or defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize stylesweep.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.run.threads == 0 {
            warnings.push("run.threads is 0; at least one worker is always used".to_string());
        }
        if self.run.task_timeout_secs == 0 {
            warnings.push("run.task_timeout_secs is 0; every attempt will time out".to_string());
        }
        if self.cache.max_age_hours == 0 {
            warnings.push("cache.max_age_hours is 0; the cache will never hit".to_string());
        }
        if self.artifacts.branch.trim().is_empty() {
            warnings.push("artifacts.branch is empty".to_string());
        }
        for (field, template) in [
            ("pr_title", &self.artifacts.pr_title),
            ("issue_title", &self.artifacts.issue_title),
        ] {
            if !template.contains("{repo}") && !template.contains("{full_name}") {
                warnings.push(format!(
                    "artifacts.{} does not mention the repository ({{repo}} or {{full_name}})",
                    field
                ));
            }
        }
        for pattern in self.repos.exclude.iter().chain(&self.repos.filter) {
            if let Err(e) = glob::Pattern::new(pattern) {
                warnings.push(format!("Invalid repository pattern '{}': {}", pattern, e.msg));
            }
        }
        if self.linter.command.trim().is_empty() {
            warnings.push("linter.command is empty".to_string());
        }

        warnings
    }
}

/// Command-line overrides, applied last.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub owner: Option<String>,
    pub topics: Vec<String>,
    pub threads: Option<usize>,
    pub force_refresh: bool,
}

/// Effective configuration: stylesweep.toml, then environment, then CLI.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Where the file layer was read from (it may not exist)
    pub config_path: PathBuf,
    pub toml: StyleSweepToml,
    token: Option<String>,
}

impl SweepConfig {
    /// Load the file layer and apply the process environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
        let toml = StyleSweepToml::load_or_default(&config_path)?;

        let mut config = Self {
            config_path,
            toml,
            token: None,
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Build from an already parsed file layer, without touching the environment.
    pub fn from_toml(toml: StyleSweepToml) -> Self {
        Self {
            config_path: PathBuf::from(CONFIG_FILE),
            toml,
            token: None,
        }
    }

    /// Overlay environment values read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(owner) = non_empty(ENV_OWNER) {
            self.toml.github.owner = Some(owner);
        }
        if let Some(threads) = non_empty(ENV_THREADS) {
            self.toml.run.threads =
                threads
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        field: ENV_THREADS.to_string(),
                        message: format!("'{}' is not a positive integer", threads),
                    })?;
        }
        if let Some(dir) = non_empty(ENV_CACHE_DIR) {
            self.toml.cache.dir = Some(PathBuf::from(dir));
        }
        self.token = non_empty(ENV_TOKEN).map(|t| t.trim().to_string());
        Ok(())
    }

    pub fn with_cli_args(mut self, cli: CliOverrides) -> Self {
        if let Some(owner) = cli.owner {
            self.toml.github.owner = Some(owner);
        }
        if !cli.topics.is_empty() {
            self.toml.github.topics = cli.topics;
        }
        if let Some(threads) = cli.threads {
            self.toml.run.threads = threads;
        }
        if cli.force_refresh {
            self.toml.run.force_refresh = true;
        }
        self
    }

    pub fn owner(&self) -> Result<&str, ConfigError> {
        self.toml
            .github
            .owner
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .ok_or(ConfigError::MissingOwner)
    }

    pub fn token(&self) -> Result<&str, ConfigError> {
        let token = self.token.as_deref().ok_or(ConfigError::MissingToken)?;
        if !is_valid_github_token(token) {
            return Err(ConfigError::InvalidToken);
        }
        Ok(token)
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Hard checks that must pass before any task runs.
    pub fn ensure_runnable(&self) -> Result<(), ConfigError> {
        self.owner()?;
        self.token()?;
        if self.toml.run.task_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "run.task_timeout_secs".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        for pattern in self.toml.repos.exclude.iter().chain(&self.toml.repos.filter) {
            glob::Pattern::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.msg.to_string(),
            })?;
        }
        Ok(())
    }

    /// Cache directory (file → env → platform default), with `~` expanded.
    pub fn cache_dir(&self) -> PathBuf {
        match &self.toml.cache.dir {
            Some(dir) => expand_home(dir),
            None => dirs::cache_dir()
                .map(|d| d.join("stylesweep"))
                .unwrap_or_else(|| PathBuf::from(".stylesweep-cache")),
        }
    }

    pub fn workspace_root(&self) -> PathBuf {
        self.cache_dir().join("workspaces")
    }

    pub fn cache_max_age(&self) -> chrono::Duration {
        chrono::Duration::hours(self.toml.cache.max_age_hours.min(MAX_AGE_HOURS_CAP) as i64)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            worker_count: self.toml.run.threads.max(1),
            retries: self.toml.run.retries,
            retry_delay: Duration::from_millis(self.toml.run.retry_delay_ms),
            cache_max_age: self.cache_max_age(),
            force_refresh: self.toml.run.force_refresh,
        }
    }

    pub fn processor_settings(&self) -> ProcessorSettings {
        let artifacts = &self.toml.artifacts;
        ProcessorSettings {
            workspace_root: self.workspace_root(),
            branch: artifacts.branch.clone(),
            commit_message: artifacts.commit_message.clone(),
            pr_title: artifacts.pr_title.clone(),
            issue_title: artifacts.issue_title.clone(),
            labels: artifacts.labels.clone(),
            manual_fix: artifacts.manual_fix,
            manual_fix_kind: artifacts.manual_fix_kind,
            attempt_timeout: Duration::from_secs(self.toml.run.task_timeout_secs),
        }
    }

    /// Validate configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.toml.validate();
        if self.toml.github.owner.is_none() {
            warnings.push(format!(
                "github.owner is not set (set it in {} or {})",
                CONFIG_FILE, ENV_OWNER
            ));
        }
        match &self.token {
            None => warnings.push(format!("{} is not set", ENV_TOKEN)),
            Some(t) if !is_valid_github_token(t) => {
                warnings.push(format!("{} does not look like a GitHub token", ENV_TOKEN))
            }
            Some(_) => {}
        }
        warnings
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}
