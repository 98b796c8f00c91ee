use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub git: GitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitHubConfig {
    /// Name of the environment variable holding the personal access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Base URL of a GitHub Enterprise API. Public GitHub when unset.
    #[serde(default)]
    pub api_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    #[serde(default = "default_branch_name")]
    pub branch_name: String,
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
    #[serde(default = "default_pull_request_title")]
    pub pull_request_title: String,
    #[serde(default = "default_pull_request_description")]
    pub pull_request_description: String,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: PathBuf,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_repo_timeout_secs")]
    pub repo_timeout_secs: u64,
    #[serde(default = "default_script_timeout_secs")]
    pub script_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    #[serde(default = "default_workspace_dir")]
    pub base_dir: PathBuf,
    /// Leave working copies on disk after the run for post-run debugging.
    #[serde(default = "default_keep_workspaces")]
    pub keep: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitConfig {
    #[serde(default = "default_author_name")]
    pub author_name: String,
    #[serde(default = "default_author_email")]
    pub author_email: String,
}

fn default_token_env() -> String {
    "GITHUB_OAUTH_TOKEN".to_string()
}

fn default_branch_name() -> String {
    "repo-fanout".to_string()
}

fn default_commit_message() -> String {
    "Tis I, the repo-fanout runner!".to_string()
}

fn default_pull_request_title() -> String {
    "Repo fanout programmatic PR".to_string()
}

fn default_pull_request_description() -> String {
    "This pull request was opened programmatically by the repo-fanout CLI.".to_string()
}

fn default_scripts_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_concurrent() -> usize {
    8
}

fn default_repo_timeout_secs() -> u64 {
    30 * 60
}

fn default_script_timeout_secs() -> u64 {
    10 * 60
}

fn default_workspace_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_keep_workspaces() -> bool {
    true
}

fn default_author_name() -> String {
    "repo-fanout".to_string()
}

fn default_author_email() -> String {
    "repo-fanout@users.noreply.github.com".to_string()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            api_url: None,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            branch_name: default_branch_name(),
            commit_message: default_commit_message(),
            pull_request_title: default_pull_request_title(),
            pull_request_description: default_pull_request_description(),
            dry_run: false,
            scripts_dir: default_scripts_dir(),
            max_concurrent: default_max_concurrent(),
            repo_timeout_secs: default_repo_timeout_secs(),
            script_timeout_secs: default_script_timeout_secs(),
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            base_dir: default_workspace_dir(),
            keep: default_keep_workspaces(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            author_name: default_author_name(),
            author_email: default_author_email(),
        }
    }
}

impl RunConfig {
    pub fn repo_timeout(&self) -> Duration {
        Duration::from_secs(self.repo_timeout_secs)
    }

    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.script_timeout_secs)
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            builder = builder.add_source(config::File::with_name("repo-fanout").required(false));
        }

        // Environment variable overrides with REPO_FANOUT_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("REPO_FANOUT")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))
    }

    /// Read the hosting token from the configured environment variable.
    pub fn github_token(&self) -> Result<String> {
        match std::env::var(&self.github.token_env) {
            Ok(token) if !token.trim().is_empty() => Ok(token),
            _ => Err(AppError::Config(format!(
                "You must set a GitHub personal access token via the {} environment variable",
                self.github.token_env
            ))),
        }
    }
}
