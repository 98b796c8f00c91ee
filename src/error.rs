use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("You must provide at least one valid script that exists on this system and is executable")]
    NoScripts,

    #[error("Scripts not found under {base_dir}: {}", names.join(", "))]
    ScriptsNotFound { base_dir: PathBuf, names: Vec<String> },

    #[error("All scripts must be executable by at least their owner: {0}")]
    ScriptNotExecutable(PathBuf),

    #[error("You must provide either an allowed repos file or a GitHub organization")]
    NoRepoSelector,

    #[error("No repositories found for organization {0}")]
    NoRepositoriesFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("GitHub API error: {0}")]
    GitHubApi(String),

    #[error("Git operation failed: {0}")]
    Git(String),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Script {script} failed ({status}): {output}")]
    Script {
        script: PathBuf,
        status: String,
        output: String,
    },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<octocrab::Error> for AppError {
    fn from(e: octocrab::Error) -> Self {
        match &e {
            octocrab::Error::GitHub { source, .. } if source.status_code.as_u16() == 404 => {
                AppError::NotFound(source.message.clone())
            }
            _ => AppError::GitHubApi(e.to_string()),
        }
    }
}

impl From<git2::Error> for AppError {
    fn from(e: git2::Error) -> Self {
        AppError::Git(e.message().to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
