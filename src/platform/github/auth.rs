use octocrab::Octocrab;

use crate::config::GitHubConfig;
use crate::error::{AppError, Result};

/// Build an octocrab client authenticated with a personal access token.
pub fn build_client(config: &GitHubConfig, token: &str) -> Result<Octocrab> {
    let mut builder = Octocrab::builder().personal_token(token.to_string());

    if let Some(api_url) = &config.api_url {
        builder = builder
            .base_uri(api_url.as_str())
            .map_err(|e| AppError::Config(format!("Invalid GitHub API URL {api_url}: {e}")))?;
    }

    builder
        .build()
        .map_err(|e| AppError::GitHubApi(format!("Failed to build octocrab client: {e}")))
}
