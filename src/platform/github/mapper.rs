use crate::error::{AppError, Result};
use crate::platform::types;

/// Map an octocrab repository to our `RepositoryRef`.
///
/// The owner falls back to `fallback_owner` when the payload omits it.
pub fn map_repository(
    repo: octocrab::models::Repository,
    fallback_owner: &str,
) -> Result<types::RepositoryRef> {
    let clone_url = repo
        .clone_url
        .map(|u| u.to_string())
        .ok_or_else(|| AppError::GitHubApi(format!("Repository {} has no clone URL", repo.name)))?;

    Ok(types::RepositoryRef {
        owner: repo
            .owner
            .map(|o| o.login)
            .unwrap_or_else(|| fallback_owner.to_string()),
        name: repo.name,
        clone_url,
        default_branch: repo.default_branch.unwrap_or_else(|| "main".to_string()),
    })
}

pub fn map_pull_request(pr: octocrab::models::pulls::PullRequest) -> types::PullRequest {
    types::PullRequest {
        number: pr.number,
        html_url: pr.html_url.map(|u| u.to_string()).unwrap_or_default(),
    }
}
