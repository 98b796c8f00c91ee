pub mod github;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
use types::*;

#[async_trait]
pub trait Platform: Send + Sync {
    /// Fetch one page (1-based) of an organization's repositories.
    async fn list_org_repos_page(&self, org: &str, page: u32) -> Result<RepoPage>;

    /// Look up a single repository. A missing repository is `AppError::NotFound`.
    async fn get_repo(&self, owner: &str, name: &str) -> Result<RepositoryRef>;

    /// Open a pull request against `repo`.
    async fn create_pull_request(
        &self,
        repo: &RepositoryRef,
        pr: &CreatePullRequest,
    ) -> Result<PullRequest>;
}
