use async_trait::async_trait;
use octocrab::Octocrab;

use crate::config::GitHubConfig;
use crate::error::Result;
use crate::platform::types::*;
use crate::platform::Platform;

use super::auth::build_client;
use super::mapper;

const PER_PAGE: u8 = 100;

pub struct GitHubPlatform {
    client: Octocrab,
}

impl GitHubPlatform {
    pub fn new(config: &GitHubConfig, token: &str) -> Result<Self> {
        Ok(Self {
            client: build_client(config, token)?,
        })
    }
}

#[async_trait]
impl Platform for GitHubPlatform {
    async fn list_org_repos_page(&self, org: &str, page: u32) -> Result<RepoPage> {
        let listing = self
            .client
            .orgs(org)
            .list_repos()
            .per_page(PER_PAGE)
            .page(page)
            .send()
            .await?;

        let next_page = listing.next.as_ref().map(|_| page + 1);

        let mut repos = Vec::with_capacity(listing.items.len());
        for repo in listing.items {
            repos.push(mapper::map_repository(repo, org)?);
        }

        tracing::debug!(org = org, page = page, count = repos.len(), "Listed organization repos");

        Ok(RepoPage { repos, next_page })
    }

    async fn get_repo(&self, owner: &str, name: &str) -> Result<RepositoryRef> {
        let repo = self.client.repos(owner, name).get().await?;
        mapper::map_repository(repo, owner)
    }

    async fn create_pull_request(
        &self,
        repo: &RepositoryRef,
        pr: &CreatePullRequest,
    ) -> Result<PullRequest> {
        let created = self
            .client
            .pulls(&repo.owner, &repo.name)
            .create(&pr.title, &pr.head_branch, &pr.base_branch)
            .body(&pr.body)
            .maintainer_can_modify(true)
            .send()
            .await?;

        Ok(mapper::map_pull_request(created))
    }
}
