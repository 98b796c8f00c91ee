use serde::{Deserialize, Serialize};

/// A repository under a hosting account or organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
    pub clone_url: String,
    pub default_branch: String,
}

impl RepositoryRef {
    /// `owner/name`, the identity used for deduplication and reporting.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Placeholder used to report an allow-list entry that could not be looked up.
    pub fn missing(owner: &str, name: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            clone_url: String::new(),
            default_branch: String::new(),
        }
    }
}

/// One page of an organization's repository listing.
#[derive(Debug, Clone, Default)]
pub struct RepoPage {
    pub repos: Vec<RepositoryRef>,
    /// Next page number, `None` once the listing is exhausted.
    pub next_page: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
}

#[derive(Debug, Clone)]
pub struct CreatePullRequest {
    pub title: String,
    pub body: String,
    pub head_branch: String,
    pub base_branch: String,
}
