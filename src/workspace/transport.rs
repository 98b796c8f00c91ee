use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::platform::types::RepositoryRef;
use crate::workspace::git;

/// The git operations that talk to the remote.
///
/// Both calls stop with `AppError::Cancelled` once `cancel` fires, including
/// work already handed to a blocking thread.
#[async_trait]
pub trait GitTransport: Send + Sync {
    /// Clone the repo's default branch into `target`.
    async fn clone_repo(
        &self,
        repo: &RepositoryRef,
        target: &Path,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Push `branch` from the clone at `dir` to origin.
    async fn push_branch(&self, dir: &Path, branch: &str, cancel: &CancellationToken)
        -> Result<()>;
}

/// libgit2-backed transport authenticating with the hosting token.
pub struct Git2Transport {
    token: String,
}

impl Git2Transport {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

// Manual Debug impl to avoid leaking the token
impl std::fmt::Debug for Git2Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git2Transport")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl GitTransport for Git2Transport {
    async fn clone_repo(
        &self,
        repo: &RepositoryRef,
        target: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        git::clone(&repo.clone_url, &repo.default_branch, target, &self.token, cancel).await
    }

    async fn push_branch(
        &self,
        dir: &Path,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        git::push(dir, branch, &self.token, cancel).await
    }
}
