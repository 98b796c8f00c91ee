use std::path::{Path, PathBuf};

use crate::config::WorkspaceConfig;
use crate::error::{AppError, Result};
use crate::platform::types::RepositoryRef;

/// Hands out one fresh working-copy directory per repo per run.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    base_dir: PathBuf,
    keep: bool,
}

impl WorkspaceManager {
    pub fn new(config: &WorkspaceConfig) -> Self {
        Self {
            base_dir: config.base_dir.clone(),
            keep: config.keep,
        }
    }

    /// Create a uniquely named, empty directory for `repo` under the base dir.
    ///
    /// The directory persists until [`WorkspaceManager::cleanup`] removes it.
    pub async fn create(&self, repo: &RepositoryRef) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| AppError::Workspace(format!("Failed to create workspace dir: {e}")))?;

        let prefix = format!(
            "repo-fanout-{}-{}-",
            sanitize(&repo.owner),
            sanitize(&repo.name)
        );

        let dir = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(&self.base_dir)
            .map_err(|e| AppError::Workspace(format!("Failed to create workspace: {e}")))?;

        Ok(dir.keep())
    }

    /// Remove a working copy unless the run is configured to keep them.
    pub async fn cleanup(&self, path: &Path) -> Result<()> {
        if self.keep || !path.exists() {
            return Ok(());
        }
        tokio::fs::remove_dir_all(path)
            .await
            .map_err(|e| AppError::Workspace(format!("Failed to cleanup workspace: {e}")))
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}
