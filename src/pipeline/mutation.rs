use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::platform::types::RepositoryRef;
use crate::scripts::exec::run_script;
use crate::scripts::ScriptCollection;
use crate::stats::{Event, RunStats};
use crate::workspace::git;

use super::types::{Stage, StageError};

/// What a mutation step gets to work with.
pub struct MutationContext<'a> {
    pub repo: &'a RepositoryRef,
    pub workdir: &'a Path,
    pub stats: &'a RunStats,
    pub dry_run: bool,
}

/// The step that changes files in a freshly branched working copy.
#[async_trait]
pub trait Mutation: Send + Sync {
    fn name(&self) -> &str;

    /// Inspect and possibly modify the working copy. Returns whether the
    /// working copy differs from HEAD afterwards; new files must be left staged.
    async fn apply(&self, ctx: &MutationContext<'_>) -> Result<bool, StageError>;
}

/// Runs every validated script in order against the working copy.
pub struct ScriptMutation {
    scripts: Arc<ScriptCollection>,
    timeout: Duration,
}

impl ScriptMutation {
    pub fn new(scripts: Arc<ScriptCollection>, timeout: Duration) -> Self {
        Self { scripts, timeout }
    }
}

#[async_trait]
impl Mutation for ScriptMutation {
    fn name(&self) -> &str {
        "scripts"
    }

    async fn apply(&self, ctx: &MutationContext<'_>) -> Result<bool, StageError> {
        let repo_name = ctx.repo.full_name();
        let env = [
            ("REPO_FANOUT_REPO_OWNER", ctx.repo.owner.clone()),
            ("REPO_FANOUT_REPO_NAME", ctx.repo.name.clone()),
            ("REPO_FANOUT_DRY_RUN", ctx.dry_run.to_string()),
        ];
        let mut changed = false;

        for script in self.scripts.iter() {
            tracing::debug!(
                repo = %repo_name,
                script = %script.display_name(),
                dir = %ctx.workdir.display(),
                "Executing script against local clone of repo"
            );

            let output = run_script(script, ctx.workdir, &env, self.timeout)
                .await
                .map_err(StageError::at(Stage::Script))?;

            tracing::debug!(
                repo = %repo_name,
                script = %script.display_name(),
                output = %output.output,
                "Received output of script run"
            );

            let status = git::worktree_status(ctx.workdir)
                .await
                .map_err(StageError::at(Stage::StatusCheck))?;

            // Only the state after the last script counts; a later script
            // may undo an earlier one.
            changed = !status.is_clean();
            if !changed {
                tracing::debug!(repo = %repo_name, "Worktree is clean, nothing to stage");
                ctx.stats.track_single(Event::WorktreeStatusClean, ctx.repo);
                continue;
            }

            ctx.stats.track_single(Event::WorktreeStatusDirty, ctx.repo);

            // Modified and deleted files are picked up by the commit itself.
            if !status.untracked.is_empty() {
                tracing::debug!(
                    repo = %repo_name,
                    files = ?status.untracked,
                    "Staging untracked files"
                );
                git::stage_paths(ctx.workdir, &status.untracked)
                    .await
                    .map_err(StageError::at(Stage::StageFiles))?;
            }
        }

        Ok(changed)
    }
}
