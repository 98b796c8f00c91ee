use thiserror::Error;

use crate::error::AppError;
use crate::stats::Event;

/// Outcome of a repo that made it through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoOutcome {
    /// Changes were pushed and a pull request opened.
    PullRequestOpened { url: String },
    /// Changes were committed locally; push and PR skipped for dry run.
    DryRun,
    /// No script changed anything, so there was nothing to commit.
    NoChanges,
}

/// Pipeline stages that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Clone,
    HeadRef,
    Worktree,
    Branch,
    Script,
    StatusCheck,
    StageFiles,
    Commit,
    Push,
    PullRequest,
}

impl Stage {
    /// The event a repo is tagged with when this stage fails.
    pub fn failure_event(&self) -> Event {
        match self {
            Stage::Clone => Event::RepoFailedToClone,
            Stage::HeadRef => Event::GetHeadRefFailed,
            Stage::Worktree => Event::WorktreeUnavailable,
            Stage::Branch => Event::BranchCheckoutFailed,
            Stage::Script => Event::ScriptErrorDuringExecution,
            Stage::StatusCheck => Event::WorktreeStatusCheckFailed,
            Stage::StageFiles => Event::WorktreeAddFileFailed,
            Stage::Commit => Event::CommitChangesFailed,
            Stage::Push => Event::PushBranchFailed,
            Stage::PullRequest => Event::PullRequestOpenError,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Clone => "clone",
            Stage::HeadRef => "head-ref",
            Stage::Worktree => "worktree",
            Stage::Branch => "branch",
            Stage::Script => "script",
            Stage::StatusCheck => "status-check",
            Stage::StageFiles => "stage-files",
            Stage::Commit => "commit",
            Stage::Push => "push",
            Stage::PullRequest => "pull-request",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure that ended one repo's pipeline.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    pub source: AppError,
}

impl StageError {
    pub fn new(stage: Stage, source: AppError) -> Self {
        Self { stage, source }
    }

    /// Adapter for `map_err`.
    pub fn at(stage: Stage) -> impl FnOnce(AppError) -> StageError {
        move |source| StageError::new(stage, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_stage_maps_to_a_terminal_event() {
        let stages = [
            Stage::Clone,
            Stage::HeadRef,
            Stage::Worktree,
            Stage::Branch,
            Stage::Script,
            Stage::StatusCheck,
            Stage::StageFiles,
            Stage::Commit,
            Stage::Push,
            Stage::PullRequest,
        ];
        let mut events: Vec<Event> = stages.iter().map(|s| s.failure_event()).collect();
        assert!(events.iter().all(|e| e.is_terminal()));
        events.sort();
        events.dedup();
        assert_eq!(events.len(), stages.len());
    }

    #[test]
    fn test_stage_error_display_names_stage_and_cause() {
        let err = StageError::new(Stage::Push, AppError::Git("remote rejected".to_string()));
        let msg = err.to_string();
        assert!(msg.contains("push"));
        assert!(msg.contains("remote rejected"));
    }
}
