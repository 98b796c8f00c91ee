pub mod mutation;
pub mod types;

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::platform::types::{CreatePullRequest, RepositoryRef};
use crate::platform::Platform;
use crate::stats::{Event, RunStats};
use crate::workspace::{git, GitTransport, WorkspaceManager};

pub use mutation::{Mutation, MutationContext, ScriptMutation};
pub use types::{RepoOutcome, Stage, StageError};

/// Per-run values every repo shares.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub branch_name: String,
    pub commit_message: String,
    pub pull_request_title: String,
    pub pull_request_body: String,
    pub dry_run: bool,
    pub author_name: String,
    pub author_email: String,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            branch_name: config.run.branch_name.clone(),
            commit_message: config.run.commit_message.clone(),
            pull_request_title: config.run.pull_request_title.clone(),
            pull_request_body: config.run.pull_request_description.clone(),
            dry_run: config.run.dry_run,
            author_name: config.git.author_name.clone(),
            author_email: config.git.author_email.clone(),
        }
    }
}

/// Clone, branch, mutate, commit, push, open PR: for one repository.
///
/// Every call to [`Pipeline::process`] that returns tags the repo with
/// exactly one terminal event. Remote git work stops once the token passed
/// to `process` is cancelled.
pub struct Pipeline {
    platform: Arc<dyn Platform>,
    transport: Arc<dyn GitTransport>,
    mutation: Arc<dyn Mutation>,
    workspaces: WorkspaceManager,
    settings: PipelineSettings,
    stats: Arc<RunStats>,
}

impl Pipeline {
    pub fn new(
        platform: Arc<dyn Platform>,
        transport: Arc<dyn GitTransport>,
        mutation: Arc<dyn Mutation>,
        workspaces: WorkspaceManager,
        settings: PipelineSettings,
        stats: Arc<RunStats>,
    ) -> Self {
        Self {
            platform,
            transport,
            mutation,
            workspaces,
            settings,
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<RunStats> {
        &self.stats
    }

    pub async fn process(
        &self,
        repo: &RepositoryRef,
        cancel: &CancellationToken,
    ) -> Result<RepoOutcome, StageError> {
        let repo_name = repo.full_name();
        tracing::debug!(repo = %repo_name, mutation = self.mutation.name(), "Processing repo");

        let result = self.run_in_fresh_workspace(repo, cancel).await;

        match &result {
            Ok(outcome) => {
                tracing::info!(repo = %repo_name, outcome = ?outcome, "Repo processed");
                self.stats.track_single(Event::RepoProcessingCompleted, repo);
            }
            Err(e) => {
                tracing::warn!(
                    repo = %repo_name,
                    stage = %e.stage,
                    error = %e.source,
                    "Repo processing failed"
                );
                self.stats.track_single(e.stage.failure_event(), repo);
            }
        }

        result
    }

    async fn run_in_fresh_workspace(
        &self,
        repo: &RepositoryRef,
        cancel: &CancellationToken,
    ) -> Result<RepoOutcome, StageError> {
        let dir = self
            .workspaces
            .create(repo)
            .await
            .map_err(StageError::at(Stage::Clone))?;

        let result = self.run_stages(repo, &dir, cancel).await;

        if let Err(e) = self.workspaces.cleanup(&dir).await {
            tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove working copy");
        }

        result
    }

    async fn run_stages(
        &self,
        repo: &RepositoryRef,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<RepoOutcome, StageError> {
        let repo_name = repo.full_name();
        let settings = &self.settings;

        tracing::debug!(repo = %repo_name, dir = %dir.display(), "Attempting to clone repository");
        self.transport
            .clone_repo(repo, dir, cancel)
            .await
            .map_err(StageError::at(Stage::Clone))?;
        self.stats.track_single(Event::RepoSuccessfullyCloned, repo);

        let head = git::head_ref(dir).await.map_err(StageError::at(Stage::HeadRef))?;
        tracing::debug!(repo = %repo_name, head = %head.name, "Got local repository HEAD");

        let workdir = git::open_worktree(dir)
            .await
            .map_err(StageError::at(Stage::Worktree))?;

        git::create_branch(&workdir, &settings.branch_name, head.oid)
            .await
            .map_err(StageError::at(Stage::Branch))?;
        tracing::debug!(repo = %repo_name, branch = %settings.branch_name, "Checked out new branch");

        let ctx = MutationContext {
            repo,
            workdir: &workdir,
            stats: &self.stats,
            dry_run: settings.dry_run,
        };
        let commit = if self.mutation.apply(&ctx).await? {
            git::commit_all(
                &workdir,
                &settings.commit_message,
                &settings.author_name,
                &settings.author_email,
            )
            .await
            .map_err(StageError::at(Stage::Commit))?
        } else {
            None
        };

        let Some(commit) = commit else {
            tracing::info!(repo = %repo_name, "Worktree unchanged, nothing to commit");
            if settings.dry_run {
                self.stats.track_single(Event::PushBranchSkipped, repo);
            }
            return Ok(RepoOutcome::NoChanges);
        };
        tracing::debug!(repo = %repo_name, commit = %commit, "Committed changes");

        if settings.dry_run {
            tracing::debug!(repo = %repo_name, "Skipping push and pull request for dry run");
            self.stats.track_single(Event::PushBranchSkipped, repo);
            return Ok(RepoOutcome::DryRun);
        }

        self.transport
            .push_branch(&workdir, &settings.branch_name, cancel)
            .await
            .map_err(StageError::at(Stage::Push))?;
        tracing::debug!(repo = %repo_name, branch = %settings.branch_name, "Pushed branch");

        let request = CreatePullRequest {
            title: settings.pull_request_title.clone(),
            body: settings.pull_request_body.clone(),
            head_branch: settings.branch_name.clone(),
            base_branch: repo.default_branch.clone(),
        };
        let pr = self
            .platform
            .create_pull_request(repo, &request)
            .await
            .map_err(StageError::at(Stage::PullRequest))?;

        tracing::info!(repo = %repo_name, pr = pr.number, url = %pr.html_url, "Opened pull request");
        self.stats.track_pull_request(&repo_name, &pr.html_url);

        Ok(RepoOutcome::PullRequestOpened { url: pr.html_url })
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;

    use super::test_support::{repo, LocalTransport, RecordingPlatform};
    use super::*;
    use crate::config::WorkspaceConfig;
    use crate::error::AppError;

    #[derive(Clone, Copy)]
    enum Edit {
        /// Add a new file.
        Write,
        /// Leave the tree alone.
        Nothing,
        /// Report a change but leave the tree identical to HEAD.
        ClaimOnly,
    }

    /// Writes a file named after the repo, or fails for one chosen repo.
    struct WriteFile {
        fail_for: Option<&'static str>,
        edit: Edit,
    }

    impl WriteFile {
        fn edits() -> Self {
            Self { fail_for: None, edit: Edit::Write }
        }
    }

    #[async_trait]
    impl Mutation for WriteFile {
        fn name(&self) -> &str {
            "write-file"
        }

        async fn apply(&self, ctx: &MutationContext<'_>) -> Result<bool, StageError> {
            if self.fail_for == Some(ctx.repo.name.as_str()) {
                return Err(StageError::new(
                    Stage::Script,
                    AppError::Internal("script exploded".to_string()),
                ));
            }
            match self.edit {
                Edit::Nothing => {
                    ctx.stats.track_single(Event::WorktreeStatusClean, ctx.repo);
                    Ok(false)
                }
                Edit::ClaimOnly => Ok(true),
                Edit::Write => {
                    std::fs::write(ctx.workdir.join("touched.txt"), &ctx.repo.name)
                        .map_err(|e| StageError::new(Stage::Script, e.into()))?;
                    git::stage_paths(ctx.workdir, &["touched.txt".to_string()])
                        .await
                        .map_err(StageError::at(Stage::StageFiles))?;
                    ctx.stats.track_single(Event::WorktreeStatusDirty, ctx.repo);
                    Ok(true)
                }
            }
        }
    }

    struct Harness {
        pipeline: Pipeline,
        platform: Arc<RecordingPlatform>,
        transport: Arc<LocalTransport>,
        stats: Arc<RunStats>,
        tmp: tempfile::TempDir,
    }

    impl Harness {
        async fn process(&self, name: &str) -> Result<RepoOutcome, StageError> {
            self.pipeline
                .process(&repo(name), &CancellationToken::new())
                .await
        }

        fn opened(&self) -> usize {
            self.platform.opened.lock().unwrap().len()
        }

        fn pushes(&self) -> usize {
            self.transport.pushes.load(Ordering::SeqCst)
        }
    }

    fn harness_with(
        mutation: WriteFile,
        transport: LocalTransport,
        platform: RecordingPlatform,
        config: AppConfig,
    ) -> Harness {
        let tmp = tempfile::tempdir().unwrap();
        let platform = Arc::new(platform);
        let transport = Arc::new(transport);
        let stats = Arc::new(RunStats::new());

        let pipeline = Pipeline::new(
            platform.clone(),
            transport.clone(),
            Arc::new(mutation),
            WorkspaceManager::new(&WorkspaceConfig {
                base_dir: tmp.path().to_path_buf(),
                keep: false,
            }),
            PipelineSettings::from_config(&config),
            stats.clone(),
        );

        Harness {
            pipeline,
            platform,
            transport,
            stats,
            tmp,
        }
    }

    fn harness(mutation: WriteFile, transport: LocalTransport, dry_run: bool) -> Harness {
        let mut config = AppConfig::default();
        config.run.dry_run = dry_run;
        harness_with(mutation, transport, RecordingPlatform::default(), config)
    }

    #[tokio::test]
    async fn test_changed_repo_is_pushed_and_gets_a_pull_request() {
        let h = harness(WriteFile::edits(), LocalTransport::default(), false);

        let outcome = h.process("alpha").await.unwrap();

        assert_eq!(
            outcome,
            RepoOutcome::PullRequestOpened {
                url: "https://github.com/acme/alpha/pull/1".to_string()
            }
        );
        assert_eq!(h.pushes(), 1);

        let opened = h.platform.opened.lock().unwrap();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].1.head_branch, "repo-fanout");
        assert_eq!(opened[0].1.base_branch, "main");
        drop(opened);

        assert_eq!(h.stats.get_multiple(Event::RepoSuccessfullyCloned).len(), 1);
        assert_eq!(h.stats.get_multiple(Event::WorktreeStatusDirty).len(), 1);
        assert_eq!(
            h.stats.terminal_events_for("acme/alpha"),
            vec![Event::RepoProcessingCompleted]
        );
        assert_eq!(
            h.stats.pull_requests().get("acme/alpha").map(String::as_str),
            Some("https://github.com/acme/alpha/pull/1")
        );
    }

    #[tokio::test]
    async fn test_dry_run_commits_but_never_pushes() {
        let h = harness(WriteFile::edits(), LocalTransport::default(), true);

        let outcome = h.process("alpha").await.unwrap();

        assert_eq!(outcome, RepoOutcome::DryRun);
        assert_eq!(h.pushes(), 0);
        assert_eq!(h.opened(), 0);
        assert_eq!(h.stats.get_multiple(Event::PushBranchSkipped).len(), 1);
        assert!(h.stats.pull_requests().is_empty());
    }

    #[tokio::test]
    async fn test_clean_worktree_skips_commit_and_push() {
        let h = harness(
            WriteFile { fail_for: None, edit: Edit::Nothing },
            LocalTransport::default(),
            false,
        );

        let outcome = h.process("alpha").await.unwrap();

        assert_eq!(outcome, RepoOutcome::NoChanges);
        assert_eq!(h.pushes(), 0);
        assert_eq!(h.stats.get_multiple(Event::WorktreeStatusClean).len(), 1);
        assert!(h.stats.get_multiple(Event::PushBranchSkipped).is_empty());
        assert_eq!(
            h.stats.terminal_events_for("acme/alpha"),
            vec![Event::RepoProcessingCompleted]
        );
    }

    #[tokio::test]
    async fn test_dry_run_with_clean_worktree_is_tagged_push_skipped() {
        let h = harness(
            WriteFile { fail_for: None, edit: Edit::Nothing },
            LocalTransport::default(),
            true,
        );

        let outcome = h.process("alpha").await.unwrap();

        assert_eq!(outcome, RepoOutcome::NoChanges);
        assert_eq!(h.stats.get_multiple(Event::PushBranchSkipped).len(), 1);
        assert_eq!(
            h.stats.terminal_events_for("acme/alpha"),
            vec![Event::RepoProcessingCompleted]
        );
    }

    #[tokio::test]
    async fn test_identical_tree_is_not_committed_or_pushed() {
        let h = harness(
            WriteFile { fail_for: None, edit: Edit::ClaimOnly },
            LocalTransport::default(),
            false,
        );

        let outcome = h.process("alpha").await.unwrap();

        assert_eq!(outcome, RepoOutcome::NoChanges);
        assert_eq!(h.pushes(), 0);
        assert_eq!(h.opened(), 0);
    }

    #[tokio::test]
    async fn test_script_failure_stops_before_commit() {
        let h = harness(
            WriteFile { fail_for: Some("beta"), edit: Edit::Write },
            LocalTransport::default(),
            false,
        );

        let err = h.process("beta").await.unwrap_err();

        assert_eq!(err.stage, Stage::Script);
        assert_eq!(h.pushes(), 0);
        assert_eq!(h.opened(), 0);
        assert_eq!(
            h.stats.terminal_events_for("acme/beta"),
            vec![Event::ScriptErrorDuringExecution]
        );
    }

    #[tokio::test]
    async fn test_clone_failure_is_tagged() {
        let transport = LocalTransport {
            fail_clone_for: Some("gamma".to_string()),
            ..Default::default()
        };
        let h = harness(WriteFile::edits(), transport, false);

        let err = h.process("gamma").await.unwrap_err();

        assert_eq!(err.stage, Stage::Clone);
        assert!(h.stats.get_multiple(Event::RepoSuccessfullyCloned).is_empty());
        assert_eq!(
            h.stats.terminal_events_for("acme/gamma"),
            vec![Event::RepoFailedToClone]
        );
    }

    #[tokio::test]
    async fn test_unborn_head_is_tagged() {
        let transport = LocalTransport {
            empty_clone: true,
            ..Default::default()
        };
        let h = harness(WriteFile::edits(), transport, false);

        let err = h.process("alpha").await.unwrap_err();

        assert_eq!(err.stage, Stage::HeadRef);
        assert_eq!(h.stats.get_multiple(Event::RepoSuccessfullyCloned).len(), 1);
        assert_eq!(
            h.stats.terminal_events_for("acme/alpha"),
            vec![Event::GetHeadRefFailed]
        );
    }

    #[tokio::test]
    async fn test_branch_clashing_with_default_branch_is_tagged() {
        let mut config = AppConfig::default();
        config.run.branch_name = "main".to_string();
        let h = harness_with(
            WriteFile::edits(),
            LocalTransport::default(),
            RecordingPlatform::default(),
            config,
        );

        let err = h.process("alpha").await.unwrap_err();

        assert_eq!(err.stage, Stage::Branch);
        assert!(h.stats.get_multiple(Event::WorktreeStatusDirty).is_empty());
        assert_eq!(
            h.stats.terminal_events_for("acme/alpha"),
            vec![Event::BranchCheckoutFailed]
        );
    }

    #[tokio::test]
    async fn test_push_failure_skips_pull_request() {
        let transport = LocalTransport {
            fail_push: true,
            ..Default::default()
        };
        let h = harness(WriteFile::edits(), transport, false);

        let err = h.process("alpha").await.unwrap_err();

        assert_eq!(err.stage, Stage::Push);
        assert_eq!(h.pushes(), 1);
        assert_eq!(h.opened(), 0);
        assert_eq!(
            h.stats.terminal_events_for("acme/alpha"),
            vec![Event::PushBranchFailed]
        );
    }

    #[tokio::test]
    async fn test_pull_request_failure_records_no_url() {
        let platform = RecordingPlatform {
            fail_pull_requests: true,
            ..Default::default()
        };
        let h = harness_with(
            WriteFile::edits(),
            LocalTransport::default(),
            platform,
            AppConfig::default(),
        );

        let err = h.process("alpha").await.unwrap_err();

        assert_eq!(err.stage, Stage::PullRequest);
        assert_eq!(h.pushes(), 1);
        assert_eq!(h.opened(), 1);
        assert!(h.stats.pull_requests().is_empty());
        assert_eq!(
            h.stats.terminal_events_for("acme/alpha"),
            vec![Event::PullRequestOpenError]
        );
    }

    #[tokio::test]
    async fn test_working_copy_removed_when_not_kept() {
        let h = harness(WriteFile::edits(), LocalTransport::default(), true);
        h.process("alpha").await.unwrap();

        let leftover = std::fs::read_dir(h.tmp.path()).unwrap().count();
        assert_eq!(leftover, 0);
    }
}
