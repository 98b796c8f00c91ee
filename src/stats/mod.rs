//! Run-wide tracking of what happened to every repository.
//!
//! [`RunStats`] is written concurrently by every pipeline task. All access
//! goes through a single mutex; nothing holds the lock across an `.await`.

pub mod report;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::platform::types::RepositoryRef;
use crate::select::allowed::AllowedRepo;

pub use report::RunReport;

/// A tracked occurrence. Each variant names exactly one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Event {
    FetchedViaGithubApi,
    ReposSelected,
    RepoNotExists,
    RepoLookupFailed,
    RepoSuccessfullyCloned,
    RepoFailedToClone,
    GetHeadRefFailed,
    WorktreeUnavailable,
    BranchCheckoutFailed,
    ScriptErrorDuringExecution,
    WorktreeStatusCheckFailed,
    WorktreeStatusDirty,
    WorktreeStatusClean,
    WorktreeAddFileFailed,
    CommitChangesFailed,
    PushBranchFailed,
    PushBranchSkipped,
    PullRequestOpenError,
    RepoTimedOut,
    RepoProcessingCancelled,
    RepoPipelineAborted,
    RepoProcessingCompleted,
}

impl Event {
    /// Every event, in report order.
    pub const ALL: [Event; 22] = [
        Event::FetchedViaGithubApi,
        Event::ReposSelected,
        Event::RepoNotExists,
        Event::RepoLookupFailed,
        Event::RepoSuccessfullyCloned,
        Event::RepoFailedToClone,
        Event::GetHeadRefFailed,
        Event::WorktreeUnavailable,
        Event::BranchCheckoutFailed,
        Event::ScriptErrorDuringExecution,
        Event::WorktreeStatusCheckFailed,
        Event::WorktreeStatusDirty,
        Event::WorktreeStatusClean,
        Event::WorktreeAddFileFailed,
        Event::CommitChangesFailed,
        Event::PushBranchFailed,
        Event::PushBranchSkipped,
        Event::PullRequestOpenError,
        Event::RepoTimedOut,
        Event::RepoProcessingCancelled,
        Event::RepoPipelineAborted,
        Event::RepoProcessingCompleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Event::FetchedViaGithubApi => "fetch-via-github-api",
            Event::ReposSelected => "repos-selected-pre-processing",
            Event::RepoNotExists => "repo-not-exists",
            Event::RepoLookupFailed => "repo-lookup-failed",
            Event::RepoSuccessfullyCloned => "repo-successfully-cloned",
            Event::RepoFailedToClone => "repo-failed-to-clone",
            Event::GetHeadRefFailed => "get-head-ref-failed",
            Event::WorktreeUnavailable => "worktree-unavailable",
            Event::BranchCheckoutFailed => "branch-checkout-failed",
            Event::ScriptErrorDuringExecution => "script-error-during-execution",
            Event::WorktreeStatusCheckFailed => "worktree-status-check-failed",
            Event::WorktreeStatusDirty => "worktree-status-dirty",
            Event::WorktreeStatusClean => "worktree-status-clean",
            Event::WorktreeAddFileFailed => "worktree-add-file-failed",
            Event::CommitChangesFailed => "commit-changes-failed",
            Event::PushBranchFailed => "push-branch-failed",
            Event::PushBranchSkipped => "push-branch-skipped",
            Event::PullRequestOpenError => "pull-request-open-error",
            Event::RepoTimedOut => "repo-timed-out",
            Event::RepoProcessingCancelled => "repo-processing-cancelled",
            Event::RepoPipelineAborted => "repo-pipeline-aborted",
            Event::RepoProcessingCompleted => "repo-processing-completed",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Event::FetchedViaGithubApi => "Repos successfully fetched via GitHub API",
            Event::ReposSelected => {
                "All repos that were targeted for processing AFTER filtering missing / malformed repos"
            }
            Event::RepoNotExists => {
                "Repos that were passed via file but don't exist (404'd) via GitHub API"
            }
            Event::RepoLookupFailed => {
                "Repos that were passed via file but could not be looked up due to an API error"
            }
            Event::RepoSuccessfullyCloned => {
                "Repos that were successfully cloned to the local filesystem"
            }
            Event::RepoFailedToClone => "Repos that were unable to be cloned to the local filesystem",
            Event::GetHeadRefFailed => "Repos for which the HEAD git reference could not be obtained",
            Event::WorktreeUnavailable => "Repos whose local working tree could not be opened",
            Event::BranchCheckoutFailed => {
                "Repos for which checking out a new tool-specific branch failed"
            }
            Event::ScriptErrorDuringExecution => {
                "Repos for which at least one script raised an error during execution"
            }
            Event::WorktreeStatusCheckFailed => {
                "Repos for which the git status check failed following script execution"
            }
            Event::WorktreeStatusDirty => {
                "Repos that showed file changes to their working directory following script execution"
            }
            Event::WorktreeStatusClean => {
                "Repos that showed NO file changes to their working directory following script execution"
            }
            Event::WorktreeAddFileFailed => {
                "Repos for which at least one new file could not be added to the git stage"
            }
            Event::CommitChangesFailed => "Repos whose file changes failed to be committed",
            Event::PushBranchFailed => {
                "Repos whose tool-specific branch containing changes failed to push to remote origin"
            }
            Event::PushBranchSkipped => {
                "Repos whose local branch was not pushed because the --dry-run flag was set"
            }
            Event::PullRequestOpenError => "Repos against which pull requests failed to be opened",
            Event::RepoTimedOut => "Repos whose processing exceeded the per-repo deadline",
            Event::RepoProcessingCancelled => "Repos whose processing was cancelled by a shutdown signal",
            Event::RepoPipelineAborted => "Repos whose processing task aborted unexpectedly",
            Event::RepoProcessingCompleted => "Repos that were processed to completion",
        }
    }

    /// Whether this event ends a repository's pipeline.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            Event::FetchedViaGithubApi
                | Event::ReposSelected
                | Event::RepoNotExists
                | Event::RepoLookupFailed
                | Event::RepoSuccessfullyCloned
                | Event::WorktreeStatusDirty
                | Event::WorktreeStatusClean
                | Event::PushBranchSkipped
        )
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct StatsInner {
    /// Event -> (full name -> repo). Keyed by full name so repeated tagging is a no-op.
    repos: HashMap<Event, BTreeMap<String, RepositoryRef>>,
    /// Full name -> pull request URL.
    pulls: BTreeMap<String, String>,
    file_provided_repos: Vec<AllowedRepo>,
    dry_run: bool,
}

/// Keeps score of which repos were touched and how.
#[derive(Debug)]
pub struct RunStats {
    started_at: DateTime<Utc>,
    inner: Mutex<StatsInner>,
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            inner: Mutex::new(StatsInner::default()),
        }
    }

    // Writers never leave the maps half-updated; poison is ignored.
    fn lock(&self) -> MutexGuard<'_, StatsInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_dry_run(&self, dry_run: bool) {
        self.lock().dry_run = dry_run;
    }

    /// Record the repos the user supplied via allow-list file.
    pub fn set_file_provided_repos(&self, repos: &[AllowedRepo]) {
        self.lock().file_provided_repos.extend_from_slice(repos);
    }

    /// Associate `repo` with `event`. Repeated calls for the same repo are no-ops.
    pub fn track_single(&self, event: Event, repo: &RepositoryRef) {
        self.lock()
            .repos
            .entry(event)
            .or_default()
            .entry(repo.full_name())
            .or_insert_with(|| repo.clone());
    }

    pub fn track_multiple(&self, event: Event, repos: &[RepositoryRef]) {
        let mut inner = self.lock();
        let tracked = inner.repos.entry(event).or_default();
        for repo in repos {
            tracked
                .entry(repo.full_name())
                .or_insert_with(|| repo.clone());
        }
    }

    pub fn track_pull_request(&self, full_name: &str, url: &str) {
        self.lock()
            .pulls
            .insert(full_name.to_string(), url.to_string());
    }

    /// Repos tagged with `event`, sorted by full name.
    pub fn get_multiple(&self, event: Event) -> Vec<RepositoryRef> {
        self.lock()
            .repos
            .get(&event)
            .map(|tracked| tracked.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn pull_requests(&self) -> BTreeMap<String, String> {
        self.lock().pulls.clone()
    }

    /// Terminal events recorded for one repo, in report order.
    pub fn terminal_events_for(&self, full_name: &str) -> Vec<Event> {
        let inner = self.lock();
        Event::ALL
            .iter()
            .copied()
            .filter(|e| e.is_terminal())
            .filter(|e| {
                inner
                    .repos
                    .get(e)
                    .is_some_and(|tracked| tracked.contains_key(full_name))
            })
            .collect()
    }

    /// Freeze the current state into a report.
    pub fn snapshot(&self) -> RunReport {
        let inner = self.lock();
        let events = Event::ALL
            .iter()
            .filter_map(|event| {
                inner
                    .repos
                    .get(event)
                    .filter(|tracked| !tracked.is_empty())
                    .map(|tracked| (*event, tracked.values().cloned().collect()))
            })
            .collect();

        RunReport {
            started_at: self.started_at,
            finished_at: Utc::now(),
            dry_run: inner.dry_run,
            events,
            pull_requests: inner.pulls.clone(),
            file_provided_repos: inner.file_provided_repos.clone(),
        }
    }
}
