//! Fans a [`Pipeline`] out over many repositories.
//!
//! One task per repo, at most `max_concurrent` running at once, each bounded
//! by a timeout and the run-wide cancellation token. Each repo gets a child
//! token that is cancelled as soon as its task ends, so git work left on a
//! blocking thread stops too. Returns only after every task has finished.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::pipeline::Pipeline;
use crate::platform::types::RepositoryRef;
use crate::stats::Event;

#[derive(Debug, Clone, Copy)]
pub struct FanoutLimits {
    pub max_concurrent: usize,
    pub repo_timeout: Duration,
}

/// How many repos ended in success vs. anything else.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutSummary {
    pub succeeded: usize,
    pub failed: usize,
}

pub async fn run_pipelines(
    pipeline: Arc<Pipeline>,
    repos: Vec<RepositoryRef>,
    limits: FanoutLimits,
    cancel: CancellationToken,
) -> FanoutSummary {
    let semaphore = Arc::new(Semaphore::new(limits.max_concurrent.max(1)));
    let mut handles = Vec::with_capacity(repos.len());

    tracing::info!(
        repos = repos.len(),
        max_concurrent = limits.max_concurrent.max(1),
        "Processing repositories"
    );

    for repo in repos {
        let pipeline = Arc::clone(&pipeline);
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();
        let task_repo = repo.clone();

        let handle = tokio::spawn(async move {
            process_one(pipeline, task_repo, semaphore, limits.repo_timeout, cancel).await
        });
        handles.push((repo, handle));
    }

    let mut summary = FanoutSummary::default();
    for (repo, handle) in handles {
        match handle.await {
            Ok(true) => summary.succeeded += 1,
            Ok(false) => summary.failed += 1,
            Err(e) => {
                tracing::error!(repo = %repo.full_name(), error = %e, "Repo task aborted");
                pipeline.stats().track_single(Event::RepoPipelineAborted, &repo);
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        "Finished processing repositories"
    );
    summary
}

async fn process_one(
    pipeline: Arc<Pipeline>,
    repo: RepositoryRef,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
    cancel: CancellationToken,
) -> bool {
    let stats = Arc::clone(pipeline.stats());
    let repo_cancel = cancel.child_token();
    let _stop_git_work = repo_cancel.clone().drop_guard();

    let _permit = tokio::select! {
        permit = semaphore.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(e) => {
                tracing::error!(repo = %repo.full_name(), error = %e, "Concurrency limiter closed");
                stats.track_single(Event::RepoPipelineAborted, &repo);
                return false;
            }
        },
        _ = cancel.cancelled() => {
            tracing::debug!(repo = %repo.full_name(), "Cancelled before start");
            stats.track_single(Event::RepoProcessingCancelled, &repo);
            return false;
        }
    };

    tokio::select! {
        result = tokio::time::timeout(timeout, pipeline.process(&repo, &repo_cancel)) => match result {
            Ok(outcome) => outcome.is_ok(),
            Err(_) => {
                tracing::warn!(
                    repo = %repo.full_name(),
                    timeout_secs = timeout.as_secs(),
                    "Repo processing timed out"
                );
                stats.track_single(Event::RepoTimedOut, &repo);
                false
            }
        },
        _ = cancel.cancelled() => {
            tracing::warn!(repo = %repo.full_name(), "Repo processing cancelled");
            stats.track_single(Event::RepoProcessingCancelled, &repo);
            false
        }
    }
}
