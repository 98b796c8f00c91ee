//! Selection of the repositories a run operates on.
//!
//! Repos come either from an allowed repos file (preferred) or from paging
//! through every repo of a GitHub organization. Both paths produce the same
//! `RepositoryRef` list so the rest of the run never cares which was used.

pub mod allowed;

use std::collections::HashSet;

use crate::error::{AppError, Result};
use crate::platform::types::RepositoryRef;
use crate::platform::Platform;
use crate::stats::{Event, RunStats};

use allowed::AllowedRepo;

/// Resolve the target repositories, tagging them as selected.
pub async fn resolve_repos(
    platform: &dyn Platform,
    org: Option<&str>,
    allowed: &[AllowedRepo],
    stats: &RunStats,
) -> Result<Vec<RepositoryRef>> {
    let repos = if !allowed.is_empty() {
        tracing::debug!("Allowed repos were provided via file, preferring them over the organization");
        get_file_defined_repos(platform, allowed, stats).await
    } else if let Some(org) = org.filter(|o| !o.is_empty()) {
        get_repos_by_org(platform, org, stats).await?
    } else {
        return Err(AppError::NoRepoSelector);
    };

    let mut seen = HashSet::new();
    let repos: Vec<RepositoryRef> = repos
        .into_iter()
        .filter(|r| seen.insert(r.full_name()))
        .collect();

    stats.track_multiple(Event::ReposSelected, &repos);

    for repo in &repos {
        tracing::debug!(repo = %repo.full_name(), "Repo will have all targeted scripts run against it");
    }

    Ok(repos)
}

/// Look up every allow-listed repo. Failed lookups drop only that entry.
pub async fn get_file_defined_repos(
    platform: &dyn Platform,
    allowed: &[AllowedRepo],
    stats: &RunStats,
) -> Vec<RepositoryRef> {
    let mut repos = Vec::with_capacity(allowed.len());

    for entry in allowed {
        tracing::debug!(
            organization = %entry.organization,
            name = %entry.name,
            "Looking up allowed repo"
        );

        match platform.get_repo(&entry.organization, &entry.name).await {
            Ok(repo) => {
                stats.track_single(Event::FetchedViaGithubApi, &repo);
                repos.push(repo);
            }
            Err(AppError::NotFound(msg)) => {
                tracing::warn!(
                    organization = %entry.organization,
                    name = %entry.name,
                    error = %msg,
                    "Allowed repo does not exist"
                );
                stats.track_single(
                    Event::RepoNotExists,
                    &RepositoryRef::missing(&entry.organization, &entry.name),
                );
            }
            Err(e) => {
                tracing::warn!(
                    organization = %entry.organization,
                    name = %entry.name,
                    error = %e,
                    "Error looking up allowed repo"
                );
                stats.track_single(
                    Event::RepoLookupFailed,
                    &RepositoryRef::missing(&entry.organization, &entry.name),
                );
            }
        }
    }

    repos
}

/// Page through every repo of `org`.
pub async fn get_repos_by_org(
    platform: &dyn Platform,
    org: &str,
    stats: &RunStats,
) -> Result<Vec<RepositoryRef>> {
    let mut all_repos = Vec::new();
    let mut page = 1;

    loop {
        let listing = platform.list_org_repos_page(org, page).await?;
        all_repos.extend(listing.repos);
        match listing.next_page {
            Some(next) if next > page => page = next,
            Some(next) => {
                tracing::warn!(org = org, page = page, next = next, "Listing pointed backwards, stopping");
                break;
            }
            None => break,
        }
    }

    if all_repos.is_empty() {
        return Err(AppError::NoRepositoriesFound(org.to_string()));
    }

    tracing::info!(org = org, count = all_repos.len(), "Fetched repos from GitHub organization");

    stats.track_multiple(Event::FetchedViaGithubApi, &all_repos);

    Ok(all_repos)
}
