use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::platform::types::RepositoryRef;
use crate::select::allowed::AllowedRepo;

use super::Event;

/// Frozen view of a run, produced by [`super::RunStats::snapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    /// Only events with at least one repo, in taxonomy order.
    pub events: BTreeMap<Event, Vec<RepositoryRef>>,
    pub pull_requests: BTreeMap<String, String>,
    pub file_provided_repos: Vec<AllowedRepo>,
}

impl RunReport {
    pub fn repos_for(&self, event: Event) -> &[RepositoryRef] {
        self.events.get(&event).map(Vec::as_slice).unwrap_or_default()
    }

    /// Human-readable summary. Events nobody hit are left out.
    pub fn render(&self) -> String {
        self.to_string()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

const RULE: &str = "*****************************************************************";

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{RULE}")?;
        writeln!(f, "  REPO-FANOUT RUN SUMMARY")?;
        writeln!(
            f,
            "  started {}  finished {}{}",
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
            if self.dry_run { "  (dry run)" } else { "" }
        )?;
        writeln!(f, "{RULE}")?;

        if !self.file_provided_repos.is_empty() {
            writeln!(
                f,
                "\nRepos supplied via allowed repos file ({})",
                self.file_provided_repos.len()
            )?;
            for allowed in &self.file_provided_repos {
                writeln!(f, "  {}/{}", allowed.organization, allowed.name)?;
            }
        }

        for (event, repos) in self.events.iter().filter(|(_, repos)| !repos.is_empty()) {
            writeln!(f, "\n{} ({})", event.description(), repos.len())?;
            writeln!(f, "  [{event}]")?;
            for repo in repos {
                let full_name = repo.full_name();
                match self.pull_requests.get(&full_name) {
                    Some(url) if *event == Event::RepoProcessingCompleted => {
                        writeln!(f, "  {full_name}  {url}")?
                    }
                    _ => writeln!(f, "  {full_name}")?,
                }
            }
        }

        if !self.pull_requests.is_empty() {
            writeln!(f, "\nPull requests opened ({})", self.pull_requests.len())?;
            for (repo, url) in &self.pull_requests {
                writeln!(f, "  {repo}  {url}")?;
            }
        }

        Ok(())
    }
}
