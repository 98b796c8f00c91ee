use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One `organization/name` entry from the allowed repos file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedRepo {
    pub organization: String,
    pub name: String,
}

/// Parse allowed repos, one `org/name` per line.
///
/// Whitespace and stray `'` `"` `,` `!` characters are stripped. Lines
/// missing either the organization or the name are skipped.
pub fn parse_allowed_repos(contents: &str) -> Vec<AllowedRepo> {
    contents
        .lines()
        .filter_map(|line| {
            let cleaned: String = line
                .trim()
                .chars()
                .filter(|c| !matches!(c, '\'' | '"' | ',' | '!'))
                .collect();

            let mut parts = cleaned.split('/');
            let organization = parts.next()?.trim();
            let name = parts.next()?.trim();

            if organization.is_empty() || name.is_empty() {
                return None;
            }

            Some(AllowedRepo {
                organization: organization.to_string(),
                name: name.to_string(),
            })
        })
        .collect()
}

pub async fn read_allowed_repos(path: &Path) -> Result<Vec<AllowedRepo>> {
    let contents = tokio::fs::read_to_string(path).await?;
    let repos = parse_allowed_repos(&contents);
    tracing::debug!(path = %path.display(), count = repos.len(), "Read allowed repos file");
    Ok(repos)
}
