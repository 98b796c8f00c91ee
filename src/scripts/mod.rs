//! Validation of the user-supplied scripts that get run against every repo.

pub mod exec;

use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

/// A single validated, owner-executable script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub path: PathBuf,
}

impl Script {
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Ordered scripts. Insertion order is execution order.
#[derive(Debug, Clone, Default)]
pub struct ScriptCollection {
    scripts: Vec<Script>,
}

impl ScriptCollection {
    pub fn add(&mut self, script: Script) {
        self.scripts.push(script);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Script> {
        self.scripts.iter()
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

/// Returns true if `mode` grants execute permission to the file's owner.
pub fn is_executable_by_owner(mode: u32) -> bool {
    mode & 0o100 != 0
}

#[cfg(unix)]
fn owner_can_execute(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    is_executable_by_owner(metadata.permissions().mode())
}

#[cfg(not(unix))]
fn owner_can_execute(_metadata: &std::fs::Metadata) -> bool {
    true
}

/// Find `base_dir/identifier`, falling back to `base_dir/identifier.sh` for bare names.
fn resolve_script(base_dir: &Path, identifier: &str) -> Option<PathBuf> {
    let direct = base_dir.join(identifier);
    if direct.is_file() {
        return Some(direct);
    }

    if Path::new(identifier).extension().is_none() {
        let with_sh = base_dir.join(format!("{identifier}.sh"));
        if with_sh.is_file() {
            return Some(with_sh);
        }
    }

    None
}

/// Validate every identifier and package the survivors into a `ScriptCollection`.
///
/// Fails on an empty list, on the first script lacking the owner-execute bit,
/// and when any identifier could not be found. A partial collection is never
/// returned.
pub fn verify_scripts(identifiers: &[String], base_dir: &Path) -> Result<ScriptCollection> {
    let mut collection = ScriptCollection::default();
    let mut missing = Vec::new();

    let identifiers: Vec<&str> = identifiers
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();

    if identifiers.is_empty() {
        return Err(AppError::NoScripts);
    }

    for identifier in identifiers {
        let Some(path) = resolve_script(base_dir, identifier) else {
            tracing::warn!(
                script = identifier,
                base_dir = %base_dir.display(),
                "Script not found"
            );
            missing.push(identifier.to_string());
            continue;
        };

        // Opening proves readability, not just existence.
        let file = std::fs::File::open(&path)?;
        let metadata = file.metadata()?;

        if !owner_can_execute(&metadata) {
            tracing::warn!(script = %path.display(), "Script is not executable by its owner");
            return Err(AppError::ScriptNotExecutable(path));
        }

        let path = path.canonicalize()?;
        tracing::debug!(script = %path.display(), "Verified script");
        collection.add(Script { path });
    }

    if !missing.is_empty() {
        return Err(AppError::ScriptsNotFound {
            base_dir: base_dir.to_path_buf(),
            names: missing,
        });
    }

    Ok(collection)
}
