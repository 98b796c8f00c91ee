use std::path::{Path, PathBuf};
use std::time::Duration;

use git2::{
    build::RepoBuilder, Cred, FetchOptions, Oid, PushOptions, RemoteCallbacks, Repository,
    Signature, Status, StatusOptions,
};

use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};

/// Reject empty branch names and names that look like options.
pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(AppError::Git("Branch name must not be empty".to_string()));
    }
    if name.starts_with('-') {
        return Err(AppError::Git(format!(
            "Invalid branch name (starts with '-'): {name}"
        )));
    }
    Ok(())
}

/// Only HTTPS remotes (token auth) and local `file://` remotes are cloned.
pub fn validate_clone_url(url: &str) -> Result<()> {
    if url.starts_with("https://") || url.starts_with("file://") {
        Ok(())
    } else {
        Err(AppError::Git(format!(
            "Expected HTTPS clone URL, got: {url}"
        )))
    }
}

/// Bound libgit2's connect and read timeouts for every later network call.
///
/// Must run before any git operation is started.
pub fn configure_network_timeouts(timeout: Duration) -> Result<()> {
    let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
    // SAFETY: libgit2 global options are only written here, at startup,
    // before any thread touches libgit2.
    unsafe {
        git2::opts::set_server_connect_timeout_in_milliseconds(millis)?;
        git2::opts::set_server_timeout_in_milliseconds(millis)?;
    }
    Ok(())
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(AppError::Cancelled)
    } else {
        Ok(())
    }
}

/// Build `FetchOptions` that authenticate via credential callback and stop
/// transferring once `cancel` fires.
/// The token is captured by the closure and never written to disk.
fn make_fetch_options<'a>(token: &'a str, cancel: &'a CancellationToken) -> FetchOptions<'a> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, _username_from_url, _allowed_types| {
        Cred::userpass_plaintext("x-access-token", token)
    });
    callbacks.transfer_progress(move |_progress| !cancel.is_cancelled());
    callbacks.sideband_progress(move |_data| !cancel.is_cancelled());
    let mut opts = FetchOptions::new();
    opts.remote_callbacks(callbacks);
    opts
}

/// Build `PushOptions` that authenticate via credential callback, turn
/// server-side ref rejections into errors and abort once `cancel` fires.
fn make_push_options<'a>(token: &'a str, cancel: &'a CancellationToken) -> PushOptions<'a> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, _username_from_url, _allowed_types| {
        Cred::userpass_plaintext("x-access-token", token)
    });
    callbacks.push_negotiation(move |_updates| {
        if cancel.is_cancelled() {
            Err(git2::Error::from_str("push cancelled"))
        } else {
            Ok(())
        }
    });
    callbacks.sideband_progress(move |_data| !cancel.is_cancelled());
    callbacks.push_update_reference(|refname, status| match status {
        Some(reason) => Err(git2::Error::from_str(&format!(
            "Remote rejected {refname}: {reason}"
        ))),
        None => Ok(()),
    });
    let mut opts = PushOptions::new();
    opts.remote_callbacks(callbacks);
    opts
}

/// HEAD of a local clone.
#[derive(Debug, Clone)]
pub struct HeadRef {
    pub name: String,
    pub oid: Oid,
}

/// Result of a `git status` over the working tree.
#[derive(Debug, Clone, Default)]
pub struct WorktreeStatus {
    /// Paths not yet known to the index.
    pub untracked: Vec<String>,
    /// Number of entries differing from HEAD in any way.
    pub changed: usize,
}

impl WorktreeStatus {
    pub fn is_clean(&self) -> bool {
        self.changed == 0
    }
}

/// Clone a repository into the target directory, checking out `branch`.
///
/// The remote URL stored in `.git/config` will be the **plain** URL
/// (no credentials). Authentication is handled via credential callback only.
///
/// The transfer aborts with `AppError::Cancelled` once `cancel` fires.
pub async fn clone(
    url: &str,
    branch: &str,
    target: &Path,
    token: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    validate_clone_url(url)?;
    ensure_not_cancelled(cancel)?;

    let url = url.to_string();
    let branch = branch.to_string();
    let target = target.to_path_buf();
    let token = token.to_string();
    let cancel = cancel.clone();

    tokio::task::spawn_blocking(move || {
        let fetch_opts = make_fetch_options(&token, &cancel);
        let mut builder = RepoBuilder::new();
        builder.fetch_options(fetch_opts);
        if !branch.is_empty() {
            builder.branch(&branch);
        }
        match builder.clone(&url, &target) {
            Ok(_) => Ok(()),
            Err(_) if cancel.is_cancelled() => Err(AppError::Cancelled),
            Err(e) => Err(e.into()),
        }
    })
    .await
    .map_err(|e| AppError::Git(format!("Clone task panicked: {e}")))?
}

/// Look up the HEAD reference of a local clone.
pub async fn head_ref(dir: &Path) -> Result<HeadRef> {
    let dir = dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let head = repo.head()?;
        let oid = head
            .target()
            .ok_or_else(|| AppError::Git("HEAD is not a direct reference".to_string()))?;
        Ok(HeadRef {
            name: head.name().unwrap_or("HEAD").to_string(),
            oid,
        })
    })
    .await
    .map_err(|e| AppError::Git(format!("Head-ref task panicked: {e}")))?
}

/// Return the working tree root of a non-bare clone.
pub async fn open_worktree(dir: &Path) -> Result<PathBuf> {
    let dir = dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        repo.workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| AppError::Git(format!("{} has no working tree", dir.display())))
    })
    .await
    .map_err(|e| AppError::Git(format!("Worktree task panicked: {e}")))?
}

/// Create a new branch at `at` and check it out.
pub async fn create_branch(dir: &Path, branch_name: &str, at: Oid) -> Result<()> {
    validate_branch_name(branch_name)?;

    let dir = dir.to_path_buf();
    let branch_name = branch_name.to_string();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let commit = repo.find_commit(at)?;
        repo.branch(&branch_name, &commit, false)?;
        let refname = format!("refs/heads/{branch_name}");
        let obj = repo.revparse_single(&refname)?;
        repo.checkout_tree(&obj, None)?;
        repo.set_head(&refname)?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Git(format!("Create-branch task panicked: {e}")))?
}

/// Query the working tree status, including untracked files.
pub async fn worktree_status(dir: &Path) -> Result<WorktreeStatus> {
    let dir = dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = repo.statuses(Some(&mut opts))?;

        let untracked = statuses
            .iter()
            .filter(|entry| entry.status().contains(Status::WT_NEW))
            .filter_map(|entry| entry.path().map(str::to_string))
            .collect();

        Ok(WorktreeStatus {
            untracked,
            changed: statuses.len(),
        })
    })
    .await
    .map_err(|e| AppError::Git(format!("Status task panicked: {e}")))?
}

/// Add specific paths (relative to the worktree root) to the index.
pub async fn stage_paths(dir: &Path, paths: &[String]) -> Result<()> {
    let dir = dir.to_path_buf();
    let paths = paths.to_vec();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let mut index = repo.index()?;
        for path in &paths {
            index.add_path(Path::new(path))?;
        }
        index.write()?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Git(format!("Stage task panicked: {e}")))?
}

/// Commit everything staged plus every modified or deleted tracked file.
///
/// Returns `None` without committing when the resulting tree is identical
/// to HEAD's.
pub async fn commit_all(
    dir: &Path,
    message: &str,
    author_name: &str,
    author_email: &str,
) -> Result<Option<Oid>> {
    let dir = dir.to_path_buf();
    let message = message.to_string();
    let author_name = author_name.to_string();
    let author_email = author_email.to_string();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let sig = Signature::now(&author_name, &author_email)?;
        let mut index = repo.index()?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        let tree_oid = index.write_tree()?;
        let tree = repo.find_tree(tree_oid)?;
        let head = repo.head()?;
        let parent = head.peel_to_commit()?;
        if parent.tree_id() == tree_oid {
            return Ok(None);
        }
        let oid = repo.commit(Some("HEAD"), &sig, &sig, &message, &tree, &[&parent])?;
        Ok(Some(oid))
    })
    .await
    .map_err(|e| AppError::Git(format!("Commit task panicked: {e}")))?
}

/// Push the branch to origin, aborting with `AppError::Cancelled` once
/// `cancel` fires.
pub async fn push(
    dir: &Path,
    branch_name: &str,
    token: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    validate_branch_name(branch_name)?;
    ensure_not_cancelled(cancel)?;

    let dir = dir.to_path_buf();
    let branch_name = branch_name.to_string();
    let token = token.to_string();
    let cancel = cancel.clone();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let mut remote = repo.find_remote("origin")?;
        let refspec = format!("refs/heads/{branch_name}:refs/heads/{branch_name}");
        let mut push_opts = make_push_options(&token, &cancel);
        match remote.push(&[&refspec], Some(&mut push_opts)) {
            Ok(()) => Ok(()),
            Err(_) if cancel.is_cancelled() => Err(AppError::Cancelled),
            Err(e) => Err(e.into()),
        }
    })
    .await
    .map_err(|e| AppError::Git(format!("Push task panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Bare origin with a single commit on `main`, addressable by `file://` URL.
    fn init_origin(dir: &Path) -> String {
        let repo = Repository::init_bare(dir).unwrap();
        let sig = Signature::now("test", "test@example.com").unwrap();
        let blob = repo.blob(b"# fixture\n").unwrap();
        let mut builder = repo.treebuilder(None).unwrap();
        builder.insert("README.md", blob, 0o100644).unwrap();
        let tree = repo.find_tree(builder.write().unwrap()).unwrap();
        repo.commit(Some("refs/heads/main"), &sig, &sig, "init", &tree, &[])
            .unwrap();
        repo.set_head("refs/heads/main").unwrap();
        format!("file://{}", dir.display())
    }

    #[test]
    fn test_validate_branch_name_rejects_dash_prefix() {
        assert!(validate_branch_name("-evil").is_err());
        assert!(validate_branch_name("--upload-pack").is_err());
        assert!(validate_branch_name("").is_err());
    }

    #[test]
    fn test_validate_branch_name_accepts_normal() {
        assert!(validate_branch_name("main").is_ok());
        assert!(validate_branch_name("feature/my-branch").is_ok());
        assert!(validate_branch_name("repo-fanout").is_ok());
    }

    #[test]
    fn test_validate_clone_url() {
        assert!(validate_clone_url("https://github.com/o/r.git").is_ok());
        assert!(validate_clone_url("file:///tmp/origin").is_ok());
        assert!(validate_clone_url("git@github.com:owner/repo.git").is_err());
    }

    #[tokio::test]
    async fn test_clone_rejects_non_https() {
        let result = clone(
            "git@github.com:owner/repo.git",
            "main",
            Path::new("/tmp/test"),
            "token",
            &CancellationToken::new(),
        )
        .await;
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Expected HTTPS clone URL"));
    }

    #[tokio::test]
    async fn test_branch_status_commit_push_round() {
        let origin_dir = tempfile::tempdir().unwrap();
        let url = init_origin(origin_dir.path());
        let work = tempfile::tempdir().unwrap();

        clone(&url, "main", work.path(), "unused", &CancellationToken::new()).await.unwrap();
        let head = head_ref(work.path()).await.unwrap();
        assert_eq!(head.name, "refs/heads/main");

        let root = open_worktree(work.path()).await.unwrap();
        create_branch(&root, "repo-fanout", head.oid).await.unwrap();
        assert!(worktree_status(&root).await.unwrap().is_clean());

        fs::write(root.join("NEW.txt"), "hi").unwrap();
        fs::write(root.join("README.md"), "# changed\n").unwrap();
        let status = worktree_status(&root).await.unwrap();
        assert!(!status.is_clean());
        assert_eq!(status.untracked, vec!["NEW.txt".to_string()]);

        stage_paths(&root, &status.untracked).await.unwrap();
        let commit = commit_all(&root, "chore: update", "bot", "bot@example.com")
            .await
            .unwrap();
        assert!(commit.is_some());
        assert!(worktree_status(&root).await.unwrap().is_clean());

        push(&root, "repo-fanout", "unused", &CancellationToken::new()).await.unwrap();

        let origin = Repository::open_bare(origin_dir.path()).unwrap();
        let pushed = origin
            .find_reference("refs/heads/repo-fanout")
            .unwrap()
            .peel_to_commit()
            .unwrap();
        assert_eq!(pushed.message(), Some("chore: update"));
        assert!(pushed.tree().unwrap().get_name("NEW.txt").is_some());
    }

    #[tokio::test]
    async fn test_create_existing_branch_fails() {
        let origin_dir = tempfile::tempdir().unwrap();
        let url = init_origin(origin_dir.path());
        let work = tempfile::tempdir().unwrap();

        clone(&url, "main", work.path(), "unused", &CancellationToken::new()).await.unwrap();
        let head = head_ref(work.path()).await.unwrap();
        assert!(create_branch(work.path(), "main", head.oid).await.is_err());
    }

    #[tokio::test]
    async fn test_clone_missing_origin_fails() {
        let missing = tempfile::tempdir().unwrap();
        let url = format!("file://{}", missing.path().join("nope").display());
        let work = tempfile::tempdir().unwrap();
        assert!(clone(&url, "main", work.path(), "unused", &CancellationToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_commit_all_skips_when_tree_matches_head() {
        let origin_dir = tempfile::tempdir().unwrap();
        let url = init_origin(origin_dir.path());
        let work = tempfile::tempdir().unwrap();
        clone(&url, "main", work.path(), "unused", &CancellationToken::new())
            .await
            .unwrap();
        let root = open_worktree(work.path()).await.unwrap();
        let before = head_ref(&root).await.unwrap();

        // Add a file, then remove it again before committing.
        fs::write(root.join("TEMP.txt"), "short-lived").unwrap();
        stage_paths(&root, &["TEMP.txt".to_string()]).await.unwrap();
        fs::remove_file(root.join("TEMP.txt")).unwrap();
        fs::write(root.join("README.md"), "# changed\n").unwrap();
        fs::write(root.join("README.md"), "# fixture\n").unwrap();

        let commit = commit_all(&root, "chore: noop", "bot", "bot@example.com")
            .await
            .unwrap();

        assert!(commit.is_none());
        assert_eq!(head_ref(&root).await.unwrap().oid, before.oid);
    }

    #[tokio::test]
    async fn test_cancelled_clone_and_push_do_not_start() {
        let origin_dir = tempfile::tempdir().unwrap();
        let url = init_origin(origin_dir.path());
        let cancelled = CancellationToken::new();
        cancelled.cancel();

        let work = tempfile::tempdir().unwrap();
        let err = clone(&url, "main", work.path(), "unused", &cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Cancelled));
        assert_eq!(fs::read_dir(work.path()).unwrap().count(), 0);

        clone(&url, "main", work.path(), "unused", &CancellationToken::new())
            .await
            .unwrap();
        let root = open_worktree(work.path()).await.unwrap();
        let head = head_ref(&root).await.unwrap();
        create_branch(&root, "repo-fanout", head.oid).await.unwrap();

        let err = push(&root, "repo-fanout", "unused", &cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Cancelled));
        let origin = Repository::open_bare(origin_dir.path()).unwrap();
        assert!(origin.find_reference("refs/heads/repo-fanout").is_err());
    }
}
