//! Async git subprocess wrapper.
//!
//! Every invocation passes arguments as an array (never through a shell),
//! captures stderr verbatim into [`SyncError::Git`], and retries transient
//! `index.lock` contention with backoff.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use crate::error::{io_err, SyncError};

/// Backoff delays for transient git retries (milliseconds).
const RETRY_DELAYS_MS: &[u64] = &[100, 500, 2000];

/// Identity used for commits when the user has none configured.
const FALLBACK_NAME: &str = "tether";
const FALLBACK_EMAIL: &str = "tether@localhost";

/// Message of the first commit in a freshly initialized replica.
pub const INITIAL_COMMIT_MESSAGE: &str = "Initial commit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// Move HEAD and index; leave the working tree alone.
    Mixed,
    /// Move HEAD, index and working tree.
    Hard,
}

/// A git repository (or a directory that will become one).
#[derive(Debug, Clone)]
pub struct Git {
    dir: PathBuf,
}

impl Git {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run git and return stdout; non-zero exit is an error.
    pub async fn run(&self, args: &[&str]) -> Result<String, SyncError> {
        let output = self.output(args).await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(git_failure(args, &output))
        }
    }

    /// Run git with retries for transient lock contention. The returned
    /// output may carry a non-zero status; callers decide what it means.
    pub async fn output(&self, args: &[&str]) -> Result<Output, SyncError> {
        let mut attempt = 0;
        loop {
            let output = tokio::process::Command::new("git")
                .args(args)
                .current_dir(&self.dir)
                .env("GIT_TERMINAL_PROMPT", "0")
                .env("LC_ALL", "C")
                .output()
                .await
                .map_err(|e| SyncError::Git {
                    args: args.join(" "),
                    code: None,
                    stderr: format!("failed to spawn git: {e}"),
                })?;

            if output.status.success() {
                return Ok(output);
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            let transient = stderr.contains("index.lock") || stderr.contains("Unable to create");
            match RETRY_DELAYS_MS.get(attempt) {
                Some(delay) if transient => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        delay_ms = delay,
                        "transient git failure, retrying: {}",
                        stderr.trim()
                    );
                    tokio::time::sleep(Duration::from_millis(*delay)).await;
                    attempt += 1;
                }
                _ => return Ok(output),
            }
        }
    }

    pub fn is_repo(&self) -> bool {
        self.dir.join(".git").exists()
    }

    /// `git init` unless `.git` already exists. Creates the directory.
    pub async fn init(&self) -> Result<(), SyncError> {
        if self.is_repo() {
            return Ok(());
        }
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_err(&self.dir, e))?;
        self.run(&["init", "-q"]).await?;
        tracing::info!(repo = %self.dir.display(), "initialized git repository");
        Ok(())
    }

    /// Current HEAD commit, or `None` on an unborn branch.
    pub async fn head(&self) -> Result<Option<String>, SyncError> {
        let args = ["rev-parse", "--verify", "-q", "HEAD"];
        let output = self.output(&args).await?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
        } else if output.status.code() == Some(1) {
            Ok(None)
        } else {
            Err(git_failure(&args, &output))
        }
    }

    /// Ensure the directory is a repository with at least one commit and
    /// return HEAD.
    pub async fn ensure_repo(&self) -> Result<String, SyncError> {
        self.init().await?;
        if let Some(head) = self.head().await? {
            return Ok(head);
        }
        self.commit(INITIAL_COMMIT_MESSAGE, true).await?;
        self.head().await?.ok_or_else(|| SyncError::Git {
            args: "rev-parse HEAD".to_string(),
            code: None,
            stderr: "no HEAD after initial commit".to_string(),
        })
    }

    pub async fn add_all(&self) -> Result<(), SyncError> {
        self.run(&["add", "-A"]).await.map(drop)
    }

    /// Commit staged changes. Returns the new commit, or `None` when there
    /// was nothing to commit and `allow_empty` is false.
    pub async fn commit(&self, message: &str, allow_empty: bool) -> Result<Option<String>, SyncError> {
        if !allow_empty {
            let staged = self.output(&["diff", "--cached", "--quiet"]).await?;
            if staged.status.success() {
                return Ok(None);
            }
        }

        let name_flag;
        let email_flag;
        let mut args: Vec<&str> = vec!["-c", "commit.gpgsign=false"];
        if !self.has_identity().await? {
            name_flag = format!("user.name={FALLBACK_NAME}");
            email_flag = format!("user.email={FALLBACK_EMAIL}");
            args.extend(["-c", name_flag.as_str(), "-c", email_flag.as_str()]);
        }
        args.extend(["commit", "-q", "-m", message]);
        if allow_empty {
            args.push("--allow-empty");
        }
        self.run(&args).await?;
        self.head().await
    }

    async fn has_identity(&self) -> Result<bool, SyncError> {
        let output = self.output(&["config", "user.email"]).await?;
        Ok(output.status.success() && !String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }

    /// Porcelain status lines; empty means clean.
    pub async fn status_porcelain(&self) -> Result<Vec<String>, SyncError> {
        let out = self.run(&["status", "--porcelain"]).await?;
        Ok(out.lines().map(str::to_string).collect())
    }

    pub async fn reset(&self, mode: ResetMode, rev: &str) -> Result<(), SyncError> {
        let flag = match mode {
            ResetMode::Mixed => "--mixed",
            ResetMode::Hard => "--hard",
        };
        self.run(&["reset", "-q", flag, rev]).await.map(drop)
    }

    pub async fn current_branch(&self) -> Result<Option<String>, SyncError> {
        let output = self.output(&["symbolic-ref", "--short", "-q", "HEAD"]).await?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
        } else {
            Ok(None)
        }
    }

    pub async fn branch_exists(&self, branch: &str) -> Result<bool, SyncError> {
        let reference = format!("refs/heads/{branch}");
        let output = self
            .output(&["show-ref", "--verify", "--quiet", &reference])
            .await?;
        Ok(output.status.success())
    }

    /// Check out `branch`, creating it at HEAD if it does not exist.
    pub async fn checkout_branch(&self, branch: &str) -> Result<(), SyncError> {
        if self.current_branch().await?.as_deref() == Some(branch) {
            return Ok(());
        }
        if self.branch_exists(branch).await? {
            self.run(&["checkout", "-q", branch]).await.map(drop)
        } else {
            self.run(&["checkout", "-q", "-b", branch]).await.map(drop)
        }
    }

    pub async fn delete_branch(&self, branch: &str) -> Result<(), SyncError> {
        self.run(&["branch", "-D", branch]).await.map(drop)
    }

    /// `git worktree add <path> -b <branch>` from this (main) repository.
    pub async fn worktree_add(&self, path: &Path, branch: &str) -> Result<(), SyncError> {
        let path = path.to_string_lossy();
        self.run(&["worktree", "add", "-q", path.as_ref(), "-b", branch])
            .await
            .map(drop)
    }

    pub async fn worktree_remove_force(&self, path: &Path) -> Result<(), SyncError> {
        let path = path.to_string_lossy();
        self.run(&["worktree", "remove", "--force", path.as_ref()])
            .await
            .map(drop)
    }

    pub async fn worktree_prune(&self) -> Result<(), SyncError> {
        self.run(&["worktree", "prune"]).await.map(drop)
    }

    /// Paths of all worktrees registered with this repository.
    pub async fn worktree_list(&self) -> Result<Vec<PathBuf>, SyncError> {
        let out = self.run(&["worktree", "list", "--porcelain"]).await?;
        Ok(out
            .lines()
            .filter_map(|line| line.strip_prefix("worktree "))
            .map(PathBuf::from)
            .collect())
    }

    /// Content of `path` at `rev`, or `None` if it does not exist there.
    pub async fn show(&self, rev: &str, path: &str) -> Result<Option<String>, SyncError> {
        let spec = format!("{rev}:{path}");
        let output = self.output(&["show", &spec]).await?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
        } else {
            Ok(None)
        }
    }
}

pub(crate) fn git_failure(args: &[&str], output: &Output) -> SyncError {
    SyncError::Git {
        args: args.join(" "),
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
    }
}
