//! Session worktree lifecycle.
//!
//! ```text
//! absent → CREATING → READY
//!             └──(any failure)──→ rolled back → absent
//! ```
//!
//! Creation for one remote is serialized in-process by a keyed async mutex
//! and across processes by the advisory lock in `worktrees.yaml`. Base
//! hashes are recorded only after the seed commit succeeds, so a
//! half-created worktree never reports as existing.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tether_core::config::Config;
use tether_core::filter::is_safe_filename;
use tether_core::hashing::short;
use tether_core::{content_hash, RemoteId, SessionId};
use tether_sync::local::replica_path;
use tether_sync::merge::{three_way_merge, MergeOutcome};
use tether_sync::{writer, AuthToken, FileSet, Git, RemoteStore, SyncError};

use crate::error::{io_err, WorktreeError};
use crate::paths;
use crate::store::{WorktreeEntry, WorktreeState, WorktreeStore};

/// Message of the commit holding the remote snapshot a session starts from.
pub const SEED_COMMIT_MESSAGE: &str = "Initial sync from remote.";

pub struct WorktreeManager {
    base: PathBuf,
    store: WorktreeStore,
    remote: Arc<dyn RemoteStore>,
    lock_ttl: Duration,
    creating: Mutex<HashMap<RemoteId, Arc<tokio::sync::Mutex<()>>>>,
}

impl WorktreeManager {
    /// Manager rooted at `home` (`<home>/.tether/...`).
    pub fn at(home: &Path, config: &Config, remote: Arc<dyn RemoteStore>) -> Self {
        Self::new(
            config.worktree_base_at(home),
            WorktreeStore::new(paths::config_path_at(home)),
            remote,
            config.worktree_lock_ttl(),
        )
    }

    pub fn new(
        base: PathBuf,
        store: WorktreeStore,
        remote: Arc<dyn RemoteStore>,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            base,
            store,
            remote,
            lock_ttl,
            creating: Mutex::new(HashMap::new()),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn store(&self) -> &WorktreeStore {
        &self.store
    }

    /// Path of the ready worktree for this session, creating and seeding it
    /// first if needed.
    pub async fn ensure(
        &self,
        remote_id: &RemoteId,
        session_id: &SessionId,
        token: &AuthToken,
    ) -> Result<PathBuf, WorktreeError> {
        validate(remote_id, session_id)?;
        let key = self.creation_lock(remote_id);
        let _creating = key.lock().await;

        if let Some(entry) = self.store.find(remote_id, session_id)? {
            if entry.is_ready() && entry.local_path.is_dir() {
                return Ok(entry.local_path);
            }
            tracing::warn!(
                remote_id = %remote_id,
                session_id = %session_id,
                state = ?entry.state,
                "discarding incomplete worktree"
            );
            self.discard(&entry).await;
        }

        let holder = format!("pid-{}/{}", std::process::id(), session_id);
        self.store
            .acquire_lock(remote_id, &holder, "create worktree", self.lock_ttl)?;
        let result = self.create(remote_id, session_id, token).await;
        if let Err(err) = self.store.release_lock(remote_id, &holder) {
            tracing::warn!(remote_id = %remote_id, error = %err, "could not release worktree lock");
        }
        result
    }

    /// True only for a fully seeded worktree whose directory still exists.
    pub fn exists(&self, remote_id: &RemoteId, session_id: &SessionId) -> Result<bool, WorktreeError> {
        Ok(self
            .store
            .find(remote_id, session_id)?
            .is_some_and(|e| e.is_ready() && e.local_path.is_dir()))
    }

    pub fn get(&self, remote_id: &RemoteId, session_id: &SessionId) -> Result<WorktreeEntry, WorktreeError> {
        self.store
            .find(remote_id, session_id)?
            .ok_or_else(|| WorktreeError::NotFound {
                remote_id: remote_id.clone(),
                session_id: session_id.clone(),
            })
    }

    pub fn list(&self) -> Result<Vec<WorktreeEntry>, WorktreeError> {
        Ok(self.store.load()?.entries)
    }

    /// Warning text when `filename` changed since the session was seeded.
    /// Files created after the seed have no base and never warn.
    pub fn check_conflict(
        &self,
        remote_id: &RemoteId,
        session_id: &SessionId,
        filename: &str,
        current_content: &str,
    ) -> Result<Option<String>, WorktreeError> {
        let entry = self.get(remote_id, session_id)?;
        let Some(base) = entry.base_hashes.get(filename) else {
            tracing::debug!(file = filename, "created since session start; no base hash");
            return Ok(None);
        };
        let current = content_hash(current_content);
        if &current == base {
            return Ok(None);
        }
        Ok(Some(format!(
            "{filename} changed since session start (base {}, now {})",
            short(base),
            short(&current)
        )))
    }

    /// Record `content` as the new base for `filename` after a write.
    pub fn update_base_hash(
        &self,
        remote_id: &RemoteId,
        session_id: &SessionId,
        filename: &str,
        content: &str,
    ) -> Result<(), WorktreeError> {
        let mut entry = self.get(remote_id, session_id)?;
        entry
            .base_hashes
            .insert(filename.to_string(), content_hash(content));
        self.store.upsert(entry)
    }

    /// Mark the worktree as in use by `claimant`.
    pub fn claim(
        &self,
        remote_id: &RemoteId,
        session_id: &SessionId,
        claimant: &str,
    ) -> Result<(), WorktreeError> {
        let mut entry = self.get(remote_id, session_id)?;
        if let Some(other) = entry.claimed_by.as_deref().filter(|c| *c != claimant) {
            return Err(WorktreeError::Claimed {
                remote_id: remote_id.clone(),
                session_id: session_id.clone(),
                claimed_by: other.to_string(),
            });
        }
        entry.claimed_by = Some(claimant.to_string());
        self.store.upsert(entry)
    }

    pub fn release(
        &self,
        remote_id: &RemoteId,
        session_id: &SessionId,
        claimant: &str,
    ) -> Result<(), WorktreeError> {
        let mut entry = self.get(remote_id, session_id)?;
        match entry.claimed_by.clone().as_deref() {
            None => Ok(()),
            Some(holder) if holder == claimant => {
                entry.claimed_by = None;
                self.store.upsert(entry)
            }
            Some(holder) => Err(WorktreeError::Claimed {
                remote_id: remote_id.clone(),
                session_id: session_id.clone(),
                claimed_by: holder.to_string(),
            }),
        }
    }

    /// Tear down the worktree. Every step is best-effort and logged.
    /// Returns whether an entry existed.
    pub async fn remove(&self, remote_id: &RemoteId, session_id: &SessionId) -> bool {
        let entry = match self.store.find(remote_id, session_id) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                let path = paths::session_dir(&self.base, remote_id, session_id);
                self.remove_artifacts(remote_id, &path, &session_id.branch()).await;
                return false;
            }
            Err(err) => {
                tracing::warn!(error = %err, "could not read worktree config");
                return false;
            }
        };
        self.discard(&entry).await;
        tracing::info!(remote_id = %remote_id, session_id = %session_id, "worktree removed");
        true
    }

    /// Drop entries whose directory vanished. Returns the dropped entries.
    pub async fn prune(&self) -> Result<Vec<WorktreeEntry>, WorktreeError> {
        let stale: Vec<WorktreeEntry> = self
            .list()?
            .into_iter()
            .filter(|e| !e.local_path.is_dir())
            .collect();
        for entry in &stale {
            self.discard(entry).await;
        }
        if !stale.is_empty() {
            tracing::info!(count = stale.len(), "pruned stale worktrees");
        }
        Ok(stale)
    }

    /// Three-way merge of `remote_content` into the session's copy of
    /// `filename`, using the seeded version as base. A file missing on
    /// either side merges as empty.
    pub async fn merge_incoming(
        &self,
        remote_id: &RemoteId,
        session_id: &SessionId,
        filename: &str,
        remote_content: &str,
    ) -> Result<MergeOutcome, WorktreeError> {
        if !is_safe_filename(filename) {
            return Err(SyncError::InvalidRequest(format!(
                "{filename} is not a safe relative path inside the worktree"
            ))
            .into());
        }
        let entry = self.get(remote_id, session_id)?;
        let git = Git::new(&entry.local_path);
        let base = match &entry.seed_commit {
            Some(seed) => git.show(seed, filename).await?.unwrap_or_default(),
            None => String::new(),
        };
        let ours = writer::read_optional(&replica_path(&entry.local_path, filename))?.unwrap_or_default();
        Ok(three_way_merge(&base, &ours, remote_content).await?)
    }

    fn creation_lock(&self, remote_id: &RemoteId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.creating.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(remote_id.clone()).or_default())
    }

    async fn create(
        &self,
        remote_id: &RemoteId,
        session_id: &SessionId,
        token: &AuthToken,
    ) -> Result<PathBuf, WorktreeError> {
        let path = paths::session_dir(&self.base, remote_id, session_id);
        let mut entry = WorktreeEntry::creating(remote_id.clone(), session_id.clone(), path.clone());
        self.store.upsert(entry.clone())?;

        let seeded = match self.seed(remote_id, &path, &entry.branch, token).await {
            Ok(seeded) => seeded,
            Err(err) => {
                tracing::warn!(
                    remote_id = %remote_id,
                    session_id = %session_id,
                    error = %err,
                    "worktree creation failed; rolling back"
                );
                self.discard(&entry).await;
                return Err(err);
            }
        };

        let (base_hashes, seed_commit) = seeded;
        let file_count = base_hashes.len();
        entry.base_hashes = base_hashes;
        entry.seed_commit = Some(seed_commit);
        entry.state = WorktreeState::Ready;
        if let Err(err) = self.store.upsert(entry.clone()) {
            self.discard(&entry).await;
            return Err(err);
        }
        tracing::info!(
            remote_id = %remote_id,
            session_id = %session_id,
            files = file_count,
            path = %path.display(),
            "worktree ready"
        );
        Ok(path)
    }

    /// Add the worktree, write the remote snapshot and commit it.
    async fn seed(
        &self,
        remote_id: &RemoteId,
        path: &Path,
        branch: &str,
        token: &AuthToken,
    ) -> Result<(BTreeMap<String, String>, String), WorktreeError> {
        let main = Git::new(paths::main_repo(&self.base, remote_id));
        main.ensure_repo().await?;
        if let Err(err) = main.worktree_add(path, branch).await {
            tracing::warn!(path = %path.display(), error = %err, "worktree add failed; clearing stale artifacts");
            self.remove_artifacts(remote_id, path, branch).await;
            main.worktree_add(path, branch).await?;
        }

        let files = FileSet::from_remote(self.remote.list_all_files(remote_id, token).await?);
        let root = path.to_path_buf();
        let base_hashes = tokio::task::spawn_blocking(move || {
            let mut hashes = BTreeMap::new();
            for file in files.iter() {
                writer::write_atomic(&replica_path(&root, &file.filename), &file.content)?;
                hashes.insert(file.filename.clone(), file.hash.clone());
            }
            Ok::<_, SyncError>(hashes)
        })
        .await
        .map_err(|e| io_err(path, std::io::Error::other(e)))??;

        let git = Git::new(path);
        git.add_all().await?;
        let seed = git
            .commit(SEED_COMMIT_MESSAGE, true)
            .await?
            .ok_or_else(|| SyncError::Git {
                args: "rev-parse HEAD".to_string(),
                code: None,
                stderr: "no HEAD after seed commit".to_string(),
            })?;
        Ok((base_hashes, seed))
    }

    /// Remove the worktree's artifacts and its config entry.
    async fn discard(&self, entry: &WorktreeEntry) {
        self.remove_artifacts(&entry.remote_id, &entry.local_path, &entry.branch)
            .await;
        if let Err(err) = self.store.remove(&entry.remote_id, &entry.session_id) {
            tracing::warn!(error = %err, "could not drop worktree entry");
        }
    }

    async fn remove_artifacts(&self, remote_id: &RemoteId, path: &Path, branch: &str) {
        let main = Git::new(paths::main_repo(&self.base, remote_id));
        if main.is_repo() {
            if let Err(err) = main.worktree_remove_force(path).await {
                tracing::debug!(path = %path.display(), error = %err, "worktree remove failed; pruning");
                remove_dir(path).await;
                if let Err(err) = main.worktree_prune().await {
                    tracing::warn!(error = %err, "worktree prune failed");
                }
            }
            match main.branch_exists(branch).await {
                Ok(true) => {
                    if let Err(err) = main.delete_branch(branch).await {
                        tracing::warn!(branch, error = %err, "could not delete session branch");
                    }
                }
                Ok(false) => {}
                Err(err) => tracing::warn!(branch, error = %err, "could not inspect session branch"),
            }
        }
        remove_dir(path).await;
    }
}

async fn remove_dir(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(path = %path.display(), error = %err, "could not remove worktree directory"),
    }
}

fn validate(remote_id: &RemoteId, session_id: &SessionId) -> Result<(), WorktreeError> {
    if !paths::is_safe_remote_id(remote_id) {
        return Err(WorktreeError::InvalidRemote(remote_id.0.clone()));
    }
    if !session_id.is_valid() {
        return Err(WorktreeError::InvalidSession(session_id.0.clone()));
    }
    Ok(())
}
