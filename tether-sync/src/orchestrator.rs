//! Direct writes: local-first, then remote, with compensation on failure.
//!
//! Pipeline for one [`WriteOperation`]:
//!
//! 1. lock the remote project and make sure the replica is a repository
//! 2. fetch the remote listing and compute changes against it (pure)
//! 3. conflict-check every change against its expected hash
//! 4. write locally, commit (hooks may rewrite files)
//! 5. re-read the written files and push the result to the remote
//! 6. refresh the manifest
//!
//! A failure after step 4 started runs the registered compensations in
//! reverse order and returns the original error with the rollback outcome.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use tether_core::filter::{is_infrastructure, is_safe_filename};
use tether_core::hashing::normalize;
use tether_core::types::split_filename;
use tether_core::{content_hash, manifest, Manifest, ManifestEntry, RemoteFile, RemoteId, SyncDirection};

use crate::compensation::{CompensatingAction, Compensations, ResetToCheckpoint, RestoreFiles};
use crate::conflict::{ConflictContext, ConflictGuard, HashSource};
use crate::error::{io_err, SyncError};
use crate::fileset::FileSet;
use crate::git::Git;
use crate::local::replica_path;
use crate::lock::LockManager;
use crate::remote::{AuthToken, RemoteStore};
use crate::writer;

/// One change to one file, with the hash the caller last saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Write {
        filename: String,
        content: String,
        expected_hash: Option<String>,
    },
    Delete {
        filename: String,
        expected_hash: Option<String>,
    },
}

impl FileChange {
    pub fn filename(&self) -> &str {
        match self {
            FileChange::Write { filename, .. } | FileChange::Delete { filename, .. } => filename,
        }
    }

    fn expected_hash(&self) -> Option<&str> {
        match self {
            FileChange::Write { expected_hash, .. } | FileChange::Delete { expected_hash, .. } => {
                expected_hash.as_deref()
            }
        }
    }

    fn content(&self) -> Option<&str> {
        match self {
            FileChange::Write { content, .. } => Some(content),
            FileChange::Delete { .. } => None,
        }
    }
}

/// A write operation plugged into the orchestrator.
#[async_trait]
pub trait WriteOperation: Send + Sync {
    fn name(&self) -> String;

    /// Changes to apply given the current remote state. Must be pure.
    fn compute_changes(&self, current: &FileSet) -> Result<Vec<FileChange>, SyncError>;

    /// Undo operation-specific side effects. Runs last during compensation.
    async fn rollback(&self) -> Result<(), SyncError> {
        Ok(())
    }
}

/// Write (create or replace) one file.
#[derive(Debug, Clone)]
pub struct PutFile {
    pub filename: String,
    pub content: String,
    pub expected_hash: Option<String>,
}

#[async_trait]
impl WriteOperation for PutFile {
    fn name(&self) -> String {
        format!("write {}", self.filename)
    }

    fn compute_changes(&self, _current: &FileSet) -> Result<Vec<FileChange>, SyncError> {
        Ok(vec![FileChange::Write {
            filename: self.filename.clone(),
            content: self.content.clone(),
            expected_hash: self.expected_hash.clone(),
        }])
    }
}

/// Delete one file. Deleting a file that is already gone is a no-op.
#[derive(Debug, Clone)]
pub struct RemoveFile {
    pub filename: String,
    pub expected_hash: Option<String>,
}

#[async_trait]
impl WriteOperation for RemoveFile {
    fn name(&self) -> String {
        format!("delete {}", self.filename)
    }

    fn compute_changes(&self, current: &FileSet) -> Result<Vec<FileChange>, SyncError> {
        if !current.contains(&self.filename) && self.expected_hash.is_none() {
            return Ok(Vec::new());
        }
        Ok(vec![FileChange::Delete {
            filename: self.filename.clone(),
            expected_hash: self.expected_hash.clone(),
        }])
    }
}

/// Where and how to write.
#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub remote_id: RemoteId,
    pub local_path: PathBuf,
    /// Branch to commit on; the current branch when `None`.
    pub branch: Option<String>,
    pub force: bool,
}

/// What a direct write did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutcome {
    pub written: Vec<String>,
    pub deleted: Vec<String>,
    /// Files a commit hook changed after they were written.
    pub hook_rewritten: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    /// Final content hash per written file.
    pub hashes: BTreeMap<String, String>,
}

pub struct WriteOrchestrator<'a> {
    remote: &'a dyn RemoteStore,
    locks: &'a LockManager,
    lock_timeout: Duration,
}

impl<'a> WriteOrchestrator<'a> {
    pub fn new(remote: &'a dyn RemoteStore, locks: &'a LockManager, lock_timeout: Duration) -> Self {
        Self {
            remote,
            locks,
            lock_timeout,
        }
    }

    pub async fn write(
        &self,
        request: &WriteRequest,
        operation: &dyn WriteOperation,
        token: &AuthToken,
    ) -> Result<WriteOutcome, SyncError> {
        let op_name = operation.name();
        let _guard = self
            .locks
            .acquire(&request.remote_id.0, &op_name, self.lock_timeout)
            .await?;

        let root = request.local_path.clone();
        let git = Git::new(&root);
        git.ensure_repo().await?;
        if let Some(branch) = &request.branch {
            git.checkout_branch(branch).await?;
        }
        let checkpoint = git.ensure_repo().await?;

        let remote_raw = self.remote.list_all_files(&request.remote_id, token).await?;
        let current = FileSet::from_remote(remote_raw.clone());

        let changes = operation.compute_changes(&current)?;
        validate(&changes)?;
        if changes.is_empty() {
            tracing::info!(operation = %op_name, "nothing to write");
            return Ok(WriteOutcome::default());
        }
        for change in &changes {
            let ctx = ConflictContext {
                remote_id: &request.remote_id,
                filename: change.filename(),
                operation: &op_name,
                hash_source: HashSource::Remote,
                proposed: change.content(),
            };
            let current_content = current.get(change.filename()).map(|f| f.content.as_str());
            ConflictGuard::enforce(&ctx, change.expected_hash(), current_content, request.force)?;
        }

        let mut compensations = Compensations::new();
        compensations.push(OperationRollback(operation));
        compensations.push(RestoreFiles::capture(
            root.clone(),
            changes.iter().map(FileChange::filename),
        )?);
        compensations.push(ResetToCheckpoint {
            git: git.clone(),
            checkpoint,
        });

        let local = async {
            apply_local(&root, &changes).await?;
            git.add_all().await?;
            let message = format!("{op_name} via {}", request.remote_id);
            git.commit(&message, false).await
        };
        let commit_sha = match local.await {
            Ok(sha) => sha,
            Err(err) => return Err(compensations.abort("LOCAL_WRITE", err).await),
        };

        let (outgoing, outcome) = match finalize(&root, &changes, commit_sha, &remote_raw) {
            Ok(result) => result,
            Err(err) => return Err(compensations.abort("REMOTE_WRITE", err).await),
        };
        if let Err(err) = self
            .remote
            .replace_all_files(&request.remote_id, &outgoing, token)
            .await
        {
            return Err(compensations.abort("REMOTE_WRITE", err).await);
        }

        if let Err(err) = refresh_manifest(request, &outgoing) {
            tracing::warn!(error = %err, "remote updated but manifest refresh failed");
        }
        tracing::info!(
            operation = %op_name,
            written = outcome.written.len(),
            deleted = outcome.deleted.len(),
            hook_rewritten = outcome.hook_rewritten.len(),
            "direct write complete"
        );
        Ok(outcome)
    }
}

struct OperationRollback<'o>(&'o dyn WriteOperation);

#[async_trait]
impl CompensatingAction for OperationRollback<'_> {
    fn describe(&self) -> String {
        format!("roll back {}", self.0.name())
    }

    async fn run(&self) -> Result<(), SyncError> {
        self.0.rollback().await
    }
}

fn validate(changes: &[FileChange]) -> Result<(), SyncError> {
    let mut seen = HashSet::new();
    for change in changes {
        let filename = change.filename();
        if !is_safe_filename(filename) {
            return Err(SyncError::InvalidRequest(format!(
                "{filename} is not a safe relative path inside the replica"
            )));
        }
        split_filename(filename)?;
        if is_infrastructure(filename) {
            return Err(SyncError::InvalidRequest(format!(
                "{filename} is an infrastructure path and cannot be synced"
            )));
        }
        if !seen.insert(filename) {
            return Err(SyncError::InvalidRequest(format!(
                "{filename} appears more than once in one operation"
            )));
        }
    }
    Ok(())
}

async fn apply_local(root: &std::path::Path, changes: &[FileChange]) -> Result<(), SyncError> {
    let task_root = root.to_path_buf();
    let changes = changes.to_vec();
    tokio::task::spawn_blocking(move || {
        for change in changes {
            let path = replica_path(&task_root, change.filename());
            match change.content() {
                Some(content) => writer::write_atomic(&path, content)?,
                None => writer::remove(&path)?,
            };
        }
        Ok::<(), SyncError>(())
    })
    .await
    .map_err(|e| io_err(root, std::io::Error::other(e)))?
}

/// Build the outgoing remote list from post-commit file content.
fn finalize(
    root: &std::path::Path,
    changes: &[FileChange],
    commit_sha: Option<String>,
    remote_raw: &[RemoteFile],
) -> Result<(Vec<RemoteFile>, WriteOutcome), SyncError> {
    let touched: HashSet<&str> = changes.iter().map(FileChange::filename).collect();
    let mut outgoing: Vec<RemoteFile> = remote_raw
        .iter()
        .filter(|f| !touched.contains(f.filename().as_str()))
        .cloned()
        .collect();

    let mut outcome = WriteOutcome {
        commit_sha,
        ..WriteOutcome::default()
    };
    for change in changes {
        let filename = change.filename();
        match change {
            FileChange::Write { content, .. } => {
                let path = replica_path(root, filename);
                let on_disk = writer::read_optional(&path)?.ok_or_else(|| {
                    SyncError::InvalidRequest(format!("{filename} vanished after commit"))
                })?;
                if on_disk != normalize(content) {
                    tracing::info!(file = filename, "commit hook rewrote file");
                    outcome.hook_rewritten.push(filename.to_string());
                }
                outcome
                    .hashes
                    .insert(filename.to_string(), content_hash(&on_disk));
                outgoing.push(RemoteFile::from_filename(filename, on_disk)?);
                outcome.written.push(filename.to_string());
            }
            FileChange::Delete { .. } => outcome.deleted.push(filename.to_string()),
        }
    }
    Ok((outgoing, outcome))
}

/// Record the pushed state as the new last-synced state.
fn refresh_manifest(request: &WriteRequest, pushed: &[RemoteFile]) -> Result<(), SyncError> {
    let previous = manifest::load(&request.local_path)?;
    let mut next = Manifest::new(request.remote_id.clone(), SyncDirection::Push);
    if let Some(previous) = previous.filter(|m| m.remote_id == request.remote_id) {
        next.is_bootstrap = previous.is_bootstrap;
    }
    let now = next.last_sync_timestamp;
    for file in FileSet::from_remote(pushed.iter().cloned()).iter() {
        next.files.insert(
            file.filename.clone(),
            ManifestEntry {
                hash: file.hash.clone(),
                remote_modified_time: file.modified_time,
                synced_at: now,
            },
        );
    }
    manifest::save(&request.local_path, &next)?;
    Ok(())
}
