//! Plan execution.
//!
//! ```text
//! VALIDATING → LOCKING → DRIFT_CHECK → APPLYING → MANIFEST_UPDATE → DONE
//!      └───────────┴───────────┴────────────┴──────────────┴──→ FAILED
//! ```
//!
//! Pull applies to a git-backed replica and is rolled back to the pre-apply
//! checkpoint on any failure. Push replaces the remote file list in one call;
//! the remote has no transactions, so a failed push only reports recovery
//! instructions.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

use tether_core::{manifest, Manifest, ManifestEntry, PlanId, RemoteFile, RemoteId, SyncDirection};

use crate::compensation::{Compensations, ResetToCheckpoint, RestoreFiles};
use crate::differ::{verify_drift, FileOp, OpKind};
use crate::error::{io_err, SyncError};
use crate::fileset::FileSet;
use crate::git::Git;
use crate::local::{replica_path, scan_replica_async};
use crate::plan::SyncPlan;
use crate::planner::Snapshot;
use crate::recovery::RecoveryInfo;
use crate::registry::Registry;
use crate::remote::{AuthToken, RemoteStore};
use crate::writer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionPhase {
    Validating,
    Locking,
    DriftCheck,
    Applying,
    ManifestUpdate,
    Done,
    Failed,
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExecutionPhase::Validating => "VALIDATING",
            ExecutionPhase::Locking => "LOCKING",
            ExecutionPhase::DriftCheck => "DRIFT_CHECK",
            ExecutionPhase::Applying => "APPLYING",
            ExecutionPhase::ManifestUpdate => "MANIFEST_UPDATE",
            ExecutionPhase::Done => "DONE",
            ExecutionPhase::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

/// What an execution changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub plan_id: PlanId,
    pub remote_id: RemoteId,
    pub direction: SyncDirection,
    pub files_added: Vec<String>,
    pub files_updated: Vec<String>,
    pub files_deleted: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    pub recovery_info: RecoveryInfo,
}

/// Execute a stored plan.
pub async fn execute(
    registry: &Registry,
    remote: &dyn RemoteStore,
    plan_id: &PlanId,
    confirm_deletions: bool,
    token: &AuthToken,
) -> Result<ExecutionResult, SyncError> {
    let result = run(registry, remote, plan_id, confirm_deletions, token).await;
    if let Err(err) = &result {
        tracing::warn!(
            plan_id = %plan_id,
            phase = %ExecutionPhase::Failed,
            code = %err.code(),
            error = %err,
            "execution failed"
        );
    }
    result
}

async fn run(
    registry: &Registry,
    remote: &dyn RemoteStore,
    plan_id: &PlanId,
    confirm_deletions: bool,
    token: &AuthToken,
) -> Result<ExecutionResult, SyncError> {
    enter(plan_id, ExecutionPhase::Validating);
    let plan = registry.plans().get(plan_id).into_result(plan_id)?;
    let deletions = plan.deleted_files();
    if !deletions.is_empty() {
        // Checked before confirmation: a confirmed bootstrap delete is still refused.
        if plan.is_bootstrap {
            return Err(SyncError::BootstrapNoDelete {
                remote_id: plan.remote_id.clone(),
                files: deletions,
            });
        }
        if !confirm_deletions {
            return Err(SyncError::DeletionRequiresConfirmation { files: deletions });
        }
    }

    enter(plan_id, ExecutionPhase::Locking);
    let _guard = registry
        .locks()
        .acquire(&plan.remote_id.0, "execute", registry.lock_timeout())
        .await?;

    enter(plan_id, ExecutionPhase::DriftCheck);
    let snapshot = Snapshot::fetch(remote, &plan.remote_id, &plan.local_path, token).await?;
    let (source, dest) = snapshot.sides(plan.direction);
    let report = verify_drift(&plan.operations, source, dest);
    if report.has_drift() {
        return Err(SyncError::StateDrift {
            details: report.details,
        });
    }

    enter(plan_id, ExecutionPhase::Applying);
    let (commit_sha, recovery_info) = match plan.direction {
        SyncDirection::Pull => apply_pull(&plan, &snapshot).await?,
        SyncDirection::Push => apply_push(&plan, &snapshot, remote, token).await?,
    };

    registry.plans().delete(plan_id);
    enter(plan_id, ExecutionPhase::Done);
    let names = |kind: OpKind| {
        plan.of_kind(kind)
            .map(|op| op.filename().to_string())
            .collect::<Vec<_>>()
    };
    let result = ExecutionResult {
        plan_id: plan.plan_id.clone(),
        remote_id: plan.remote_id.clone(),
        direction: plan.direction,
        files_added: names(OpKind::Add),
        files_updated: names(OpKind::Update),
        files_deleted: names(OpKind::Delete),
        commit_sha,
        recovery_info,
    };
    tracing::info!(
        plan_id = %plan_id,
        added = result.files_added.len(),
        updated = result.files_updated.len(),
        deleted = result.files_deleted.len(),
        commit = result.commit_sha.as_deref().unwrap_or("-"),
        "execution complete"
    );
    Ok(result)
}

fn enter(plan_id: &PlanId, phase: ExecutionPhase) {
    tracing::debug!(plan_id = %plan_id, %phase, "execution phase");
}

// ---------------------------------------------------------------------------
// Pull
// ---------------------------------------------------------------------------

async fn apply_pull(
    plan: &SyncPlan,
    snapshot: &Snapshot,
) -> Result<(Option<String>, RecoveryInfo), SyncError> {
    let root = plan.local_path.clone();
    let git = Git::new(&root);
    let checkpoint = git.ensure_repo().await?;
    let recovery = RecoveryInfo::for_pull(&root, &checkpoint);

    let targets = local_targets(&plan.operations, &snapshot.local);
    let mut compensations = Compensations::new();
    let restore = RestoreFiles::capture(root.clone(), targets.iter().map(|(name, _)| name.as_str()))?;
    compensations.push(restore);
    compensations.push(ResetToCheckpoint {
        git: git.clone(),
        checkpoint: checkpoint.clone(),
    });

    if let Err(err) = write_targets(&root, targets).await {
        return Err(compensations.abort("APPLYING", err).await.with_recovery("APPLYING", recovery));
    }

    let message = commit_message(plan);
    let commit = async {
        git.add_all().await?;
        git.commit(&message, false).await
    };
    let commit_sha = match commit.await {
        Ok(sha) => sha,
        Err(err) => {
            return Err(compensations.abort("APPLYING", err).await.with_recovery("APPLYING", recovery));
        }
    };

    let head = commit_sha.clone().unwrap_or_else(|| checkpoint.clone());
    if let Err(err) = write_pull_manifest(plan, &snapshot.remote, &head).await {
        return Err(compensations
            .abort("MANIFEST_UPDATE", err)
            .await
            .with_recovery("MANIFEST_UPDATE", recovery));
    }
    Ok((commit_sha, recovery))
}

/// `(disk name, new content)` per operation; `None` content deletes.
fn local_targets(operations: &[FileOp], local: &FileSet) -> Vec<(String, Option<String>)> {
    let disk_name = |filename: &str| {
        local
            .get(filename)
            .map(|f| f.disk_name().to_string())
            .unwrap_or_else(|| filename.to_string())
    };
    operations
        .iter()
        .map(|op| match op {
            FileOp::Add {
                filename, content, ..
            } => (filename.clone(), Some(content.clone())),
            FileOp::Update {
                filename, content, ..
            } => (disk_name(filename), Some(content.clone())),
            FileOp::Delete { filename, .. } => (disk_name(filename), None),
        })
        .collect()
}

async fn write_targets(root: &Path, targets: Vec<(String, Option<String>)>) -> Result<(), SyncError> {
    let task_root = root.to_path_buf();
    tokio::task::spawn_blocking(move || {
        for (name, content) in targets {
            let path = replica_path(&task_root, &name);
            match content {
                Some(content) => writer::write_atomic(&path, &content)?,
                None => writer::remove(&path)?,
            };
        }
        Ok::<(), SyncError>(())
    })
    .await
    .map_err(|e| io_err(root, std::io::Error::other(e)))?
}

fn commit_message(plan: &SyncPlan) -> String {
    format!(
        "Sync {} {}: {} added, {} updated, {} deleted",
        plan.direction,
        plan.remote_id,
        plan.of_kind(OpKind::Add).count(),
        plan.of_kind(OpKind::Update).count(),
        plan.of_kind(OpKind::Delete).count()
    )
}

async fn write_pull_manifest(plan: &SyncPlan, remote: &FileSet, head: &str) -> Result<(), SyncError> {
    let local = scan_replica_async(&plan.local_path).await?;
    let mut manifest = Manifest::new(plan.remote_id.clone(), SyncDirection::Pull);
    manifest.last_sync_commit_hash = Some(head.to_string());
    let now = manifest.last_sync_timestamp;
    for file in local.iter() {
        let Some(remote_file) = remote.get(&file.filename) else {
            continue;
        };
        manifest.files.insert(
            file.filename.clone(),
            ManifestEntry {
                hash: file.hash.clone(),
                remote_modified_time: remote_file.modified_time,
                synced_at: now,
            },
        );
    }
    manifest::save(&plan.local_path, &manifest)?;
    tracing::debug!(files = manifest.files.len(), "manifest updated");
    Ok(())
}

// ---------------------------------------------------------------------------
// Push
// ---------------------------------------------------------------------------

async fn apply_push(
    plan: &SyncPlan,
    snapshot: &Snapshot,
    remote: &dyn RemoteStore,
    token: &AuthToken,
) -> Result<(Option<String>, RecoveryInfo), SyncError> {
    let previous = manifest::load(&plan.local_path)
        .ok()
        .flatten()
        .and_then(|m| m.last_sync_commit_hash);
    let recovery = RecoveryInfo::for_push(&plan.remote_id, previous.as_deref());

    let sent = if plan.is_empty() {
        snapshot.remote_raw.clone()
    } else {
        let files = merged_remote_list(&plan.operations, &snapshot.remote_raw)
            .map_err(|e| e.with_recovery("APPLYING", recovery.clone()))?;
        remote
            .replace_all_files(&plan.remote_id, &files, token)
            .await
            .map_err(|e| e.with_recovery("APPLYING", recovery.clone()))?;
        files
    };

    let listed = match remote.list_all_files(&plan.remote_id, token).await {
        Ok(files) => files,
        Err(err) => {
            tracing::warn!(error = %err, "could not re-list remote after push; recording what was sent");
            sent
        }
    };
    write_push_manifest(plan, &FileSet::from_remote(listed), &snapshot.local)
        .await
        .map_err(|e| e.with_recovery("MANIFEST_UPDATE", recovery.clone()))?;
    Ok((None, recovery))
}

/// The remote listing with every planned file replaced, added or removed.
/// Files the infrastructure filter hid are passed through untouched.
fn merged_remote_list(operations: &[FileOp], current: &[RemoteFile]) -> Result<Vec<RemoteFile>, SyncError> {
    let touched: HashSet<&str> = operations.iter().map(FileOp::filename).collect();
    let mut files: Vec<RemoteFile> = current
        .iter()
        .filter(|f| !touched.contains(f.filename().as_str()))
        .cloned()
        .collect();
    for op in operations {
        if let Some(content) = op.content() {
            files.push(RemoteFile::from_filename(op.filename(), content.to_string())?);
        }
    }
    Ok(files)
}

async fn write_push_manifest(plan: &SyncPlan, remote: &FileSet, local: &FileSet) -> Result<(), SyncError> {
    let root: PathBuf = plan.local_path.clone();
    let git = Git::new(&root);
    git.init().await?;
    let head = git.head().await?;

    let mut manifest = Manifest::new(plan.remote_id.clone(), SyncDirection::Push);
    manifest.last_sync_commit_hash = head;
    let now = Utc::now();
    manifest.last_sync_timestamp = now;
    for file in remote.iter().filter(|f| local.contains(&f.filename)) {
        manifest.files.insert(
            file.filename.clone(),
            ManifestEntry {
                hash: file.hash.clone(),
                remote_modified_time: file.modified_time,
                synced_at: now,
            },
        );
    }
    manifest::save(&root, &manifest)?;
    tracing::debug!(files = manifest.files.len(), "manifest updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fileset::SyncFile;
    use tether_core::FileType;

    #[test]
    fn merged_list_replaces_touched_and_keeps_hidden_files() {
        let current = vec![
            RemoteFile::from_filename("Keep.js", "k".into()).unwrap(),
            RemoteFile::from_filename("Edit.js", "old".into()).unwrap(),
            RemoteFile::from_filename("Gone.js", "g".into()).unwrap(),
            RemoteFile::from_filename("node_modules/x.js", "hidden".into()).unwrap(),
        ];
        let ops = vec![
            FileOp::Update {
                filename: "Edit.js".into(),
                source_hash: "s".into(),
                dest_hash: "d".into(),
                content: "new".into(),
                file_type: FileType::Script,
            },
            FileOp::Delete {
                filename: "Gone.js".into(),
                dest_hash: "d".into(),
            },
            FileOp::Add {
                filename: "New.html".into(),
                source_hash: "s".into(),
                content: "<p/>".into(),
                file_type: FileType::Html,
            },
        ];
        let merged = merged_remote_list(&ops, &current).unwrap();
        let mut names: Vec<String> = merged.iter().map(RemoteFile::filename).collect();
        names.sort();
        assert_eq!(names, vec!["Edit.js", "Keep.js", "New.html", "node_modules/x.js"]);
        let edit = merged.iter().find(|f| f.filename() == "Edit.js").unwrap();
        assert_eq!(edit.content, "new");
    }

    #[test]
    fn local_targets_use_on_disk_names_for_existing_files() {
        let local: FileSet = [SyncFile::new("lib/util.gs", "old").unwrap()]
            .into_iter()
            .collect();
        let ops = vec![FileOp::Update {
            filename: "lib/util.js".into(),
            source_hash: "s".into(),
            dest_hash: "d".into(),
            content: "new".into(),
            file_type: FileType::Script,
        }];
        let targets = local_targets(&ops, &local);
        assert_eq!(targets, vec![("lib/util.gs".to_string(), Some("new".to_string()))]);
    }

    #[test]
    fn phases_render_as_screaming_snake_case() {
        assert_eq!(ExecutionPhase::DriftCheck.to_string(), "DRIFT_CHECK");
        assert_eq!(ExecutionPhase::ManifestUpdate.to_string(), "MANIFEST_UPDATE");
    }
}
