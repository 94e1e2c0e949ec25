//! Immutable sync plans and their summaries.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use tether_core::{PlanId, RemoteId, SyncDirection};

use crate::differ::{DiffResult, FileOp, OpKind};

/// A computed, not-yet-applied set of operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub plan_id: PlanId,
    pub remote_id: RemoteId,
    pub direction: SyncDirection,
    pub local_path: PathBuf,
    pub operations: Vec<FileOp>,
    pub skipped_untracked: Vec<String>,
    pub is_bootstrap: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SyncPlan {
    pub fn new(
        remote_id: RemoteId,
        direction: SyncDirection,
        local_path: PathBuf,
        diff: DiffResult,
        is_bootstrap: bool,
        ttl: Duration,
    ) -> Self {
        let created_at = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::minutes(5));
        Self {
            plan_id: PlanId(Uuid::new_v4().to_string()),
            remote_id,
            direction,
            local_path,
            operations: diff.operations,
            skipped_untracked: diff.skipped_untracked,
            is_bootstrap,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn of_kind(&self, kind: OpKind) -> impl Iterator<Item = &FileOp> {
        self.operations.iter().filter(move |op| op.kind() == kind)
    }

    fn names(&self, kind: OpKind) -> Vec<String> {
        self.of_kind(kind).map(|op| op.filename().to_string()).collect()
    }

    pub fn deleted_files(&self) -> Vec<String> {
        self.names(OpKind::Delete)
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            remote_id: self.remote_id.clone(),
            direction: self.direction,
            is_bootstrap: self.is_bootstrap,
            add: self.names(OpKind::Add),
            update: self.names(OpKind::Update),
            delete: self.names(OpKind::Delete),
            skipped_untracked: self.skipped_untracked.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

/// Reviewable summary of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub remote_id: RemoteId,
    pub direction: SyncDirection,
    pub is_bootstrap: bool,
    pub add: Vec<String>,
    pub update: Vec<String>,
    pub delete: Vec<String>,
    pub skipped_untracked: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PlanSummary {
    pub fn total_changes(&self) -> usize {
        self.add.len() + self.update.len() + self.delete.len()
    }
}

/// Returned by `plan()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    pub plan_id: PlanId,
    pub summary: PlanSummary,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::FileType;

    fn diff() -> DiffResult {
        DiffResult {
            operations: vec![
                FileOp::Add {
                    filename: "New.js".into(),
                    source_hash: "a".into(),
                    content: "n".into(),
                    file_type: FileType::Script,
                },
                FileOp::Delete {
                    filename: "Old.js".into(),
                    dest_hash: "b".into(),
                },
            ],
            skipped_untracked: vec!["Mine.js".into()],
            unchanged: 3,
        }
    }

    #[test]
    fn summary_groups_operations() {
        let plan = SyncPlan::new(
            RemoteId::from("r"),
            SyncDirection::Pull,
            PathBuf::from("/tmp/r"),
            diff(),
            false,
            Duration::from_secs(300),
        );
        let summary = plan.summary();
        assert_eq!(summary.add, vec!["New.js"]);
        assert_eq!(summary.delete, vec!["Old.js"]);
        assert_eq!(summary.skipped_untracked, vec!["Mine.js"]);
        assert_eq!(summary.total_changes(), 2);
        assert_eq!(plan.deleted_files(), vec!["Old.js"]);
    }

    #[test]
    fn expiry_is_ttl_after_creation() {
        let plan = SyncPlan::new(
            RemoteId::from("r"),
            SyncDirection::Push,
            PathBuf::from("/tmp/r"),
            DiffResult::default(),
            true,
            Duration::from_secs(300),
        );
        assert_eq!((plan.expires_at - plan.created_at).num_seconds(), 300);
        assert!(!plan.is_expired_at(plan.created_at));
        assert!(plan.is_expired_at(plan.expires_at));
    }

    #[test]
    fn plan_ids_are_unique() {
        let make = || {
            SyncPlan::new(
                RemoteId::from("r"),
                SyncDirection::Pull,
                PathBuf::from("/tmp/r"),
                DiffResult::default(),
                false,
                Duration::from_secs(1),
            )
        };
        assert_ne!(make().plan_id, make().plan_id);
    }
}
