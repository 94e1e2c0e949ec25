//! Host-facing facade over planning, execution, conflict checks and direct
//! writes.

use std::path::Path;
use std::sync::Arc;

use tether_core::{PlanId, RemoteId, SyncDirection};

use crate::conflict::{ConflictCheck, ConflictContext, ConflictGuard, HashSource};
use crate::error::SyncError;
use crate::executor::{self, ExecutionResult};
use crate::fileset::FileSet;
use crate::orchestrator::{WriteOperation, WriteOrchestrator, WriteOutcome, WriteRequest};
use crate::plan::PlanResponse;
use crate::planner;
use crate::registry::Registry;
use crate::remote::{AuthToken, RemoteStore};

/// Everything a host needs, wired to one [`Registry`] and one remote.
#[derive(Clone)]
pub struct SyncPipeline {
    registry: Arc<Registry>,
    remote: Arc<dyn RemoteStore>,
}

impl SyncPipeline {
    pub fn new(registry: Arc<Registry>, remote: Arc<dyn RemoteStore>) -> Self {
        Self { registry, remote }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Compute and store a plan. Read-only on both sides.
    pub async fn plan(
        &self,
        remote_id: &RemoteId,
        direction: SyncDirection,
        local_path: &Path,
        token: &AuthToken,
    ) -> Result<PlanResponse, SyncError> {
        planner::plan(
            &self.registry,
            self.remote.as_ref(),
            remote_id,
            direction,
            local_path,
            token,
        )
        .await
    }

    /// Apply a stored plan.
    pub async fn execute(
        &self,
        plan_id: &PlanId,
        confirm_deletions: bool,
        token: &AuthToken,
    ) -> Result<ExecutionResult, SyncError> {
        executor::execute(
            &self.registry,
            self.remote.as_ref(),
            plan_id,
            confirm_deletions,
            token,
        )
        .await
    }

    /// Would a write to `filename` with `expected_hash` be safe right now?
    pub async fn check_conflict(
        &self,
        remote_id: &RemoteId,
        filename: &str,
        expected_hash: Option<&str>,
        force: bool,
        token: &AuthToken,
    ) -> Result<ConflictCheck, SyncError> {
        let files = self.remote.list_all_files(remote_id, token).await?;
        let current = FileSet::from_remote(files);
        let ctx = ConflictContext {
            remote_id,
            filename,
            operation: "check",
            hash_source: HashSource::Remote,
            proposed: None,
        };
        let content = current.get(filename).map(|f| f.content.as_str());
        ConflictGuard::enforce(&ctx, expected_hash, content, force)
    }

    /// Run a direct write through the compensating orchestrator.
    pub async fn write(
        &self,
        request: &WriteRequest,
        operation: &dyn WriteOperation,
        token: &AuthToken,
    ) -> Result<WriteOutcome, SyncError> {
        WriteOrchestrator::new(
            self.remote.as_ref(),
            self.registry.locks(),
            self.registry.lock_timeout(),
        )
        .write(request, operation, token)
        .await
    }
}
