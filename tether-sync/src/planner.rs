//! Plan computation: snapshot both sides, diff, store.

use std::path::{Path, PathBuf};

use tether_core::{manifest, Manifest, RemoteFile, RemoteId, SyncDirection};

use crate::differ::{compute_diff, DiffOptions};
use crate::error::SyncError;
use crate::fileset::FileSet;
use crate::local::scan_replica_async;
use crate::plan::{PlanResponse, SyncPlan};
use crate::registry::Registry;
use crate::remote::{AuthToken, RemoteStore};

/// Both sides of a sync, fetched together.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    /// Unfiltered remote listing; push must send back files the filter hid.
    pub remote_raw: Vec<RemoteFile>,
    pub remote: FileSet,
    pub local: FileSet,
}

impl Snapshot {
    pub async fn fetch(
        remote: &dyn RemoteStore,
        remote_id: &RemoteId,
        local_path: &Path,
        token: &AuthToken,
    ) -> Result<Self, SyncError> {
        let remote_raw = remote.list_all_files(remote_id, token).await?;
        let local = scan_replica_async(local_path).await?;
        Ok(Self {
            remote: FileSet::from_remote(remote_raw.clone()),
            remote_raw,
            local,
        })
    }

    /// `(source, dest)` for `direction`.
    pub fn sides(&self, direction: SyncDirection) -> (&FileSet, &FileSet) {
        match direction {
            SyncDirection::Pull => (&self.remote, &self.local),
            SyncDirection::Push => (&self.local, &self.remote),
        }
    }
}

/// A manifest is only trusted for deletion decisions when it belongs to this
/// remote and is not itself a bootstrap record.
pub(crate) fn is_bootstrap(manifest: Option<&Manifest>, remote_id: &RemoteId) -> bool {
    match manifest {
        None => true,
        Some(m) if &m.remote_id != remote_id => {
            tracing::warn!(
                manifest_remote = %m.remote_id,
                remote = %remote_id,
                "manifest belongs to another remote; treating as first sync"
            );
            true
        }
        Some(m) => m.is_bootstrap,
    }
}

/// Compute a plan and store it in `registry`. Never writes anything.
pub async fn plan(
    registry: &Registry,
    remote: &dyn RemoteStore,
    remote_id: &RemoteId,
    direction: SyncDirection,
    local_path: &Path,
    token: &AuthToken,
) -> Result<PlanResponse, SyncError> {
    let local_path: PathBuf = local_path.to_path_buf();
    let manifest = manifest::load(&local_path)?;
    let bootstrap = is_bootstrap(manifest.as_ref(), remote_id);

    let snapshot = Snapshot::fetch(remote, remote_id, &local_path, token).await?;
    let (source, dest) = snapshot.sides(direction);
    let diff = compute_diff(
        source,
        dest,
        DiffOptions {
            is_bootstrap: bootstrap,
            manifest: manifest.as_ref().filter(|_| !bootstrap),
        },
    );

    let plan = SyncPlan::new(
        remote_id.clone(),
        direction,
        local_path,
        diff,
        bootstrap,
        registry.plan_ttl(),
    );
    let plan = registry.plans().insert(plan);
    let summary = plan.summary();
    tracing::info!(
        plan_id = %plan.plan_id,
        remote = %remote_id,
        %direction,
        bootstrap,
        add = summary.add.len(),
        update = summary.update.len(),
        delete = summary.delete.len(),
        skipped = summary.skipped_untracked.len(),
        "plan computed"
    );
    Ok(PlanResponse {
        plan_id: plan.plan_id.clone(),
        summary,
    })
}
