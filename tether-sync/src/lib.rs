//! tether-sync: two-phase sync between a remote project and a local
//! git-backed replica.
//!
//! `plan` computes a diff and stores it with a TTL; `execute` re-verifies
//! every hash the plan depends on, applies it under a per-remote lock and
//! rewrites the manifest. Direct single-file writes go through
//! [`orchestrator::WriteOrchestrator`] with optimistic conflict detection
//! and compensating rollback.

pub mod compensation;
pub mod conflict;
pub mod differ;
pub mod error;
pub mod executor;
pub mod fileset;
pub mod git;
pub mod local;
pub mod lock;
pub mod merge;
pub mod orchestrator;
pub mod pipeline;
pub mod plan;
pub mod plan_store;
pub mod planner;
pub mod recovery;
pub mod registry;
pub mod remote;
pub mod status;
pub mod writer;

pub use conflict::{ConflictCheck, ConflictDetails, ConflictGuard, HashSource};
pub use differ::{compute_diff, verify_drift, DiffOptions, DiffResult, FileOp, OpKind};
pub use error::{ErrorCode, SyncError};
pub use executor::{ExecutionPhase, ExecutionResult};
pub use fileset::{FileSet, SyncFile};
pub use git::Git;
pub use lock::{LockGuard, LockManager};
pub use orchestrator::{PutFile, RemoveFile, WriteOperation, WriteOrchestrator, WriteOutcome, WriteRequest};
pub use pipeline::SyncPipeline;
pub use plan::{PlanResponse, PlanSummary, SyncPlan};
pub use plan_store::{PlanLookup, PlanStore};
pub use recovery::RecoveryInfo;
pub use registry::Registry;
pub use remote::{AuthToken, MemoryRemoteStore, RemoteStore};
pub use status::ReplicaStatus;
