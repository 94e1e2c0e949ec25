//! Error types for tether-sync.
//!
//! Every failure carries a stable [`ErrorCode`] so callers can branch on it,
//! and [`SyncError::next_action`] names at least one concrete step to take.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use tether_core::{CoreError, PlanId, RemoteId};

use crate::compensation::CompensationFailure;
use crate::conflict::ConflictDetails;
use crate::differ::DriftDetail;
use crate::recovery::RecoveryInfo;

/// Stable machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    PlanNotFound,
    PlanExpired,
    DeletionRequiresConfirmation,
    BootstrapNoDelete,
    StateDrift,
    LockTimeout,
    Conflict,
    InvalidRequest,
    ExecutionError,
    GitError,
    ApiError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::PlanNotFound => "PLAN_NOT_FOUND",
            ErrorCode::PlanExpired => "PLAN_EXPIRED",
            ErrorCode::DeletionRequiresConfirmation => "DELETION_REQUIRES_CONFIRMATION",
            ErrorCode::BootstrapNoDelete => "BOOTSTRAP_NO_DELETE",
            ErrorCode::StateDrift => "STATE_DRIFT",
            ErrorCode::LockTimeout => "LOCK_TIMEOUT",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::ExecutionError => "EXECUTION_ERROR",
            ErrorCode::GitError => "GIT_ERROR",
            ErrorCode::ApiError => "API_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All errors that can arise from planning, executing and direct writes.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("plan {plan_id} not found")]
    PlanNotFound { plan_id: PlanId },

    #[error("plan {plan_id} expired at {expired_at}")]
    PlanExpired {
        plan_id: PlanId,
        expired_at: DateTime<Utc>,
    },

    #[error("plan deletes {} file(s) and needs confirmation: {}", files.len(), files.join(", "))]
    DeletionRequiresConfirmation { files: Vec<String> },

    #[error("bootstrap sync of {remote_id} must not delete files: {}", files.join(", "))]
    BootstrapNoDelete {
        remote_id: RemoteId,
        files: Vec<String>,
    },

    #[error("state drifted since the plan was computed: {}", join_details(details))]
    StateDrift { details: Vec<DriftDetail> },

    #[error("timed out after {waited_ms}ms waiting for lock on {resource} (held by {holder})")]
    LockTimeout {
        resource: String,
        holder: String,
        waited_ms: u64,
    },

    #[error("{0}")]
    Conflict(Box<ConflictDetails>),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A git subprocess exited unsuccessfully; `stderr` is verbatim.
    #[error("`git {args}` failed (exit {}): {stderr}", exit_label(*code))]
    Git {
        args: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("remote API error during {operation}: {message}")]
    Api { operation: String, message: String },

    /// A mid-pipeline failure. `source` is the original error; compensations
    /// (if any) already ran and their failures are listed.
    #[error(
        "{phase} failed: {source}{}",
        compensation_suffix(*rolled_back, compensation_failures)
    )]
    Aborted {
        phase: String,
        #[source]
        source: Box<SyncError>,
        rolled_back: bool,
        compensation_failures: Vec<CompensationFailure>,
        recovery: Option<RecoveryInfo>,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    /// Machine-readable code. Wrapped errors report their root's code.
    pub fn code(&self) -> ErrorCode {
        match self {
            SyncError::PlanNotFound { .. } => ErrorCode::PlanNotFound,
            SyncError::PlanExpired { .. } => ErrorCode::PlanExpired,
            SyncError::DeletionRequiresConfirmation { .. } => {
                ErrorCode::DeletionRequiresConfirmation
            }
            SyncError::BootstrapNoDelete { .. } => ErrorCode::BootstrapNoDelete,
            SyncError::StateDrift { .. } => ErrorCode::StateDrift,
            SyncError::LockTimeout { .. } => ErrorCode::LockTimeout,
            SyncError::Conflict(_) => ErrorCode::Conflict,
            SyncError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            SyncError::Git { .. } => ErrorCode::GitError,
            SyncError::Api { .. } => ErrorCode::ApiError,
            SyncError::Aborted { source, .. } => source.code(),
            SyncError::Core(_) | SyncError::Io { .. } => ErrorCode::ExecutionError,
        }
    }

    /// The innermost error, looking through [`SyncError::Aborted`].
    pub fn root(&self) -> &SyncError {
        match self {
            SyncError::Aborted { source, .. } => source.root(),
            other => other,
        }
    }

    /// Manual recovery instructions, if the failure left state behind.
    pub fn recovery(&self) -> Option<&RecoveryInfo> {
        match self {
            SyncError::Aborted {
                recovery, source, ..
            } => recovery.as_ref().or_else(|| source.recovery()),
            _ => None,
        }
    }

    /// Attach recovery instructions, wrapping in [`SyncError::Aborted`] if
    /// needed.
    pub fn with_recovery(self, phase: &str, info: RecoveryInfo) -> SyncError {
        match self {
            SyncError::Aborted {
                phase,
                source,
                rolled_back,
                compensation_failures,
                ..
            } => SyncError::Aborted {
                phase,
                source,
                rolled_back,
                compensation_failures,
                recovery: Some(info),
            },
            other => SyncError::Aborted {
                phase: phase.to_string(),
                source: Box::new(other),
                rolled_back: false,
                compensation_failures: Vec::new(),
                recovery: Some(info),
            },
        }
    }

    /// Failures of compensating actions attached to this error.
    pub fn compensation_failures(&self) -> &[CompensationFailure] {
        match self {
            SyncError::Aborted {
                compensation_failures,
                ..
            } => compensation_failures,
            _ => &[],
        }
    }

    /// One concrete next step for the caller.
    pub fn next_action(&self) -> String {
        match self {
            SyncError::PlanNotFound { .. } => {
                "Run plan() again; plans live only in the process that created them.".to_string()
            }
            SyncError::PlanExpired { .. } => {
                "Run plan() again; plans expire 5 minutes after creation.".to_string()
            }
            SyncError::DeletionRequiresConfirmation { files } => format!(
                "Review the {} deletion(s) and re-run execute with confirm_deletions = true.",
                files.len()
            ),
            SyncError::BootstrapNoDelete { .. } => {
                "Run a first sync without deletions; remove the files manually if intended."
                    .to_string()
            }
            SyncError::StateDrift { .. } => {
                "Files changed since planning. Run plan() again and review the new plan."
                    .to_string()
            }
            SyncError::LockTimeout { .. } => {
                "Another execution holds the project lock. Retry once it finishes (locks expire after their TTL)."
                    .to_string()
            }
            SyncError::Conflict(details) => format!(
                "Re-fetch {} to get its current hash, re-apply your edit, and retry; or pass force to overwrite.",
                details.filename
            ),
            SyncError::InvalidRequest(_) => "Correct the request arguments and retry.".to_string(),
            SyncError::Git { .. } => {
                "Inspect the git stderr above, fix the repository state, and retry.".to_string()
            }
            SyncError::Api { .. } => {
                "Check the remote API credentials and connectivity, then retry.".to_string()
            }
            SyncError::Aborted {
                recovery, source, ..
            } => match recovery {
                Some(info) => info.to_string(),
                None => source.next_action(),
            },
            SyncError::Core(_) | SyncError::Io { .. } => {
                "Fix the filesystem problem at the reported path and retry.".to_string()
            }
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`SyncError::Api`].
pub fn api_err(operation: impl Into<String>, message: impl fmt::Display) -> SyncError {
    SyncError::Api {
        operation: operation.into(),
        message: message.to_string(),
    }
}

fn join_details(details: &[DriftDetail]) -> String {
    details
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn exit_label(code: Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

fn compensation_suffix(rolled_back: bool, failures: &[CompensationFailure]) -> String {
    if failures.is_empty() {
        return if rolled_back {
            " (local changes rolled back)".to_string()
        } else {
            String::new()
        };
    }
    let listed = failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    format!(" (rollback incomplete: {listed})")
}
