use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

use tether_core::{CoreError, RemoteId, SessionId};
use tether_sync::SyncError;

/// Error surface for session worktree management.
#[derive(Debug, Error)]
pub enum WorktreeError {
    #[error("invalid session id '{0}': use ASCII letters, digits, '-', '_' or '.', not starting with '.'")]
    InvalidSession(String),

    #[error("invalid remote id '{0}' for a worktree directory")]
    InvalidRemote(String),

    /// Another process is creating a worktree for this remote.
    #[error("worktree creation for {remote_id} is locked by {holder} on {hostname} until {expires_at}")]
    Locked {
        remote_id: RemoteId,
        holder: String,
        hostname: String,
        expires_at: DateTime<Utc>,
    },

    #[error("no worktree for session {session_id} of {remote_id}")]
    NotFound {
        remote_id: RemoteId,
        session_id: SessionId,
    },

    #[error("worktree for session {session_id} of {remote_id} is claimed by {claimed_by}")]
    Claimed {
        remote_id: RemoteId,
        session_id: SessionId,
        claimed_by: String,
    },

    #[error("worktree config at {path} is malformed: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WorktreeError {
    /// One concrete next step for the caller.
    pub fn next_action(&self) -> String {
        match self {
            WorktreeError::InvalidSession(_) | WorktreeError::InvalidRemote(_) => {
                "Choose an id made of ASCII letters, digits, '-', '_' or '.'.".to_string()
            }
            WorktreeError::Locked { expires_at, .. } => {
                format!("Retry after {expires_at}, or once the other process finishes.")
            }
            WorktreeError::NotFound { .. } => {
                "Create the worktree first with `tether worktree ensure`.".to_string()
            }
            WorktreeError::Claimed { claimed_by, .. } => {
                format!("Ask {claimed_by} to release the worktree, or use another session id.")
            }
            WorktreeError::Config { path, .. } => {
                format!("Fix or delete {} and retry.", path.display())
            }
            WorktreeError::Sync(err) => err.next_action(),
            WorktreeError::Core(_) | WorktreeError::Io { .. } => {
                "Check permissions on the tether directory and retry.".to_string()
            }
        }
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> WorktreeError {
    WorktreeError::Io {
        path: path.into(),
        source,
    }
}
