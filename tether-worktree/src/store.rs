//! Persisted worktree registry.
//!
//! # Storage layout
//!
//! ```text
//! ~/.tether/
//!   worktrees.yaml     (entries + cross-process creation locks, mode 0600)
//!   worktrees/
//!     <remote_id>/
//!       .main/         (shared repository)
//!       <session_id>/  (one worktree per session)
//! ```
//!
//! The file is rewritten wholesale on every mutation (temp file + rename).
//! Mutations within one process are serialized; across processes the
//! creation lock is advisory and expires after its TTL.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tether_core::types::local_hostname;
use tether_core::{persist, LockRecord, RemoteId, SessionId};

use crate::error::{io_err, WorktreeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorktreeState {
    /// Directory and branch may exist but the seed commit has not landed.
    Creating,
    Ready,
}

/// One session worktree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktreeEntry {
    pub remote_id: RemoteId,
    pub session_id: SessionId,
    pub branch: String,
    pub local_path: PathBuf,
    pub state: WorktreeState,
    /// Content hash of every file at seed time, keyed by replica filename.
    #[serde(default)]
    pub base_hashes: BTreeMap<String, String>,
    /// The "Initial sync from remote." commit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorktreeEntry {
    pub fn creating(remote_id: RemoteId, session_id: SessionId, local_path: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            branch: session_id.branch(),
            remote_id,
            session_id,
            local_path,
            state: WorktreeState::Creating,
            base_hashes: BTreeMap::new(),
            seed_commit: None,
            claimed_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == WorktreeState::Ready
    }

    fn is_for(&self, remote_id: &RemoteId, session_id: &SessionId) -> bool {
        &self.remote_id == remote_id && &self.session_id == session_id
    }
}

/// Root document of `worktrees.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorktreeConfig {
    pub entries: Vec<WorktreeEntry>,
    /// Creation locks keyed by remote id.
    pub locks: BTreeMap<String, LockRecord>,
}

/// Load-modify-save access to `worktrees.yaml`.
#[derive(Debug)]
pub struct WorktreeStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl WorktreeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current document. A missing or empty file is an empty registry.
    pub fn load(&self) -> Result<WorktreeConfig, WorktreeError> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        self.read()
    }

    /// Apply `mutate` to the current document and save the result.
    pub fn update<T>(
        &self,
        mutate: impl FnOnce(&mut WorktreeConfig) -> Result<T, WorktreeError>,
    ) -> Result<T, WorktreeError> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut config = self.read()?;
        let value = mutate(&mut config)?;
        self.write(&config)?;
        Ok(value)
    }

    pub fn find(
        &self,
        remote_id: &RemoteId,
        session_id: &SessionId,
    ) -> Result<Option<WorktreeEntry>, WorktreeError> {
        Ok(self
            .load()?
            .entries
            .into_iter()
            .find(|e| e.is_for(remote_id, session_id)))
    }

    /// Insert or replace the entry for the same remote and session.
    pub fn upsert(&self, mut entry: WorktreeEntry) -> Result<(), WorktreeError> {
        entry.updated_at = Utc::now();
        self.update(|config| {
            config
                .entries
                .retain(|e| !e.is_for(&entry.remote_id, &entry.session_id));
            config.entries.push(entry);
            config
                .entries
                .sort_by(|a, b| (&a.remote_id, &a.session_id).cmp(&(&b.remote_id, &b.session_id)));
            Ok(())
        })
    }

    /// Drop the entry. Returns whether one existed.
    pub fn remove(&self, remote_id: &RemoteId, session_id: &SessionId) -> Result<bool, WorktreeError> {
        self.update(|config| {
            let before = config.entries.len();
            config.entries.retain(|e| !e.is_for(remote_id, session_id));
            Ok(config.entries.len() != before)
        })
    }

    /// Take the creation lock for `remote_id`. An expired lock is taken
    /// over; a live lock held by someone else is an error.
    pub fn acquire_lock(
        &self,
        remote_id: &RemoteId,
        holder: &str,
        operation: &str,
        ttl: Duration,
    ) -> Result<LockRecord, WorktreeError> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::minutes(2));
        self.update(|config| {
            if let Some(existing) = config.locks.get(&remote_id.0) {
                if existing.holder != holder && !existing.is_expired_at(now) {
                    return Err(WorktreeError::Locked {
                        remote_id: remote_id.clone(),
                        holder: existing.holder.clone(),
                        hostname: existing.hostname.clone(),
                        expires_at: existing.expires_at,
                    });
                }
                if existing.holder != holder {
                    tracing::warn!(
                        remote_id = %remote_id,
                        holder = %existing.holder,
                        "taking over expired worktree lock"
                    );
                }
            }
            let record = LockRecord {
                holder: holder.to_string(),
                hostname: local_hostname(),
                acquired_at: now,
                operation: operation.to_string(),
                expires_at: now + ttl,
            };
            config.locks.insert(remote_id.0.clone(), record.clone());
            Ok(record)
        })
    }

    /// Release the lock if `holder` still owns it.
    pub fn release_lock(&self, remote_id: &RemoteId, holder: &str) -> Result<(), WorktreeError> {
        self.update(|config| {
            if config
                .locks
                .get(&remote_id.0)
                .is_some_and(|lock| lock.holder == holder)
            {
                config.locks.remove(&remote_id.0);
            }
            Ok(())
        })
    }

    fn read(&self) -> Result<WorktreeConfig, WorktreeError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(WorktreeConfig::default())
            }
            Err(err) => return Err(io_err(&self.path, err)),
        };
        if contents.trim().is_empty() {
            return Ok(WorktreeConfig::default());
        }
        serde_yaml::from_str(&contents).map_err(|source| WorktreeError::Config {
            path: self.path.clone(),
            source,
        })
    }

    fn write(&self, config: &WorktreeConfig) -> Result<(), WorktreeError> {
        if let Some(parent) = self.path.parent() {
            persist::ensure_private_dir(parent)?;
        }
        let yaml = serde_yaml::to_string(config).map_err(|source| WorktreeError::Config {
            path: self.path.clone(),
            source,
        })?;
        persist::write_private(&self.path, yaml.as_bytes())?;
        Ok(())
    }
}
