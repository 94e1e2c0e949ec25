//! Domain types shared by the sync, worktree and CLI crates.
//!
//! Replica paths use `PathBuf`; remote file names are plain `String`s because
//! they are keys in the remote API, not filesystem paths.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of a remote project (one remote code store per id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteId(pub String);

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RemoteId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RemoteId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier of an agent session owning a worktree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Session ids become directory and branch names, so they are limited to
    /// ASCII alphanumerics, `-`, `_` and `.`, and may not start with a dot.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && !self.0.starts_with('.')
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    }

    /// `session/{id}`
    pub fn branch(&self) -> String {
        format!("session/{}", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Opaque identifier of a computed sync plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanId(pub String);

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for PlanId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PlanId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Type tag the remote store attaches to every file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    #[default]
    Script,
    Html,
    Json,
}

impl FileType {
    /// Extension used for the file in a local replica.
    pub fn extension(self) -> &'static str {
        match self {
            FileType::Script => "js",
            FileType::Html => "html",
            FileType::Json => "json",
        }
    }

    /// Map a replica file extension back to a type tag. `.gs` is accepted as
    /// an alias for scripts.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "js" | "gs" => Some(FileType::Script),
            "html" => Some(FileType::Html),
            "json" => Some(FileType::Json),
            _ => None,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileType::Script => write!(f, "script"),
            FileType::Html => write!(f, "html"),
            FileType::Json => write!(f, "json"),
        }
    }
}

/// Direction of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    /// Remote → local replica.
    Pull,
    /// Local replica → remote.
    Push,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDirection::Pull => write!(f, "pull"),
            SyncDirection::Push => write!(f, "push"),
        }
    }
}

impl FromStr for SyncDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pull" => Ok(SyncDirection::Pull),
            "push" => Ok(SyncDirection::Push),
            other => Err(format!("unknown direction '{other}'; expected: pull, push")),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// A file as exchanged with the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    /// Remote name, without extension. May contain `/` for nested folders.
    pub name: String,
    /// Opaque file content.
    pub content: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<DateTime<Utc>>,
}

impl RemoteFile {
    /// Replica filename for this file: `name.ext`.
    pub fn filename(&self) -> String {
        format!("{}.{}", self.name, self.file_type.extension())
    }

    /// Build a remote file from a replica filename and its content.
    pub fn from_filename(filename: &str, content: String) -> Result<Self, CoreError> {
        let (name, file_type) = split_filename(filename)?;
        Ok(Self {
            name,
            content,
            file_type,
            modified_time: None,
        })
    }
}

/// Split `Code.js` into (`Code`, `Script`).
pub fn split_filename(filename: &str) -> Result<(String, FileType), CoreError> {
    if !crate::filter::is_safe_filename(filename) {
        return Err(CoreError::UnsafeFilename {
            filename: filename.to_string(),
        });
    }
    let unsupported = || CoreError::UnsupportedFileType {
        filename: filename.to_string(),
    };
    let (stem, ext) = filename.rsplit_once('.').ok_or_else(unsupported)?;
    if stem.is_empty() || stem.ends_with('/') {
        return Err(unsupported());
    }
    let file_type = FileType::from_extension(ext).ok_or_else(unsupported)?;
    Ok((stem.to_string(), file_type))
}

/// An advisory lock record. Held in memory for execute-locks and persisted in
/// the worktree config for cross-process worktree locks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub holder: String,
    pub hostname: String,
    pub acquired_at: DateTime<Utc>,
    pub operation: String,
    pub expires_at: DateTime<Utc>,
}

impl LockRecord {
    /// A lock past its expiry is treated as abandoned and available.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Best-effort host name for lock records.
pub fn local_hostname() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.trim().is_empty() {
            return name.trim().to_string();
        }
    }
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown-host".to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
