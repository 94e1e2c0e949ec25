//! Normalized file snapshots of either sync side.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use tether_core::filter::{is_infrastructure, is_safe_filename};
use tether_core::types::split_filename;
use tether_core::{content_hash, CoreError, FileType, RemoteFile};

/// One syncable file with its precomputed content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFile {
    /// Canonical replica filename (`name.ext`), the diff key.
    pub filename: String,
    /// On-disk name when it differs from `filename` (`.gs` scripts).
    pub disk_name: Option<String>,
    pub content: String,
    pub file_type: FileType,
    pub hash: String,
    pub modified_time: Option<DateTime<Utc>>,
}

impl SyncFile {
    /// Build from a local filename (`"lib/util.js"`), inferring the type.
    /// Script aliases are keyed under the canonical `.js` name.
    pub fn new(filename: impl Into<String>, content: impl Into<String>) -> Result<Self, CoreError> {
        let on_disk = filename.into();
        let (stem, file_type) = split_filename(&on_disk)?;
        let canonical = format!("{stem}.{}", file_type.extension());
        let (filename, disk_name) = if canonical == on_disk {
            (on_disk, None)
        } else {
            (canonical, Some(on_disk))
        };
        let content = content.into();
        Ok(Self {
            hash: content_hash(&content),
            filename,
            disk_name,
            content,
            file_type,
            modified_time: None,
        })
    }

    /// Name of the file as it exists in the replica.
    pub fn disk_name(&self) -> &str {
        self.disk_name.as_deref().unwrap_or(&self.filename)
    }

    pub fn from_remote(file: RemoteFile) -> Self {
        let filename = file.filename();
        Self {
            hash: content_hash(&file.content),
            filename,
            disk_name: None,
            content: file.content,
            file_type: file.file_type,
            modified_time: file.modified_time,
        }
    }

    pub fn to_remote(&self) -> Result<RemoteFile, CoreError> {
        RemoteFile::from_filename(&self.filename, self.content.clone())
    }
}

/// Filename-keyed snapshot with infrastructure files removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    files: BTreeMap<String, SyncFile>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a remote listing. Infrastructure names are dropped.
    pub fn from_remote(files: impl IntoIterator<Item = RemoteFile>) -> Self {
        let mut set = Self::new();
        for file in files {
            set.insert(SyncFile::from_remote(file));
        }
        set
    }

    /// Insert a file, ignoring infrastructure names. A later duplicate wins.
    pub fn insert(&mut self, file: SyncFile) {
        if !is_safe_filename(&file.filename) {
            tracing::warn!(filename = %file.filename, "skipping file whose name escapes the replica");
            return;
        }
        if is_infrastructure(&file.filename) {
            tracing::debug!(filename = %file.filename, "skipping infrastructure file");
            return;
        }
        if let Some(previous) = self.files.insert(file.filename.clone(), file) {
            tracing::warn!(filename = %previous.filename, "duplicate filename in snapshot; keeping the last one");
        }
    }

    pub fn get(&self, filename: &str) -> Option<&SyncFile> {
        self.files.get(filename)
    }

    pub fn hash_of(&self, filename: &str) -> Option<&str> {
        self.files.get(filename).map(|f| f.hash.as_str())
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.files.contains_key(filename)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SyncFile> {
        self.files.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FromIterator<SyncFile> for FileSet {
    fn from_iter<I: IntoIterator<Item = SyncFile>>(iter: I) -> Self {
        let mut set = Self::new();
        for file in iter {
            set.insert(file);
        }
        set
    }
}
