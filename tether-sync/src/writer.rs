//! Atomic replica file writes.
//!
//! ## `write_atomic` protocol
//!
//! 1. Normalize content (BOM stripped, CRLF → LF).
//! 2. Hash the normalized content.
//! 3. Compare with the hash of the file currently on disk → skip if identical.
//! 4. Write to `<path>.tether.tmp`.
//! 5. Rename to final path (atomic on POSIX).

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tether_core::hashing::{bytes_hash, content_hash, normalize};

use crate::error::{io_err, SyncError};

/// Suffix of in-flight temp files. Excluded from scans by the infrastructure
/// filter.
pub const TMP_SUFFIX: &str = ".tether.tmp";

/// Outcome of an individual file write or removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// File was written (content changed or did not previously exist).
    Written { path: PathBuf },
    /// File was skipped: on-disk content already hashes identically.
    Unchanged { path: PathBuf },
    /// File was deleted.
    Removed { path: PathBuf },
    /// Removal requested but the file was already gone.
    Missing { path: PathBuf },
}

impl WriteResult {
    pub fn changed(&self) -> bool {
        matches!(self, WriteResult::Written { .. } | WriteResult::Removed { .. })
    }
}

/// Atomically write `content` to `path`, creating parent directories.
pub fn write_atomic(path: &Path, content: &str) -> Result<WriteResult, SyncError> {
    let tmp = PathBuf::from(format!("{}{TMP_SUFFIX}", path.display()));
    write_atomic_with_tmp(path, content, &tmp)
}

fn write_atomic_with_tmp(path: &Path, content: &str, tmp: &Path) -> Result<WriteResult, SyncError> {
    let normalized = normalize(content);
    let content = normalized.as_ref();

    let digest = content_hash(content);
    match std::fs::read(path) {
        Ok(existing) if bytes_hash(&existing) == digest => {
            tracing::debug!(path = %path.display(), "unchanged");
            return Ok(WriteResult::Unchanged {
                path: path.to_path_buf(),
            });
        }
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(io_err(path, err)),
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    if let Some(tmp_parent) = tmp.parent() {
        std::fs::create_dir_all(tmp_parent).map_err(|e| io_err(tmp_parent, e))?;
    }
    std::fs::write(tmp, content).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    tracing::debug!(path = %path.display(), hash = %tether_core::hashing::short(&digest), "wrote");
    Ok(WriteResult::Written {
        path: path.to_path_buf(),
    })
}

/// Delete `path`. A file that is already gone is not an error.
pub fn remove(path: &Path) -> Result<WriteResult, SyncError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed");
            Ok(WriteResult::Removed {
                path: path.to_path_buf(),
            })
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(WriteResult::Missing {
            path: path.to_path_buf(),
        }),
        Err(err) => Err(io_err(path, err)),
    }
}

/// Read a text file, returning `None` when it does not exist.
pub fn read_optional(path: &Path) -> Result<Option<String>, SyncError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}
