//! Local replica scanning.

use std::path::{Path, PathBuf};

use tether_core::filter::is_infrastructure;
use tether_core::types::split_filename;

use crate::error::{io_err, SyncError};
use crate::fileset::{FileSet, SyncFile};

/// Snapshot every syncable file under `root`.
///
/// Infrastructure paths, unsupported extensions, symlinks and non-UTF-8 files
/// are skipped. A missing root yields an empty set.
pub fn scan_replica(root: &Path) -> Result<FileSet, SyncError> {
    let mut set = FileSet::new();
    if !root.exists() {
        return Ok(set);
    }
    let mut files = Vec::new();
    collect_files(root, root, &mut files)?;
    files.sort();

    for (relative, path) in files {
        if is_infrastructure(&relative) {
            continue;
        }
        if split_filename(&relative).is_err() {
            tracing::debug!(file = %relative, "unsupported extension; not synced");
            continue;
        }
        let bytes = std::fs::read(&path).map_err(|e| io_err(&path, e))?;
        let content = match String::from_utf8(bytes) {
            Ok(content) => content,
            Err(_) => {
                tracing::warn!(file = %relative, "not valid UTF-8; not synced");
                continue;
            }
        };
        let modified_time = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .map(chrono::DateTime::<chrono::Utc>::from);
        let mut file = SyncFile::new(relative, content)?;
        file.modified_time = modified_time;
        set.insert(file);
    }
    Ok(set)
}

/// [`scan_replica`] on the blocking pool.
pub async fn scan_replica_async(root: &Path) -> Result<FileSet, SyncError> {
    let root = root.to_path_buf();
    let task_root = root.clone();
    tokio::task::spawn_blocking(move || scan_replica(&task_root))
        .await
        .map_err(|e| io_err(&root, std::io::Error::other(e)))?
}

/// Absolute path of a `/`-separated replica filename. `.` and `..`
/// segments are dropped so the result never leaves `root`; callers reject
/// such names before they get here.
pub fn replica_path(root: &Path, filename: &str) -> PathBuf {
    filename
        .split('/')
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .fold(root.to_path_buf(), |path, part| path.join(part))
}

fn collect_files(
    root: &Path,
    dir: &Path,
    out: &mut Vec<(String, PathBuf)>,
) -> Result<(), SyncError> {
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| io_err(&path, e))?;
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if file_type.is_symlink() {
            tracing::debug!(file = %relative, "symlink; not synced");
            continue;
        }
        if file_type.is_dir() {
            // Prune ignored directories before descending into them.
            if is_infrastructure(&format!("{relative}/")) {
                continue;
            }
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            out.push((relative, path));
        }
    }
    Ok(())
}
