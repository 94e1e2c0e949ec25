//! Local replica status against its manifest. No network access.
//!
//! Signal precedence:
//! 1. `NeverSynced` (no manifest)
//! 2. `Missing` (tracked files deleted locally)
//! 3. `Modified` (tracked files whose hash changed since the last sync)
//! 4. `Untracked` (syncable files the manifest does not know)
//! 5. `Current`

use std::path::Path;

use chrono::{DateTime, Utc};

use tether_core::manifest;

use crate::error::SyncError;
use crate::local::scan_replica;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicaStatus {
    NeverSynced,
    Current { last_sync: DateTime<Utc> },
    Missing { files: Vec<String> },
    Modified { files: Vec<String> },
    Untracked { files: Vec<String> },
}

/// Classify `replica` against its manifest.
pub fn check(replica: &Path) -> Result<ReplicaStatus, SyncError> {
    let Some(manifest) = manifest::load(replica)? else {
        return Ok(ReplicaStatus::NeverSynced);
    };
    let local = scan_replica(replica)?;

    let missing: Vec<String> = manifest
        .files
        .keys()
        .filter(|name| !local.contains(name))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Ok(ReplicaStatus::Missing { files: missing });
    }

    let modified: Vec<String> = local
        .iter()
        .filter(|f| matches!(manifest.hash_of(&f.filename), Some(h) if h != f.hash))
        .map(|f| f.filename.clone())
        .collect();
    if !modified.is_empty() {
        return Ok(ReplicaStatus::Modified { files: modified });
    }

    let untracked: Vec<String> = local
        .names()
        .filter(|name| !manifest.tracks(name))
        .map(str::to_string)
        .collect();
    if !untracked.is_empty() {
        return Ok(ReplicaStatus::Untracked { files: untracked });
    }

    Ok(ReplicaStatus::Current {
        last_sync: manifest.last_sync_timestamp,
    })
}

/// Format age from a chrono timestamp (manifest `lastSyncTimestamp`).
pub fn format_datetime_age(timestamp: DateTime<Utc>) -> String {
    let age = Utc::now()
        .signed_duration_since(timestamp)
        .num_seconds()
        .max(0) as u64;
    format_seconds(age)
}

fn format_seconds(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 3_600 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 86_400 {
        return format!("{}h", seconds / 3_600);
    }
    format!("{}d", seconds / 86_400)
}

/// Up to three names, then `(+N more)`.
pub fn preview_files(files: &[String]) -> String {
    const LIMIT: usize = 3;
    let shown = files
        .iter()
        .take(LIMIT)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if files.len() > LIMIT {
        format!("{shown} (+{} more)", files.len() - LIMIT)
    } else {
        shown
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;
    use tether_core::{content_hash, Manifest, ManifestEntry, RemoteId, SyncDirection};

    use super::*;

    fn synced_replica(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        let mut manifest = Manifest::new(RemoteId::from("r"), SyncDirection::Pull);
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
            manifest.files.insert(
                name.to_string(),
                ManifestEntry {
                    hash: content_hash(content),
                    remote_modified_time: None,
                    synced_at: Utc::now(),
                },
            );
        }
        manifest::save(dir.path(), &manifest).unwrap();
        dir
    }

    #[test]
    fn no_manifest_is_never_synced() {
        let dir = TempDir::new().unwrap();
        assert_eq!(check(dir.path()).unwrap(), ReplicaStatus::NeverSynced);
    }

    #[test]
    fn clean_replica_is_current() {
        let dir = synced_replica(&[("Code.js", "a")]);
        assert!(matches!(check(dir.path()).unwrap(), ReplicaStatus::Current { .. }));
    }

    #[test]
    fn edited_file_is_modified() {
        let dir = synced_replica(&[("Code.js", "a"), ("Page.html", "p")]);
        fs::write(dir.path().join("Code.js"), "edited").unwrap();
        assert_eq!(
            check(dir.path()).unwrap(),
            ReplicaStatus::Modified {
                files: vec!["Code.js".into()]
            }
        );
    }

    #[test]
    fn missing_takes_precedence_over_untracked() {
        let dir = synced_replica(&[("Code.js", "a")]);
        fs::remove_file(dir.path().join("Code.js")).unwrap();
        fs::write(dir.path().join("New.js"), "n").unwrap();
        assert_eq!(
            check(dir.path()).unwrap(),
            ReplicaStatus::Missing {
                files: vec!["Code.js".into()]
            }
        );
    }

    #[test]
    fn new_file_is_untracked() {
        let dir = synced_replica(&[("Code.js", "a")]);
        fs::write(dir.path().join("New.js"), "n").unwrap();
        assert_eq!(
            check(dir.path()).unwrap(),
            ReplicaStatus::Untracked {
                files: vec!["New.js".into()]
            }
        );
    }

    #[test]
    fn format_helpers() {
        assert_eq!(format_seconds(59), "59s");
        assert_eq!(format_seconds(3_600), "1h");
        let files: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        assert_eq!(preview_files(&files), "a, b, c (+1 more)");
    }
}
