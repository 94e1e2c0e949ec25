//! Per-replica sync manifest.
//!
//! Persists a [`Manifest`] JSON document at `<replica>/.git/sync-manifest.json`
//! (mode `0600`). The manifest records the last state in which replica and
//! remote were known to agree. It is always rewritten wholesale via the atomic
//! `.tmp` + rename pattern; callers build a complete new value and [`save`] it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::persist;
use crate::types::{RemoteId, SyncDirection};

/// Current on-disk format version.
pub const MANIFEST_VERSION: &str = "2.1";

/// File name inside the replica's `.git` directory.
pub const MANIFEST_FILE: &str = "sync-manifest.json";

/// One tracked file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_modified_time: Option<DateTime<Utc>>,
    pub synced_at: DateTime<Utc>,
}

/// Last known in-sync state between a replica and a remote project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: String,
    pub remote_id: RemoteId,
    pub last_sync_timestamp: DateTime<Utc>,
    pub last_sync_direction: SyncDirection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_commit_hash: Option<String>,
    pub files: BTreeMap<String, ManifestEntry>,
    pub is_bootstrap: bool,
}

impl Manifest {
    /// A fresh manifest with no tracked files.
    pub fn new(remote_id: RemoteId, direction: SyncDirection) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            remote_id,
            last_sync_timestamp: Utc::now(),
            last_sync_direction: direction,
            last_sync_commit_hash: None,
            files: BTreeMap::new(),
            is_bootstrap: false,
        }
    }

    /// `true` if `filename` was part of the last synced state.
    pub fn tracks(&self, filename: &str) -> bool {
        self.files.contains_key(filename)
    }

    pub fn hash_of(&self, filename: &str) -> Option<&str> {
        self.files.get(filename).map(|e| e.hash.as_str())
    }
}

// Older manifests stored `files` as a flat name → hash map and had no
// `isBootstrap` flag. Both shapes are accepted on load.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EntryCompat {
    Structured(ManifestEntry),
    Legacy(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestCompat {
    version: Option<String>,
    remote_id: RemoteId,
    last_sync_timestamp: DateTime<Utc>,
    last_sync_direction: SyncDirection,
    #[serde(default)]
    last_sync_commit_hash: Option<String>,
    #[serde(default)]
    files: BTreeMap<String, EntryCompat>,
    #[serde(default)]
    is_bootstrap: bool,
}

/// `<replica>/.git/sync-manifest.json`: pure, no I/O.
pub fn manifest_path(replica: &Path) -> PathBuf {
    replica.join(".git").join(MANIFEST_FILE)
}

/// Load the manifest of `replica`.
///
/// Returns `Ok(None)` if no manifest exists yet (first sync ⇒ bootstrap).
pub fn load(replica: &Path) -> Result<Option<Manifest>, CoreError> {
    let path = manifest_path(replica);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(&path, err)),
    };
    let raw: ManifestCompat =
        serde_json::from_str(&contents).map_err(|source| CoreError::ManifestParse {
            path: path.clone(),
            source,
        })?;

    let version = raw.version.unwrap_or_else(|| "1.0".to_string());
    if !version.starts_with("1.") && !version.starts_with("2.") {
        return Err(CoreError::UnsupportedManifestVersion { path, version });
    }

    let synced_at = raw.last_sync_timestamp;
    let files = raw
        .files
        .into_iter()
        .map(|(name, entry)| {
            let entry = match entry {
                EntryCompat::Structured(entry) => entry,
                EntryCompat::Legacy(hash) => ManifestEntry {
                    hash,
                    remote_modified_time: None,
                    synced_at,
                },
            };
            (name, entry)
        })
        .collect();

    Ok(Some(Manifest {
        version: MANIFEST_VERSION.to_string(),
        remote_id: raw.remote_id,
        last_sync_timestamp: raw.last_sync_timestamp,
        last_sync_direction: raw.last_sync_direction,
        last_sync_commit_hash: raw.last_sync_commit_hash,
        files,
        is_bootstrap: raw.is_bootstrap,
    }))
}

/// Save `manifest` for `replica`, replacing any previous one.
///
/// The replica must already be a git repository (`.git/` present).
pub fn save(replica: &Path, manifest: &Manifest) -> Result<(), CoreError> {
    let git_dir = replica.join(".git");
    if !git_dir.is_dir() {
        return Err(CoreError::ReplicaNotInitialized {
            path: replica.to_path_buf(),
        });
    }
    let json = serde_json::to_string_pretty(manifest)?;
    persist::write_private(&manifest_path(replica), json.as_bytes())
}

/// Remove the manifest, forcing the next plan to bootstrap. Missing is fine.
pub fn remove(replica: &Path) -> Result<(), CoreError> {
    let path = manifest_path(replica);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(&path, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn replica() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        dir
    }

    #[test]
    fn missing_manifest_loads_as_none() {
        let dir = replica();
        assert!(load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn save_requires_git_dir() {
        let dir = TempDir::new().unwrap();
        let manifest = Manifest::new(RemoteId::from("r1"), SyncDirection::Pull);
        let err = save(dir.path(), &manifest).unwrap_err();
        assert!(matches!(err, CoreError::ReplicaNotInitialized { .. }));
    }

    #[test]
    fn save_writes_camel_case_with_version() {
        let dir = replica();
        let mut manifest = Manifest::new(RemoteId::from("r1"), SyncDirection::Push);
        manifest.files.insert(
            "Code.js".to_string(),
            ManifestEntry {
                hash: "abc".to_string(),
                remote_modified_time: None,
                synced_at: Utc::now(),
            },
        );
        save(dir.path(), &manifest).unwrap();

        let raw = std::fs::read_to_string(manifest_path(dir.path())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["version"], "2.1");
        assert_eq!(value["remoteId"], "r1");
        assert_eq!(value["lastSyncDirection"], "push");
        assert_eq!(value["isBootstrap"], false);
        assert_eq!(value["files"]["Code.js"]["hash"], "abc");
    }

    #[test]
    fn roundtrip_save_load() {
        let dir = replica();
        let mut manifest = Manifest::new(RemoteId::from("r1"), SyncDirection::Pull);
        manifest.last_sync_commit_hash = Some("deadbeef".to_string());
        manifest.files.insert(
            "Page.html".to_string(),
            ManifestEntry {
                hash: "cafebabe".to_string(),
                remote_modified_time: Some(Utc::now()),
                synced_at: Utc::now(),
            },
        );
        save(dir.path(), &manifest).unwrap();
        let loaded = load(dir.path()).unwrap().expect("manifest");
        assert_eq!(loaded, manifest);
        assert!(loaded.tracks("Page.html"));
        assert_eq!(loaded.hash_of("Page.html"), Some("cafebabe"));
    }

    #[test]
    fn legacy_flat_entries_are_migrated() {
        let dir = replica();
        std::fs::write(
            manifest_path(dir.path()),
            r#"{"remoteId":"r1","lastSyncTimestamp":"2025-01-01T00:00:00Z","lastSyncDirection":"pull","files":{"Code.js":"deadbeef"}}"#,
        )
        .unwrap();
        let loaded = load(dir.path()).unwrap().expect("manifest");
        assert_eq!(loaded.version, MANIFEST_VERSION);
        assert_eq!(loaded.hash_of("Code.js"), Some("deadbeef"));
        assert_eq!(loaded.files["Code.js"].synced_at, loaded.last_sync_timestamp);
        assert!(!loaded.is_bootstrap);
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let dir = replica();
        std::fs::write(
            manifest_path(dir.path()),
            r#"{"version":"9.0","remoteId":"r1","lastSyncTimestamp":"2025-01-01T00:00:00Z","lastSyncDirection":"pull"}"#,
        )
        .unwrap();
        assert!(matches!(
            load(dir.path()),
            Err(CoreError::UnsupportedManifestVersion { .. })
        ));
    }

    #[test]
    fn corrupt_manifest_reports_path() {
        let dir = replica();
        std::fs::write(manifest_path(dir.path()), "{not json").unwrap();
        let err = load(dir.path()).unwrap_err();
        assert!(err.to_string().contains(MANIFEST_FILE));
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = replica();
        remove(dir.path()).unwrap();
        save(dir.path(), &Manifest::new(RemoteId::from("r"), SyncDirection::Pull)).unwrap();
        remove(dir.path()).unwrap();
        assert!(load(dir.path()).unwrap().is_none());
    }
}
