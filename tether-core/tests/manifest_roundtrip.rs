//! Manifest persistence tests through the public API.

use std::collections::BTreeMap;

use assert_fs::prelude::*;
use chrono::Utc;
use predicates::prelude::predicate;
use rstest::rstest;
use tether_core::{
    manifest::{self, Manifest, ManifestEntry},
    RemoteId, SyncDirection,
};

fn entry(hash: &str) -> ManifestEntry {
    ManifestEntry {
        hash: hash.to_string(),
        remote_modified_time: None,
        synced_at: Utc::now(),
    }
}

#[rstest]
#[case::pull(SyncDirection::Pull, Some("0123abcd"))]
#[case::push(SyncDirection::Push, None)]
fn manifest_survives_roundtrip(#[case] direction: SyncDirection, #[case] commit: Option<&str>) {
    let replica = assert_fs::TempDir::new().unwrap();
    replica.child(".git").create_dir_all().unwrap();

    let mut files = BTreeMap::new();
    files.insert("Code.js".to_string(), entry("aaa"));
    files.insert("ui/Sidebar.html".to_string(), entry("bbb"));
    let manifest = Manifest {
        last_sync_commit_hash: commit.map(str::to_string),
        files,
        ..Manifest::new(RemoteId::from("script-1"), direction)
    };

    manifest::save(replica.path(), &manifest).unwrap();
    let loaded = manifest::load(replica.path()).unwrap().expect("saved manifest");
    assert_eq!(loaded, manifest);
}

#[test]
fn manifest_lives_inside_git_dir() {
    let replica = assert_fs::TempDir::new().unwrap();
    replica.child(".git").create_dir_all().unwrap();
    manifest::save(
        replica.path(),
        &Manifest::new(RemoteId::from("script-1"), SyncDirection::Pull),
    )
    .unwrap();

    replica
        .child(".git/sync-manifest.json")
        .assert(predicate::str::contains("\"remoteId\": \"script-1\""));
    replica
        .child(".git/sync-manifest.json.tmp")
        .assert(predicate::path::missing());
}

#[test]
fn bootstrap_flag_persists() {
    let replica = assert_fs::TempDir::new().unwrap();
    replica.child(".git").create_dir_all().unwrap();
    let manifest = Manifest {
        is_bootstrap: true,
        ..Manifest::new(RemoteId::from("script-1"), SyncDirection::Pull)
    };
    manifest::save(replica.path(), &manifest).unwrap();
    assert!(manifest::load(replica.path()).unwrap().unwrap().is_bootstrap);
}
