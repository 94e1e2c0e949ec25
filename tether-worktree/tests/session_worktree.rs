use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tether_core::{content_hash, Config, FileType, RemoteFile, RemoteId, SessionId};
use tether_sync::{AuthToken, Git, MemoryRemoteStore};
use tether_worktree::{paths, WorktreeError, WorktreeManager, SEED_COMMIT_MESSAGE};

const REMOTE: &str = "proj-wt";

fn remote_id() -> RemoteId {
    RemoteId::from(REMOTE)
}

fn token() -> AuthToken {
    AuthToken::new("test-token")
}

fn seeded_store() -> Arc<MemoryRemoteStore> {
    Arc::new(MemoryRemoteStore::new().with_project(
        REMOTE,
        &[
            ("Code.js", "a\nb\nc\nd\ne\n"),
            ("Page.html", "<p>hi</p>"),
            ("appsscript.json", "{}"),
        ],
    ))
}

fn manager(home: &TempDir, store: &Arc<MemoryRemoteStore>) -> WorktreeManager {
    WorktreeManager::at(home.path(), &Config::default(), store.clone())
}

async fn commit_subject(path: &Path) -> String {
    Git::new(path)
        .run(&["log", "-1", "--format=%s"])
        .await
        .expect("git log")
        .trim()
        .to_string()
}

#[tokio::test]
async fn ensure_seeds_worktree_from_full_remote_snapshot() {
    let home = TempDir::new().expect("home");
    let store = seeded_store();
    let manager = manager(&home, &store);
    let session = SessionId::from("agent-1");

    let path = manager.ensure(&remote_id(), &session, &token()).await.expect("ensure");
    assert_eq!(path, paths::session_dir(manager.base(), &remote_id(), &session));
    assert!(path.starts_with(home.path().join(".tether").join("worktrees")));
    assert_eq!(fs::read_to_string(path.join("Page.html")).expect("read"), "<p>hi</p>");
    assert_eq!(fs::read_to_string(path.join("appsscript.json")).expect("read"), "{}");

    assert_eq!(commit_subject(&path).await, SEED_COMMIT_MESSAGE);
    assert_eq!(
        Git::new(&path).current_branch().await.expect("branch").as_deref(),
        Some("session/agent-1")
    );

    let entry = manager.get(&remote_id(), &session).expect("entry");
    assert!(entry.is_ready());
    assert_eq!(entry.base_hashes.len(), 3);
    assert_eq!(
        entry.base_hashes.get("Page.html"),
        Some(&content_hash("<p>hi</p>"))
    );
    assert_eq!(entry.seed_commit, Git::new(&path).head().await.expect("head"));
    assert!(manager.exists(&remote_id(), &session).expect("exists"));
    assert!(manager.store().load().expect("load").locks.is_empty());
}

#[tokio::test]
async fn second_ensure_reuses_the_ready_worktree() {
    let home = TempDir::new().expect("home");
    let store = seeded_store();
    let manager = manager(&home, &store);
    let session = SessionId::from("agent-1");

    let first = manager.ensure(&remote_id(), &session, &token()).await.expect("first");
    let second = manager.ensure(&remote_id(), &session, &token()).await.expect("second");
    assert_eq!(first, second);
    assert_eq!(store.list_calls(), 1);
}

#[tokio::test]
async fn concurrent_sessions_of_one_remote_share_the_main_repo() {
    let home = TempDir::new().expect("home");
    let store = seeded_store();
    let manager = manager(&home, &store);
    let (a, b) = (SessionId::from("a"), SessionId::from("b"));

    let (remote, auth) = (remote_id(), token());
    let (first, second) = tokio::join!(
        manager.ensure(&remote, &a, &auth),
        manager.ensure(&remote, &b, &auth),
    );
    let (first, second) = (first.expect("a"), second.expect("b"));
    assert_ne!(first, second);

    let main = Git::new(paths::main_repo(manager.base(), &remote_id()));
    let registered = main.worktree_list().await.expect("worktree list");
    assert_eq!(registered.len(), 3);
    assert_eq!(manager.list().expect("list").len(), 2);
}

#[tokio::test]
async fn conflict_warning_tracks_base_hashes() {
    let home = TempDir::new().expect("home");
    let store = seeded_store();
    let manager = manager(&home, &store);
    let session = SessionId::from("agent-1");
    manager.ensure(&remote_id(), &session, &token()).await.expect("ensure");

    let unchanged = manager
        .check_conflict(&remote_id(), &session, "Page.html", "<p>hi</p>")
        .expect("check");
    assert!(unchanged.is_none());

    let warning = manager
        .check_conflict(&remote_id(), &session, "Page.html", "<p>bye</p>")
        .expect("check")
        .expect("warning");
    assert!(warning.contains("Page.html"));
    assert!(warning.contains(&content_hash("<p>hi</p>")[..8]));

    let created_later = manager
        .check_conflict(&remote_id(), &session, "New.js", "x")
        .expect("check");
    assert!(created_later.is_none());

    manager
        .update_base_hash(&remote_id(), &session, "Page.html", "<p>bye</p>")
        .expect("update");
    let after_update = manager
        .check_conflict(&remote_id(), &session, "Page.html", "<p>bye</p>")
        .expect("check");
    assert!(after_update.is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn failed_seed_commit_leaves_no_worktree_behind() {
    use std::os::unix::fs::PermissionsExt;

    let home = TempDir::new().expect("home");
    let store = seeded_store();
    let manager = manager(&home, &store);
    let session = SessionId::from("agent-1");

    let main_path = paths::main_repo(manager.base(), &remote_id());
    let main = Git::new(&main_path);
    main.ensure_repo().await.expect("main repo");
    let hook = main_path.join(".git/hooks/pre-commit");
    fs::create_dir_all(hook.parent().expect("hooks dir")).expect("create hooks dir");
    fs::write(&hook, "#!/bin/sh\nexit 1\n").expect("write hook");
    fs::set_permissions(&hook, fs::Permissions::from_mode(0o755)).expect("chmod hook");

    let err = manager
        .ensure(&remote_id(), &session, &token())
        .await
        .unwrap_err();
    assert!(matches!(err, WorktreeError::Sync(_)), "{err:?}");

    assert!(!manager.exists(&remote_id(), &session).expect("exists"));
    assert!(manager.get(&remote_id(), &session).is_err());
    assert!(!paths::session_dir(manager.base(), &remote_id(), &session).exists());
    assert!(!main.branch_exists("session/agent-1").await.expect("branch check"));
    assert!(manager.store().load().expect("load").locks.is_empty());

    fs::remove_file(&hook).expect("remove hook");
    let path = manager.ensure(&remote_id(), &session, &token()).await.expect("retry");
    assert!(path.join("Code.js").exists());
}

#[tokio::test]
async fn failed_remote_listing_rolls_back_creation() {
    let home = TempDir::new().expect("home");
    let store = seeded_store();
    let manager = manager(&home, &store);
    let session = SessionId::from("agent-1");
    store.fail_next_list("401 unauthorized");

    let err = manager
        .ensure(&remote_id(), &session, &token())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("401"));
    assert!(!manager.exists(&remote_id(), &session).expect("exists"));
    assert!(manager.list().expect("list").is_empty());
    assert!(!paths::session_dir(manager.base(), &remote_id(), &session).exists());
}

#[tokio::test]
async fn stale_directory_is_cleared_before_creation() {
    let home = TempDir::new().expect("home");
    let store = seeded_store();
    let manager = manager(&home, &store);
    let session = SessionId::from("agent-1");

    let stale = paths::session_dir(manager.base(), &remote_id(), &session);
    fs::create_dir_all(&stale).expect("stale dir");
    fs::write(stale.join("leftover.txt"), "junk").expect("leftover");

    let path = manager.ensure(&remote_id(), &session, &token()).await.expect("ensure");
    assert!(!path.join("leftover.txt").exists());
    assert!(path.join("Code.js").exists());
}

#[tokio::test]
async fn remove_tears_down_directory_branch_and_entry() {
    let home = TempDir::new().expect("home");
    let store = seeded_store();
    let manager = manager(&home, &store);
    let session = SessionId::from("agent-1");
    let path = manager.ensure(&remote_id(), &session, &token()).await.expect("ensure");

    assert!(manager.remove(&remote_id(), &session).await);
    assert!(!path.exists());
    assert!(!manager.exists(&remote_id(), &session).expect("exists"));
    let main = Git::new(paths::main_repo(manager.base(), &remote_id()));
    assert!(!main.branch_exists("session/agent-1").await.expect("branch check"));

    // Removing again is harmless.
    assert!(!manager.remove(&remote_id(), &session).await);
}

#[tokio::test]
async fn prune_drops_entries_whose_directory_vanished() {
    let home = TempDir::new().expect("home");
    let store = seeded_store();
    let manager = manager(&home, &store);
    let (kept, lost) = (SessionId::from("kept"), SessionId::from("lost"));
    manager.ensure(&remote_id(), &kept, &token()).await.expect("kept");
    let lost_path = manager.ensure(&remote_id(), &lost, &token()).await.expect("lost");

    fs::remove_dir_all(&lost_path).expect("delete worktree dir");
    let pruned = manager.prune().await.expect("prune");
    assert_eq!(pruned.len(), 1);
    assert_eq!(pruned[0].session_id, lost);

    let remaining = manager.list().expect("list");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].session_id, kept);
}

#[tokio::test]
async fn claims_are_exclusive_until_released() {
    let home = TempDir::new().expect("home");
    let store = seeded_store();
    let manager = manager(&home, &store);
    let session = SessionId::from("agent-1");
    manager.ensure(&remote_id(), &session, &token()).await.expect("ensure");

    manager.claim(&remote_id(), &session, "alice").expect("claim");
    manager.claim(&remote_id(), &session, "alice").expect("re-claim");
    let err = manager.claim(&remote_id(), &session, "bob").unwrap_err();
    assert!(matches!(err, WorktreeError::Claimed { ref claimed_by, .. } if claimed_by == "alice"));
    assert!(manager.release(&remote_id(), &session, "bob").is_err());

    manager.release(&remote_id(), &session, "alice").expect("release");
    manager.claim(&remote_id(), &session, "bob").expect("claim after release");
}

#[tokio::test]
async fn live_lock_from_another_process_blocks_creation() {
    let home = TempDir::new().expect("home");
    let store = seeded_store();
    let manager = manager(&home, &store);
    manager
        .store()
        .acquire_lock(&remote_id(), "pid-999999/other", "create worktree", Duration::from_secs(60))
        .expect("foreign lock");

    let err = manager
        .ensure(&remote_id(), &SessionId::from("agent-1"), &token())
        .await
        .unwrap_err();
    assert!(matches!(err, WorktreeError::Locked { .. }), "{err:?}");
    assert!(!err.next_action().is_empty());
}

#[tokio::test]
async fn expired_lock_from_crashed_process_is_taken_over() {
    let home = TempDir::new().expect("home");
    let store = seeded_store();
    let manager = manager(&home, &store);
    manager
        .store()
        .acquire_lock(&remote_id(), "pid-999999/crashed", "create worktree", Duration::ZERO)
        .expect("expired lock");

    manager
        .ensure(&remote_id(), &SessionId::from("agent-1"), &token())
        .await
        .expect("ensure");
}

#[tokio::test]
async fn invalid_ids_are_rejected_before_touching_disk() {
    let home = TempDir::new().expect("home");
    let store = seeded_store();
    let manager = manager(&home, &store);

    let err = manager
        .ensure(&remote_id(), &SessionId::from("../escape"), &token())
        .await
        .unwrap_err();
    assert!(matches!(err, WorktreeError::InvalidSession(_)));
    let err = manager
        .ensure(&RemoteId::from("a/b"), &SessionId::from("ok"), &token())
        .await
        .unwrap_err();
    assert!(matches!(err, WorktreeError::InvalidRemote(_)));
    assert!(!manager.base().exists());
}

#[tokio::test]
async fn incoming_remote_edit_merges_with_session_edit() {
    let home = TempDir::new().expect("home");
    let store = seeded_store();
    let manager = manager(&home, &store);
    let session = SessionId::from("agent-1");
    let path = manager.ensure(&remote_id(), &session, &token()).await.expect("ensure");

    fs::write(path.join("Code.js"), "A\nb\nc\nd\ne\n").expect("session edit");
    let outcome = manager
        .merge_incoming(&remote_id(), &session, "Code.js", "a\nb\nc\nd\nE\n")
        .await
        .expect("merge");
    assert!(outcome.is_clean());
    assert_eq!(outcome.merged, "A\nb\nc\nd\nE\n");
}

#[tokio::test]
async fn seeding_skips_remote_names_that_escape_the_worktree() {
    let home = TempDir::new().expect("home");
    let store = seeded_store();
    store.put_raw(
        &remote_id(),
        RemoteFile {
            name: "../escaped".into(),
            content: "pwned".into(),
            file_type: FileType::Script,
            modified_time: None,
        },
    );
    let manager = manager(&home, &store);
    let session = SessionId::from("agent-esc");

    let path = manager.ensure(&remote_id(), &session, &token()).await.expect("ensure");
    let parent = path.parent().expect("remote dir");
    assert!(!parent.join("escaped.js").exists());
    assert!(!path.join("escaped.js").exists());

    let entry = manager.get(&remote_id(), &session).expect("entry");
    assert_eq!(entry.base_hashes.len(), 3);
    assert!(!entry.base_hashes.contains_key("../escaped.js"));

    let err = manager
        .merge_incoming(&remote_id(), &session, "../escaped.js", "theirs")
        .await
        .unwrap_err();
    assert!(matches!(err, WorktreeError::Sync(_)), "got {err:?}");
}
