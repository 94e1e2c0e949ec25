use std::path::{Path, PathBuf};

use tether_core::config::tether_root;
use tether_core::{RemoteId, SessionId};

pub const WORKTREE_CONFIG: &str = "worktrees.yaml";
pub const MAIN_REPO_DIR: &str = ".main";

/// `<home>/.tether/worktrees.yaml`
pub fn config_path_at(home: &Path) -> PathBuf {
    tether_root(home).join(WORKTREE_CONFIG)
}

/// `<base>/<remoteId>`
pub fn remote_dir(base: &Path, remote_id: &RemoteId) -> PathBuf {
    base.join(&remote_id.0)
}

/// `<base>/<remoteId>/.main`, the repository every session worktree hangs off.
pub fn main_repo(base: &Path, remote_id: &RemoteId) -> PathBuf {
    remote_dir(base, remote_id).join(MAIN_REPO_DIR)
}

/// `<base>/<remoteId>/<sessionId>`
pub fn session_dir(base: &Path, remote_id: &RemoteId, session_id: &SessionId) -> PathBuf {
    remote_dir(base, remote_id).join(&session_id.0)
}

/// A remote id is used as one directory name.
pub fn is_safe_remote_id(remote_id: &RemoteId) -> bool {
    let id = remote_id.0.as_str();
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_nests_sessions_beside_main_repo() {
        let base = Path::new("/h/.tether/worktrees");
        let remote = RemoteId::from("abc");
        assert_eq!(main_repo(base, &remote), PathBuf::from("/h/.tether/worktrees/abc/.main"));
        assert_eq!(
            session_dir(base, &remote, &SessionId::from("s1")),
            PathBuf::from("/h/.tether/worktrees/abc/s1")
        );
        assert_eq!(
            config_path_at(Path::new("/h")),
            PathBuf::from("/h/.tether/worktrees.yaml")
        );
    }

    #[test]
    fn remote_ids_cannot_escape_the_base() {
        assert!(is_safe_remote_id(&RemoteId::from("1AbC-d_e")));
        assert!(!is_safe_remote_id(&RemoteId::from("../etc")));
        assert!(!is_safe_remote_id(&RemoteId::from("a/b")));
        assert!(!is_safe_remote_id(&RemoteId::from("")));
    }
}
