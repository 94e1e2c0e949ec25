//! tether-worktree: per-session git worktrees seeded from a remote
//! snapshot.
//!
//! Each agent session gets its own branch (`session/{id}`) checked out in a
//! worktree of a shared main repository per remote project. The worktree is
//! created lazily, seeded with one commit holding the full remote file set,
//! and remembers the hash of every seeded file so later writes can warn
//! about files that changed underneath the session.

pub mod error;
pub mod manager;
pub mod paths;
pub mod store;

pub use error::WorktreeError;
pub use manager::{WorktreeManager, SEED_COMMIT_MESSAGE};
pub use store::{WorktreeConfig, WorktreeEntry, WorktreeState, WorktreeStore};
