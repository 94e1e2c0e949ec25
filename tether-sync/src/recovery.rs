//! Manual recovery instructions returned with every execution.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use tether_core::RemoteId;

/// How to undo (or inspect) what an execution did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryInfo {
    /// Local commit the replica pointed at before the apply, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<String>,
    /// A literal command restoring the pre-apply local state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub note: String,
}

impl RecoveryInfo {
    /// Pull: the replica can be reset to the pre-apply checkpoint.
    pub fn for_pull(local_path: &Path, checkpoint: &str) -> Self {
        Self {
            checkpoint: Some(checkpoint.to_string()),
            command: Some(format!(
                "git -C {} reset --hard {}",
                shell_quote(&local_path.display().to_string()),
                checkpoint
            )),
            note: "Resets the local replica to its state before this sync.".to_string(),
        }
    }

    /// Push: the remote has no transactions, so there is nothing to run
    /// locally that would revert it.
    pub fn for_push(remote_id: &RemoteId, previous_commit: Option<&str>) -> Self {
        let restore = match previous_commit {
            Some(sha) => format!(
                " To restore, check out the previously synced files (git checkout {sha} -- .) and push again."
            ),
            None => " To restore, put the previous file contents back locally and push again."
                .to_string(),
        };
        Self {
            checkpoint: previous_commit.map(str::to_string),
            command: None,
            note: format!(
                "Remote project {remote_id} was replaced in one call; no automatic revert is possible.{restore}"
            ),
        }
    }
}

impl fmt::Display for RecoveryInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.command {
            Some(command) => write!(f, "{} Run: {command}", self.note),
            None => f.write_str(&self.note),
        }
    }
}

fn shell_quote(value: &str) -> String {
    if value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '-' | '_'))
    {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}
