//! Three-way text merge via `git merge-file`.

use std::path::PathBuf;

use uuid::Uuid;

use crate::error::{io_err, SyncError};
use crate::git::{git_failure, Git};

/// Merge result. `conflicts > 0` means `merged` contains conflict markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub merged: String,
    pub conflicts: usize,
}

impl MergeOutcome {
    pub fn is_clean(&self) -> bool {
        self.conflicts == 0
    }
}

/// Merge `ours` and `theirs`, both derived from `base`.
pub async fn three_way_merge(base: &str, ours: &str, theirs: &str) -> Result<MergeOutcome, SyncError> {
    let dir = std::env::temp_dir().join(format!("tether-merge-{}", Uuid::new_v4()));
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| io_err(&dir, e))?;
    let result = merge_in(&dir, base, ours, theirs).await;
    if let Err(err) = tokio::fs::remove_dir_all(&dir).await {
        tracing::debug!(dir = %dir.display(), error = %err, "could not remove merge scratch dir");
    }
    result
}

async fn merge_in(dir: &std::path::Path, base: &str, ours: &str, theirs: &str) -> Result<MergeOutcome, SyncError> {
    let write = |name: &str, content: &str| -> Result<PathBuf, SyncError> {
        let path = dir.join(name);
        std::fs::write(&path, content).map_err(|e| io_err(&path, e))?;
        Ok(path)
    };
    let ours_path = write("ours", ours)?;
    let base_path = write("base", base)?;
    let theirs_path = write("theirs", theirs)?;

    let (ours_arg, base_arg, theirs_arg) = (
        ours_path.to_string_lossy().into_owned(),
        base_path.to_string_lossy().into_owned(),
        theirs_path.to_string_lossy().into_owned(),
    );
    let args = [
        "merge-file",
        "-p",
        "-L",
        "ours",
        "-L",
        "base",
        "-L",
        "theirs",
        ours_arg.as_str(),
        base_arg.as_str(),
        theirs_arg.as_str(),
    ];
    let output = Git::new(dir).output(&args).await?;
    // Exit status is the conflict count; negative (>127 as u8) is an error.
    match output.status.code() {
        Some(code) if (0..=127).contains(&code) => Ok(MergeOutcome {
            merged: String::from_utf8_lossy(&output.stdout).into_owned(),
            conflicts: code as usize,
        }),
        _ => Err(git_failure(&args, &output)),
    }
}
