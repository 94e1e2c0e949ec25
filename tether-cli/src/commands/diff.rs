//! `tether diff <remote-id> <filename>`: remote vs. replica copy.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use tether_sync::differ::unified_diff;
use tether_sync::local::replica_path;
use tether_sync::{writer, FileSet};

use super::{remote_id, GlobalArgs};

/// Arguments for `tether diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Remote project id.
    pub remote_id: String,

    /// Replica filename, e.g. `Code.js`.
    pub filename: String,

    /// Replica directory.
    #[arg(long, default_value = ".")]
    pub path: PathBuf,
}

impl DiffArgs {
    pub async fn run(self, global: &GlobalArgs) -> Result<()> {
        let config = global.config()?;
        let remote = global.remote(&config)?;
        let remote_id = remote_id(&self.remote_id);

        let files = remote
            .list_all_files(&remote_id, &global.token())
            .await
            .with_context(|| format!("failed to list files of {remote_id}"))?;
        let remote_files = FileSet::from_remote(files);
        let remote_content = remote_files
            .get(&self.filename)
            .map(|f| f.content.clone())
            .unwrap_or_default();
        let local_path = replica_path(&self.path, &self.filename);
        let local_content = writer::read_optional(&local_path)
            .with_context(|| format!("failed to read {}", local_path.display()))?
            .unwrap_or_default();

        let diff = unified_diff(&remote_content, &local_content, &self.filename);
        if diff.is_empty() {
            println!("No differences for '{}'.", self.filename);
            return Ok(());
        }
        print!("{diff}");
        if !diff.ends_with('\n') {
            println!();
        }
        Ok(())
    }
}
