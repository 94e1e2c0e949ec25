//! `tether check-conflict <remote-id> <filename>`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use super::{remote_id, GlobalArgs};

/// Arguments for `tether check-conflict`.
#[derive(Args, Debug)]
pub struct CheckConflictArgs {
    /// Remote project id.
    pub remote_id: String,

    /// Replica filename, e.g. `Code.js`.
    pub filename: String,

    /// Hash of the version you last read. Without it the check always passes.
    #[arg(long)]
    pub expected_hash: Option<String>,

    /// Proceed even when the hash no longer matches.
    #[arg(long)]
    pub force: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl CheckConflictArgs {
    pub async fn run(self, global: &GlobalArgs) -> Result<()> {
        let pipeline = global.pipeline()?;
        let remote_id = remote_id(&self.remote_id);
        let check = pipeline
            .check_conflict(
                &remote_id,
                &self.filename,
                self.expected_hash.as_deref(),
                self.force,
                &global.token(),
            )
            .await
            .with_context(|| format!("conflict check for {} failed", self.filename))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&check).context("failed to serialize check JSON")?
            );
            return Ok(());
        }
        let current = check.current_hash.as_deref().unwrap_or("absent");
        println!("{} {} (current hash {current})", "OK".green().bold(), self.filename);
        Ok(())
    }
}
