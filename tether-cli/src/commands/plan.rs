//! `tether plan <remote-id>`: dry run.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use tether_core::SyncDirection;

use super::{print_summary, remote_id, GlobalArgs};

/// Arguments for `tether plan`.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Remote project id.
    pub remote_id: String,

    /// `pull` (remote → replica) or `push` (replica → remote).
    #[arg(long, default_value = "pull")]
    pub direction: SyncDirection,

    /// Replica directory.
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl PlanArgs {
    pub async fn run(self, global: &GlobalArgs) -> Result<()> {
        let pipeline = global.pipeline()?;
        let remote_id = remote_id(&self.remote_id);
        let plan = pipeline
            .plan(&remote_id, self.direction, &self.path, &global.token())
            .await
            .with_context(|| format!("planning {} for {remote_id} failed", self.direction))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&plan).context("failed to serialize plan JSON")?
            );
        } else {
            print_summary(&plan.summary);
        }
        Ok(())
    }
}
