//! `tether sync <remote-id>`: plan and execute in one process.
//!
//! Plans live in process memory, so the CLI cannot execute a plan computed
//! by an earlier `tether plan` run; `sync` re-plans and executes at once.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use tether_core::SyncDirection;
use tether_sync::{ExecutionResult, PlanSummary};

use super::{print_summary, remote_id, GlobalArgs};

/// Arguments for `tether sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Remote project id.
    pub remote_id: String,

    /// `pull` (remote → replica) or `push` (replica → remote).
    #[arg(long, default_value = "pull")]
    pub direction: SyncDirection,

    /// Replica directory.
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// Confirm deletions the plan contains.
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct SyncReport<'a> {
    plan: &'a PlanSummary,
    result: &'a ExecutionResult,
}

impl SyncArgs {
    pub async fn run(self, global: &GlobalArgs) -> Result<()> {
        let pipeline = global.pipeline()?;
        let remote_id = remote_id(&self.remote_id);
        let token = global.token();

        let plan = pipeline
            .plan(&remote_id, self.direction, &self.path, &token)
            .await
            .with_context(|| format!("planning {} for {remote_id} failed", self.direction))?;
        if !self.json {
            print_summary(&plan.summary);
        }

        let result = pipeline
            .execute(&plan.plan_id, self.yes, &token)
            .await
            .with_context(|| format!("{} for {remote_id} failed", self.direction))?;

        if self.json {
            let report = SyncReport {
                plan: &plan.summary,
                result: &result,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize sync JSON")?
            );
            return Ok(());
        }

        println!(
            "{} {} added, {} updated, {} deleted",
            "Synced:".green().bold(),
            result.files_added.len(),
            result.files_updated.len(),
            result.files_deleted.len()
        );
        if let Some(sha) = &result.commit_sha {
            println!("Commit: {sha}");
        }
        println!("Undo: {}", result.recovery_info);
        Ok(())
    }
}
