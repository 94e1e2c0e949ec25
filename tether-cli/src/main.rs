//! Tether: sync a remote script project with a local git replica.
//!
//! # Usage
//!
//! ```text
//! tether plan <remote-id> [--direction pull|push] [--path <dir>] [--json]
//! tether sync <remote-id> [--direction pull|push] [--path <dir>] [--yes] [--json]
//! tether check-conflict <remote-id> <filename> [--expected-hash <sha>] [--force]
//! tether status [<dir>...] [--json]
//! tether hash <file>...
//! tether diff <remote-id> <filename> [--path <dir>]
//! tether worktree ensure|remove|list|prune
//! ```

mod commands;
mod logging;
mod remote;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

use commands::{
    conflict::CheckConflictArgs, diff::DiffArgs, hash::HashArgs, plan::PlanArgs, status::StatusArgs,
    sync::SyncArgs, worktree::WorktreeCommand, GlobalArgs,
};
use tether_sync::SyncError;
use tether_worktree::WorktreeError;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "tether",
    version,
    about = "Two-phase sync between a remote script project and a local git replica",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute what a sync would change, without changing anything.
    Plan(PlanArgs),

    /// Plan and execute a sync in one step.
    Sync(SyncArgs),

    /// Check whether a file still has the hash you last saw.
    CheckConflict(CheckConflictArgs),

    /// Show replica status against its last sync.
    Status(StatusArgs),

    /// Print git blob hashes of files after line-ending normalization.
    Hash(HashArgs),

    /// Show a unified diff between the remote and the local copy of a file.
    Diff(DiffArgs),

    /// Manage per-session worktrees.
    Worktree {
        #[command(subcommand)]
        command: WorktreeCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_tracing(cli.global.log_json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            if let Some(hint) = next_action(&err) {
                eprintln!("{} {hint}", "hint:".yellow());
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let global = cli.global;
    match cli.command {
        Commands::Plan(args) => args.run(&global).await,
        Commands::Sync(args) => args.run(&global).await,
        Commands::CheckConflict(args) => args.run(&global).await,
        Commands::Status(args) => args.run(),
        Commands::Hash(args) => args.run(),
        Commands::Diff(args) => args.run(&global).await,
        Commands::Worktree { command } => commands::worktree::run(command, &global).await,
    }
}

/// The library's suggested next step for the first typed error in the chain.
fn next_action(err: &anyhow::Error) -> Option<String> {
    err.chain().find_map(|cause| {
        if let Some(sync) = cause.downcast_ref::<SyncError>() {
            return Some(format!("[{}] {}", sync.code(), sync.next_action()));
        }
        cause
            .downcast_ref::<WorktreeError>()
            .map(WorktreeError::next_action)
    })
}
