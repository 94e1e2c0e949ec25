//! `tether worktree ensure|remove|list|prune`

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use tether_core::SessionId;
use tether_worktree::{WorktreeEntry, WorktreeManager, WorktreeState};

use super::{remote_id, GlobalArgs};

#[derive(Subcommand, Debug)]
pub enum WorktreeCommand {
    /// Create (or reuse) the worktree for a session and print its path.
    Ensure {
        remote_id: String,
        session_id: String,
    },
    /// Remove a session worktree, its branch and its directory.
    Remove {
        remote_id: String,
        session_id: String,
    },
    /// List known worktrees.
    List {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Forget worktrees whose directory no longer exists.
    Prune,
}

#[derive(Tabled)]
struct WorktreeRow {
    #[tabled(rename = "remote")]
    remote: String,
    #[tabled(rename = "session")]
    session: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "files")]
    files: usize,
    #[tabled(rename = "claimed by")]
    claimed_by: String,
    #[tabled(rename = "path")]
    path: String,
}

pub async fn run(command: WorktreeCommand, global: &GlobalArgs) -> Result<()> {
    let home = global.home()?;
    let config = global.config()?;

    match command {
        WorktreeCommand::Ensure {
            remote_id: remote,
            session_id,
        } => {
            let manager = WorktreeManager::at(&home, &config, global.remote(&config)?);
            let remote = remote_id(&remote);
            let session = SessionId::from(session_id.trim());
            let path = manager
                .ensure(&remote, &session, &global.token())
                .await
                .with_context(|| format!("could not prepare worktree for session {session}"))?;
            println!("{}", path.display());
        }
        WorktreeCommand::Remove {
            remote_id: remote,
            session_id,
        } => {
            let manager = offline_manager(global, &home, &config)?;
            let session = SessionId::from(session_id.trim());
            if manager.remove(&remote_id(&remote), &session).await {
                println!("Removed worktree for session {session}.");
            } else {
                println!("No worktree registered for session {session}.");
            }
        }
        WorktreeCommand::List { json } => {
            let manager = offline_manager(global, &home, &config)?;
            let entries = manager.list().context("failed to read worktree config")?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&entries).context("failed to serialize worktree JSON")?
                );
            } else {
                print_table(entries);
            }
        }
        WorktreeCommand::Prune => {
            let manager = offline_manager(global, &home, &config)?;
            let pruned = manager.prune().await.context("failed to prune worktrees")?;
            println!("Pruned {} stale worktree(s).", pruned.len());
        }
    }
    Ok(())
}

/// Commands that never talk to the remote still need a manager; fall back
/// to an empty in-memory remote when none is configured.
fn offline_manager(
    global: &GlobalArgs,
    home: &std::path::Path,
    config: &tether_core::Config,
) -> Result<WorktreeManager> {
    let remote = match global.remote(config) {
        Ok(remote) => remote,
        Err(_) => std::sync::Arc::new(tether_sync::MemoryRemoteStore::new()),
    };
    Ok(WorktreeManager::at(home, config, remote))
}

fn print_table(entries: Vec<WorktreeEntry>) {
    if entries.is_empty() {
        println!("No worktrees.");
        return;
    }
    let rows: Vec<WorktreeRow> = entries
        .into_iter()
        .map(|entry| WorktreeRow {
            remote: entry.remote_id.0,
            session: entry.session_id.0,
            state: match entry.state {
                WorktreeState::Ready => "ready".green().to_string(),
                WorktreeState::Creating => "creating".yellow().to_string(),
            },
            files: entry.base_hashes.len(),
            claimed_by: entry.claimed_by.unwrap_or_else(|| "-".to_string()),
            path: entry.local_path.display().to_string(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
