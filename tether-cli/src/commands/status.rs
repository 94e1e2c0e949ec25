//! `tether status [<dir>...]`: replica state against its manifest.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use tether_core::manifest;
use tether_sync::status::{check, format_datetime_age, preview_files};
use tether_sync::ReplicaStatus;

/// Arguments for `tether status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Replica directories (default: current directory).
    pub paths: Vec<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct ReplicaStatusJson {
    path: String,
    remote_id: Option<String>,
    status: String,
    files: Vec<String>,
    last_sync_at: Option<String>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "replica")]
    path: String,
    #[tabled(rename = "remote")]
    remote: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "detail")]
    detail: String,
    #[tabled(rename = "last sync")]
    last_sync: String,
}

struct Row {
    path: PathBuf,
    remote_id: Option<String>,
    status: ReplicaStatus,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let paths = if self.paths.is_empty() {
            vec![PathBuf::from(".")]
        } else {
            self.paths
        };

        let mut rows = Vec::new();
        for path in paths {
            let status = check(&path).with_context(|| format!("status check failed for {}", path.display()))?;
            let remote_id = manifest::load(&path)
                .with_context(|| format!("failed to read manifest in {}", path.display()))?
                .map(|m| m.remote_id.0);
            rows.push(Row {
                path,
                remote_id,
                status,
            });
        }

        if self.json {
            return print_json(rows);
        }
        print_table(rows);
        Ok(())
    }
}

fn status_key(status: &ReplicaStatus) -> &'static str {
    match status {
        ReplicaStatus::NeverSynced => "never_synced",
        ReplicaStatus::Current { .. } => "current",
        ReplicaStatus::Missing { .. } => "missing",
        ReplicaStatus::Modified { .. } => "modified",
        ReplicaStatus::Untracked { .. } => "untracked",
    }
}

fn status_label(status: &ReplicaStatus) -> String {
    match status {
        ReplicaStatus::NeverSynced => "NEVER SYNCED".bright_black().to_string(),
        ReplicaStatus::Current { .. } => "CURRENT".green().to_string(),
        ReplicaStatus::Missing { .. } => "MISSING".red().to_string(),
        ReplicaStatus::Modified { .. } => "MODIFIED".yellow().to_string(),
        ReplicaStatus::Untracked { .. } => "UNTRACKED".cyan().to_string(),
    }
}

fn files_of(status: &ReplicaStatus) -> &[String] {
    match status {
        ReplicaStatus::Missing { files }
        | ReplicaStatus::Modified { files }
        | ReplicaStatus::Untracked { files } => files,
        ReplicaStatus::NeverSynced | ReplicaStatus::Current { .. } => &[],
    }
}

fn print_json(rows: Vec<Row>) -> Result<()> {
    let payload: Vec<ReplicaStatusJson> = rows
        .into_iter()
        .map(|row| ReplicaStatusJson {
            path: row.path.display().to_string(),
            remote_id: row.remote_id,
            status: status_key(&row.status).to_string(),
            files: files_of(&row.status).to_vec(),
            last_sync_at: match &row.status {
                ReplicaStatus::Current { last_sync } => Some(last_sync.to_rfc3339()),
                _ => None,
            },
        })
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(rows: Vec<Row>) {
    let needs_sync = rows
        .iter()
        .filter(|r| !matches!(r.status, ReplicaStatus::Current { .. }))
        .count();
    let table_rows: Vec<StatusTableRow> = rows
        .into_iter()
        .map(|row| StatusTableRow {
            path: row.path.display().to_string(),
            remote: row.remote_id.unwrap_or_else(|| "-".to_string()),
            status: status_label(&row.status),
            detail: preview_files(files_of(&row.status)),
            last_sync: match &row.status {
                ReplicaStatus::Current { last_sync } => format_datetime_age(*last_sync),
                ReplicaStatus::NeverSynced => "never".to_string(),
                _ => "-".to_string(),
            },
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");
    if needs_sync > 0 {
        println!("Run 'tether sync <remote-id> --path <dir>' to bring replicas up to date.");
    }
}
