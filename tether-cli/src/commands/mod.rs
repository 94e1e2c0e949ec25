pub mod conflict;
pub mod diff;
pub mod hash;
pub mod plan;
pub mod status;
pub mod sync;
pub mod worktree;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use tether_core::{config, Config, RemoteId};
use tether_sync::{AuthToken, PlanSummary, Registry, RemoteStore, SyncPipeline};

/// Options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Directory holding `.tether/` (defaults to the user's home).
    #[arg(long, global = true, env = "TETHER_HOME")]
    pub home: Option<PathBuf>,

    /// Bearer token for the remote API. Never written to disk.
    #[arg(long, global = true, env = "TETHER_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Remote store URL (`https://…` or `file://<dir>`); overrides
    /// `remote.base_url` in config.yaml.
    #[arg(long, global = true, env = "TETHER_REMOTE_URL")]
    pub remote_url: Option<String>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,
}

impl GlobalArgs {
    pub fn home(&self) -> Result<PathBuf> {
        match &self.home {
            Some(home) => Ok(home.clone()),
            None => config::home().context("could not determine home directory"),
        }
    }

    pub fn config(&self) -> Result<Config> {
        let home = self.home()?;
        config::load_at(&home)
            .with_context(|| format!("failed to load {}", config::config_path_at(&home).display()))
    }

    pub fn token(&self) -> AuthToken {
        AuthToken::new(self.token.clone().unwrap_or_default())
    }

    pub fn remote(&self, config: &Config) -> Result<Arc<dyn RemoteStore>> {
        let url = self
            .remote_url
            .clone()
            .or_else(|| config.remote.base_url.clone())
            .context("no remote configured; pass --remote-url or set remote.base_url in ~/.tether/config.yaml")?;
        crate::remote::open(&url, Duration::from_secs(config.remote.timeout_secs))
    }

    pub fn pipeline(&self) -> Result<SyncPipeline> {
        let config = self.config()?;
        let remote = self.remote(&config)?;
        Ok(SyncPipeline::new(Arc::new(Registry::new(&config)), remote))
    }
}

pub fn remote_id(raw: &str) -> RemoteId {
    RemoteId::from(raw.trim())
}

/// Human-readable plan summary.
pub fn print_summary(summary: &PlanSummary) {
    let bootstrap = if summary.is_bootstrap { " (bootstrap)" } else { "" };
    println!(
        "{} {} {}{}",
        "Plan".bold(),
        summary.direction,
        summary.remote_id,
        bootstrap
    );
    if summary.total_changes() == 0 {
        println!("No changes.");
    }
    for name in &summary.add {
        println!("  {} {name}", "+".green());
    }
    for name in &summary.update {
        println!("  {} {name}", "~".yellow());
    }
    for name in &summary.delete {
        println!("  {} {name}", "-".red());
    }
    if !summary.skipped_untracked.is_empty() {
        println!(
            "  {} untracked, left alone: {}",
            summary.skipped_untracked.len(),
            tether_sync::status::preview_files(&summary.skipped_untracked)
        );
    }
}
