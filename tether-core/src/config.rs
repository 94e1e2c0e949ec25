//! User configuration at `<home>/.tether/config.yaml`.
//!
//! # API pattern
//!
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! A missing file yields [`Config::default`]; unknown keys are ignored and
//! missing keys take their defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::persist;

/// Remote API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the remote store API. `file://<dir>` selects the
    /// directory-backed remote.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 30,
        }
    }
}

/// Tunables for planning, locking and worktrees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Lifetime of a computed plan.
    pub plan_ttl_secs: u64,
    /// TTL of the per-remote execution lock.
    pub lock_ttl_secs: u64,
    /// How long `execute` waits for a held lock before `LOCK_TIMEOUT`.
    pub lock_timeout_ms: u64,
    /// TTL of the persisted cross-process worktree lock.
    pub worktree_lock_ttl_secs: u64,
    /// Override for the worktree base directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktree_base: Option<PathBuf>,
    pub remote: RemoteConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            plan_ttl_secs: 300,
            lock_ttl_secs: 60,
            lock_timeout_ms: 5_000,
            worktree_lock_ttl_secs: 120,
            worktree_base: None,
            remote: RemoteConfig::default(),
        }
    }
}

impl Config {
    pub fn plan_ttl(&self) -> Duration {
        Duration::from_secs(self.plan_ttl_secs)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn worktree_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.worktree_lock_ttl_secs)
    }

    /// Worktree base directory: the configured override, else
    /// `<home>/.tether/worktrees`.
    pub fn worktree_base_at(&self, home: &Path) -> PathBuf {
        self.worktree_base
            .clone()
            .unwrap_or_else(|| tether_root(home).join("worktrees"))
    }
}

/// `<home>/.tether`
pub fn tether_root(home: &Path) -> PathBuf {
    home.join(".tether")
}

/// `<home>/.tether/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    tether_root(home).join("config.yaml")
}

/// Load configuration rooted at `home`.
pub fn load_at(home: &Path) -> Result<Config, CoreError> {
    let path = config_path_at(home);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
        Err(err) => return Err(io_err(&path, err)),
    };
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| CoreError::Parse { path, source })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, CoreError> {
    load_at(&home()?)
}

/// Atomically save configuration rooted at `home`.
pub fn save_at(home: &Path, config: &Config) -> Result<(), CoreError> {
    persist::ensure_private_dir(&tether_root(home))?;
    let yaml = serde_yaml::to_string(config)?;
    persist::write_private(&config_path_at(home), yaml.as_bytes())
}

/// The current user's home directory.
pub fn home() -> Result<PathBuf, CoreError> {
    dirs::home_dir().ok_or(CoreError::HomeNotFound)
}
