//! Compensating actions for multi-step writes.
//!
//! Steps register an undo action after they succeed. On failure the list runs
//! in reverse registration order; every action runs even if an earlier one
//! fails, and all failures are collected onto the returned error.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::SyncError;
use crate::git::{Git, ResetMode};
use crate::local::replica_path;
use crate::writer;

/// One undo step.
#[async_trait]
pub trait CompensatingAction: Send + Sync {
    fn describe(&self) -> String;
    async fn run(&self) -> Result<(), SyncError>;
}

/// A compensating action that itself failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompensationFailure {
    pub action: String,
    pub error: String,
}

impl fmt::Display for CompensationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.action, self.error)
    }
}

/// Ordered undo list.
#[derive(Default)]
pub struct Compensations<'a> {
    steps: Vec<Box<dyn CompensatingAction + 'a>>,
}

impl<'a> Compensations<'a> {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn push(&mut self, step: impl CompensatingAction + 'a) {
        self.steps.push(Box::new(step));
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step, last registered first.
    pub async fn run_all(self) -> Vec<CompensationFailure> {
        let mut failures = Vec::new();
        for step in self.steps.into_iter().rev() {
            let action = step.describe();
            match step.run().await {
                Ok(()) => tracing::info!(%action, "compensation applied"),
                Err(err) => {
                    tracing::error!(%action, error = %err, "compensation failed");
                    failures.push(CompensationFailure {
                        action,
                        error: err.to_string(),
                    });
                }
            }
        }
        failures
    }

    /// Run every step and wrap `err` with the rollback outcome.
    pub async fn abort(self, phase: &str, err: SyncError) -> SyncError {
        let rolled_back = !self.is_empty();
        let compensation_failures = self.run_all().await;
        SyncError::Aborted {
            phase: phase.to_string(),
            source: Box::new(err),
            rolled_back,
            compensation_failures,
            recovery: None,
        }
    }
}

/// Move HEAD and index back to a checkpoint, keeping the working tree.
pub struct ResetToCheckpoint {
    pub git: Git,
    pub checkpoint: String,
}

#[async_trait]
impl CompensatingAction for ResetToCheckpoint {
    fn describe(&self) -> String {
        format!("reset {} to {}", self.git.dir().display(), self.checkpoint)
    }

    async fn run(&self) -> Result<(), SyncError> {
        self.git.reset(ResetMode::Mixed, &self.checkpoint).await
    }
}

/// Put files back the way they were before they were touched. Files that did
/// not exist are removed.
pub struct RestoreFiles {
    pub root: PathBuf,
    /// `(disk name, original content)` pairs.
    pub originals: Vec<(String, Option<String>)>,
}

impl RestoreFiles {
    /// Snapshot the current content of `names` under `root`.
    pub fn capture<'n>(
        root: PathBuf,
        names: impl IntoIterator<Item = &'n str>,
    ) -> Result<Self, SyncError> {
        let mut originals = Vec::new();
        for name in names {
            let content = writer::read_optional(&replica_path(&root, name))?;
            originals.push((name.to_string(), content));
        }
        Ok(Self { root, originals })
    }
}

#[async_trait]
impl CompensatingAction for RestoreFiles {
    fn describe(&self) -> String {
        format!(
            "restore {} file(s) in {}",
            self.originals.len(),
            self.root.display()
        )
    }

    async fn run(&self) -> Result<(), SyncError> {
        let mut first_err = None;
        for (name, original) in &self.originals {
            let path = replica_path(&self.root, name);
            let result = match original {
                Some(content) => restore_exact(&path, content),
                None => writer::remove(&path).map(drop),
            };
            if let Err(err) = result {
                tracing::warn!(file = %name, error = %err, "could not restore file");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

// Restores byte-for-byte; `write_atomic` would normalize line endings.
fn restore_exact(path: &std::path::Path, content: &str) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| crate::error::io_err(parent, e))?;
    }
    std::fs::write(path, content).map_err(|e| crate::error::io_err(path, e))
}
