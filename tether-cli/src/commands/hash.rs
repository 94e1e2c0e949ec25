//! `tether hash <file>...`: same digest the manifest records.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use tether_core::hashing::bytes_hash;

/// Arguments for `tether hash`.
#[derive(Args, Debug)]
pub struct HashArgs {
    /// Files to hash.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

impl HashArgs {
    pub fn run(self) -> Result<()> {
        for path in &self.files {
            let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            println!("{}  {}", bytes_hash(&bytes), path.display());
        }
        Ok(())
    }
}
