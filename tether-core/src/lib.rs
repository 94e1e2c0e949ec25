//! Tether core library — domain types, content hashing, manifest and
//! configuration persistence, errors.
//!
//! Public API surface:
//! - [`types`] — newtypes and shared domain structs
//! - [`hashing`] — git-compatible blob hashing
//! - [`manifest`] — per-replica sync manifest (load / save)
//! - [`config`] — `~/.tether/config.yaml`
//! - [`filter`] — infrastructure-file exclusion shared by both sync sides
//! - [`error`] — [`CoreError`]

pub mod config;
pub mod error;
pub mod filter;
pub mod hashing;
pub mod manifest;
pub mod persist;
pub mod types;

pub use config::Config;
pub use error::CoreError;
pub use hashing::{content_hash, EMPTY_BLOB_HASH};
pub use manifest::{Manifest, ManifestEntry};
pub use types::{
    FileType, LockRecord, PlanId, RemoteFile, RemoteId, SessionId, SyncDirection,
};
