//! Error types for tether-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from core persistence operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (manifest write path).
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Manifest JSON could not be parsed.
    #[error("failed to parse manifest at {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// YAML serialization error (config write path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load: includes file path.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.tether/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The replica has no `.git` directory to hold the manifest.
    #[error("{path} is not a git replica (missing .git directory); run a pull first")]
    ReplicaNotInitialized { path: PathBuf },

    /// Manifest was written by an incompatible version.
    #[error("manifest at {path} has unsupported version {version}")]
    UnsupportedManifestVersion { path: PathBuf, version: String },

    /// A filename would resolve outside the replica root.
    #[error("'{filename}' is not a safe relative path (no '..', '.', empty segments, leading '/' or '\\')")]
    UnsafeFilename { filename: String },

    /// A filename could not be mapped to a remote file type.
    #[error("'{filename}' has no syncable extension (expected .js, .gs, .html or .json)")]
    UnsupportedFileType { filename: String },
}

/// Convenience constructor for [`CoreError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
