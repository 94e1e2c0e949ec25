//! Optimistic-concurrency guard for direct file writes.
//!
//! A caller that read a file passes the hash it saw as `expected_hash`. The
//! write proceeds only if the file still hashes the same, unless `force` is
//! set or no expectation was given.

use std::fmt;

use serde::Serialize;

use tether_core::hashing::short;
use tether_core::RemoteId;

use crate::differ::diff_summary;
use crate::error::SyncError;

/// Where the current hash came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HashSource {
    Remote,
    Local,
    Worktree,
}

impl fmt::Display for HashSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HashSource::Remote => "remote",
            HashSource::Local => "local",
            HashSource::Worktree => "worktree",
        };
        f.write_str(label)
    }
}

/// Everything a caller needs to resolve a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictDetails {
    pub remote_id: RemoteId,
    pub filename: String,
    pub operation: String,
    pub expected_hash: String,
    /// `None` when the file no longer exists.
    pub current_hash: Option<String>,
    pub hash_source: HashSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_summary: Option<String>,
}

impl fmt::Display for ConflictDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = self
            .current_hash
            .as_deref()
            .map(short)
            .unwrap_or("absent");
        write!(
            f,
            "conflict on {} during {} in {}: expected {} but {} hash is {}",
            self.filename,
            self.operation,
            self.remote_id,
            short(&self.expected_hash),
            self.hash_source,
            current
        )?;
        if let Some(summary) = &self.diff_summary {
            write!(f, " ({summary})")?;
        }
        Ok(())
    }
}

/// Result of a conflict check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictCheck {
    pub proceed: bool,
    pub current_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictDetails>,
}

/// What is being checked.
#[derive(Debug, Clone, Copy)]
pub struct ConflictContext<'a> {
    pub remote_id: &'a RemoteId,
    pub filename: &'a str,
    pub operation: &'a str,
    pub hash_source: HashSource,
    /// Content the caller intends to write, for the diff summary.
    pub proposed: Option<&'a str>,
}

/// Stateless hash comparison.
pub struct ConflictGuard;

impl ConflictGuard {
    /// Compare `expected_hash` with the hash of `current` content.
    pub fn check(
        ctx: &ConflictContext<'_>,
        expected_hash: Option<&str>,
        current: Option<&str>,
        force: bool,
    ) -> ConflictCheck {
        let current_hash = current.map(tether_core::content_hash);
        let Some(expected) = expected_hash else {
            return ConflictCheck {
                proceed: true,
                current_hash,
                conflict: None,
            };
        };
        if force {
            if current_hash.as_deref() != Some(expected) {
                tracing::warn!(file = %ctx.filename, "overwriting changed file (force)");
            }
            return ConflictCheck {
                proceed: true,
                current_hash,
                conflict: None,
            };
        }
        if current_hash.as_deref() == Some(expected) {
            return ConflictCheck {
                proceed: true,
                current_hash,
                conflict: None,
            };
        }

        let diff_summary = match (current, ctx.proposed) {
            (Some(current), Some(proposed)) => Some(diff_summary(current, proposed)),
            _ => None,
        };
        let details = ConflictDetails {
            remote_id: ctx.remote_id.clone(),
            filename: ctx.filename.to_string(),
            operation: ctx.operation.to_string(),
            expected_hash: expected.to_string(),
            current_hash: current_hash.clone(),
            hash_source: ctx.hash_source,
            diff_summary,
        };
        ConflictCheck {
            proceed: false,
            current_hash,
            conflict: Some(details),
        }
    }

    /// [`check`](Self::check), turning a blocked write into
    /// [`SyncError::Conflict`].
    pub fn enforce(
        ctx: &ConflictContext<'_>,
        expected_hash: Option<&str>,
        current: Option<&str>,
        force: bool,
    ) -> Result<ConflictCheck, SyncError> {
        let check = Self::check(ctx, expected_hash, current, force);
        match check.conflict {
            Some(details) => {
                tracing::info!(file = %details.filename, "write blocked by conflict");
                Err(SyncError::Conflict(Box::new(details)))
            }
            None => Ok(check),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::content_hash;

    fn ctx<'a>(remote_id: &'a RemoteId, proposed: Option<&'a str>) -> ConflictContext<'a> {
        ConflictContext {
            remote_id,
            filename: "Code.js",
            operation: "write",
            hash_source: HashSource::Remote,
            proposed,
        }
    }

    #[test]
    fn matching_hash_proceeds() {
        let id = RemoteId::from("r");
        let hash = content_hash("a\n");
        let check = ConflictGuard::check(&ctx(&id, None), Some(&hash), Some("a\n"), false);
        assert!(check.proceed);
        assert_eq!(check.current_hash.as_deref(), Some(hash.as_str()));
    }

    #[test]
    fn mismatched_hash_blocks_with_details() {
        let id = RemoteId::from("r");
        let hash = content_hash("a\n");
        let check = ConflictGuard::check(
            &ctx(&id, Some("mine\n")),
            Some(&hash),
            Some("theirs\n"),
            false,
        );
        assert!(!check.proceed);
        let details = check.conflict.expect("conflict");
        assert_eq!(details.expected_hash, hash);
        assert_eq!(details.current_hash, Some(content_hash("theirs\n")));
        assert_eq!(details.diff_summary.as_deref(), Some("+1 -1 lines"));
    }

    #[test]
    fn force_and_missing_expectation_always_proceed() {
        let id = RemoteId::from("r");
        let stale = content_hash("old");
        assert!(ConflictGuard::check(&ctx(&id, None), Some(&stale), Some("new"), true).proceed);
        assert!(ConflictGuard::check(&ctx(&id, None), None, Some("new"), false).proceed);
    }

    #[test]
    fn deleted_file_with_expectation_is_a_conflict() {
        let id = RemoteId::from("r");
        let hash = content_hash("a");
        let err = ConflictGuard::enforce(&ctx(&id, None), Some(&hash), None, false).unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::Conflict);
        assert!(err.to_string().contains("absent"));
        assert!(err.next_action().contains("Code.js"));
    }
}
