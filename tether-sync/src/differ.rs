//! Pure diff between a source and destination snapshot, plus drift
//! verification against fresh snapshots at execute time.
//!
//! Deletion rules:
//! - a bootstrap diff never proposes deletions;
//! - a destination-only file is deleted only when the manifest tracks it
//!   (it was synced before and has since been removed from the source).
//!
//! Every other destination-only file is reported in `skipped_untracked`.

use std::fmt;

use serde::Serialize;
use similar::{ChangeTag, TextDiff};

use tether_core::hashing::short;
use tether_core::{FileType, Manifest};

use crate::fileset::FileSet;

/// A single file operation, applied to the destination side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOp {
    Add {
        filename: String,
        source_hash: String,
        content: String,
        file_type: FileType,
    },
    Update {
        filename: String,
        source_hash: String,
        dest_hash: String,
        content: String,
        file_type: FileType,
    },
    Delete {
        filename: String,
        dest_hash: String,
    },
}

/// Kind of a [`FileOp`], for grouping and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Add,
    Update,
    Delete,
}

impl FileOp {
    pub fn filename(&self) -> &str {
        match self {
            FileOp::Add { filename, .. }
            | FileOp::Update { filename, .. }
            | FileOp::Delete { filename, .. } => filename,
        }
    }

    pub fn kind(&self) -> OpKind {
        match self {
            FileOp::Add { .. } => OpKind::Add,
            FileOp::Update { .. } => OpKind::Update,
            FileOp::Delete { .. } => OpKind::Delete,
        }
    }

    /// New content for adds and updates.
    pub fn content(&self) -> Option<&str> {
        match self {
            FileOp::Add { content, .. } | FileOp::Update { content, .. } => Some(content),
            FileOp::Delete { .. } => None,
        }
    }
}

/// Inputs that shape deletion decisions.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffOptions<'a> {
    pub is_bootstrap: bool,
    pub manifest: Option<&'a Manifest>,
}

/// Result of [`compute_diff`]. Operations are ordered adds, updates, deletes,
/// each group by filename.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    pub operations: Vec<FileOp>,
    /// Destination-only files left alone because the manifest never tracked them.
    pub skipped_untracked: Vec<String>,
    /// Files present on both sides with equal hashes.
    pub unchanged: usize,
}

impl DiffResult {
    pub fn of_kind(&self, kind: OpKind) -> impl Iterator<Item = &FileOp> {
        self.operations.iter().filter(move |op| op.kind() == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Compute the operations that make `dest` equal `source`.
pub fn compute_diff(source: &FileSet, dest: &FileSet, opts: DiffOptions<'_>) -> DiffResult {
    let mut adds = Vec::new();
    let mut updates = Vec::new();
    let mut unchanged = 0;

    for file in source.iter() {
        match dest.get(&file.filename) {
            None => adds.push(FileOp::Add {
                filename: file.filename.clone(),
                source_hash: file.hash.clone(),
                content: file.content.clone(),
                file_type: file.file_type,
            }),
            Some(existing) if existing.hash != file.hash => updates.push(FileOp::Update {
                filename: file.filename.clone(),
                source_hash: file.hash.clone(),
                dest_hash: existing.hash.clone(),
                content: file.content.clone(),
                file_type: file.file_type,
            }),
            Some(_) => unchanged += 1,
        }
    }

    let mut deletes = Vec::new();
    let mut skipped_untracked = Vec::new();
    for file in dest.iter().filter(|f| !source.contains(&f.filename)) {
        let tracked = !opts.is_bootstrap
            && opts
                .manifest
                .map(|m| m.tracks(&file.filename))
                .unwrap_or(false);
        if tracked {
            deletes.push(FileOp::Delete {
                filename: file.filename.clone(),
                dest_hash: file.hash.clone(),
            });
        } else {
            tracing::warn!(filename = %file.filename, "destination-only file is not tracked; leaving it alone");
            skipped_untracked.push(file.filename.clone());
        }
    }

    let mut operations = adds;
    operations.append(&mut updates);
    operations.append(&mut deletes);
    DiffResult {
        operations,
        skipped_untracked,
        unchanged,
    }
}

// ---------------------------------------------------------------------------
// Drift verification
// ---------------------------------------------------------------------------

/// What changed between planning and execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DriftKind {
    SourceChanged,
    SourceMissing,
    DestChanged,
    DestMissing,
    /// A file the plan would add now exists at the destination.
    DestAppeared,
}

impl fmt::Display for DriftKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DriftKind::SourceChanged => "source changed",
            DriftKind::SourceMissing => "source file disappeared",
            DriftKind::DestChanged => "destination changed",
            DriftKind::DestMissing => "destination file disappeared",
            DriftKind::DestAppeared => "destination file appeared",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftDetail {
    pub filename: String,
    pub kind: DriftKind,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

impl fmt::Display for DriftDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |h: &Option<String>| h.as_deref().map(short).unwrap_or("absent").to_string();
        write!(
            f,
            "{}: {} (expected {}, found {})",
            self.filename,
            self.kind,
            show(&self.expected),
            show(&self.actual)
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftReport {
    pub details: Vec<DriftDetail>,
}

impl DriftReport {
    pub fn has_drift(&self) -> bool {
        !self.details.is_empty()
    }
}

/// Compare every hash a plan depends on with freshly fetched snapshots.
pub fn verify_drift(operations: &[FileOp], source: &FileSet, dest: &FileSet) -> DriftReport {
    let mut details = Vec::new();
    for op in operations {
        match op {
            FileOp::Add {
                filename,
                source_hash,
                ..
            } => {
                details.extend(compare(filename, Side::Source, source_hash, source.hash_of(filename)));
                if let Some(actual) = dest.hash_of(filename) {
                    details.push(DriftDetail {
                        filename: filename.clone(),
                        kind: DriftKind::DestAppeared,
                        expected: None,
                        actual: Some(actual.to_string()),
                    });
                }
            }
            FileOp::Update {
                filename,
                source_hash,
                dest_hash,
                ..
            } => {
                details.extend(compare(filename, Side::Source, source_hash, source.hash_of(filename)));
                details.extend(compare(filename, Side::Dest, dest_hash, dest.hash_of(filename)));
            }
            FileOp::Delete {
                filename,
                dest_hash,
            } => {
                details.extend(compare(filename, Side::Dest, dest_hash, dest.hash_of(filename)));
            }
        }
    }
    DriftReport { details }
}

#[derive(Clone, Copy)]
enum Side {
    Source,
    Dest,
}

fn compare(filename: &str, side: Side, expected: &str, actual: Option<&str>) -> Option<DriftDetail> {
    let kind = match (side, actual) {
        (_, Some(actual)) if actual == expected => return None,
        (Side::Source, Some(_)) => DriftKind::SourceChanged,
        (Side::Source, None) => DriftKind::SourceMissing,
        (Side::Dest, Some(_)) => DriftKind::DestChanged,
        (Side::Dest, None) => DriftKind::DestMissing,
    };
    Some(DriftDetail {
        filename: filename.to_string(),
        kind,
        expected: Some(expected.to_string()),
        actual: actual.map(str::to_string),
    })
}

// ---------------------------------------------------------------------------
// Text diffs
// ---------------------------------------------------------------------------

/// Unified diff of two versions of `filename`.
pub fn unified_diff(old: &str, new: &str, filename: &str) -> String {
    let old_header = format!("a/{filename}");
    let new_header = format!("b/{filename}");
    TextDiff::from_lines(old, new)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string()
}

/// One-line `+N -M lines` summary of a change.
pub fn diff_summary(old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let (mut inserted, mut deleted) = (0usize, 0usize);
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => inserted += 1,
            ChangeTag::Delete => deleted += 1,
            ChangeTag::Equal => {}
        }
    }
    format!("+{inserted} -{deleted} lines")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Utc;
    use tether_core::{ManifestEntry, RemoteId, SyncDirection};

    use super::*;
    use crate::fileset::SyncFile;

    fn set(files: &[(&str, &str)]) -> FileSet {
        files
            .iter()
            .map(|(name, content)| SyncFile::new(*name, *content).unwrap())
            .collect()
    }

    fn manifest_tracking(names: &[&str]) -> Manifest {
        let mut manifest = Manifest::new(RemoteId::from("r1"), SyncDirection::Pull);
        for name in names {
            manifest.files.insert(
                name.to_string(),
                ManifestEntry {
                    hash: "0".repeat(40),
                    remote_modified_time: None,
                    synced_at: Utc::now(),
                },
            );
        }
        manifest
    }

    fn names(result: &DiffResult, kind: OpKind) -> Vec<&str> {
        result.of_kind(kind).map(FileOp::filename).collect()
    }

    #[test]
    fn source_only_file_is_added_and_changed_file_updated() {
        let source = set(&[("A.js", "a2"), ("B.js", "b"), ("C.js", "c")]);
        let dest = set(&[("A.js", "a1"), ("C.js", "c")]);
        let result = compute_diff(&source, &dest, DiffOptions::default());
        assert_eq!(names(&result, OpKind::Add), vec!["B.js"]);
        assert_eq!(names(&result, OpKind::Update), vec!["A.js"]);
        assert_eq!(result.unchanged, 1);
    }

    #[test]
    fn bootstrap_never_deletes() {
        let source = set(&[("A.js", "a")]);
        let dest = set(&[("A.js", "a"), ("Old.js", "o")]);
        let manifest = manifest_tracking(&["Old.js"]);
        let result = compute_diff(
            &source,
            &dest,
            DiffOptions {
                is_bootstrap: true,
                manifest: Some(&manifest),
            },
        );
        assert!(names(&result, OpKind::Delete).is_empty());
        assert!(result.is_empty());
        assert_eq!(result.skipped_untracked, vec!["Old.js".to_string()]);
    }

    #[test]
    fn untracked_destination_only_file_is_skipped() {
        let source = set(&[("A.js", "a")]);
        let dest = set(&[("A.js", "a"), ("Mine.js", "m"), ("Gone.js", "g")]);
        let manifest = manifest_tracking(&["A.js", "Gone.js"]);
        let result = compute_diff(
            &source,
            &dest,
            DiffOptions {
                is_bootstrap: false,
                manifest: Some(&manifest),
            },
        );
        assert_eq!(names(&result, OpKind::Delete), vec!["Gone.js"]);
        assert_eq!(result.skipped_untracked, vec!["Mine.js".to_string()]);
    }

    #[test]
    fn diff_is_complete_and_disjoint() {
        let source = set(&[("A.js", "1"), ("B.js", "2"), ("C.js", "3"), ("E.js", "5")]);
        let dest = set(&[("A.js", "1"), ("B.js", "x"), ("D.js", "4"), ("F.js", "6")]);
        let manifest = manifest_tracking(&["D.js"]);
        let result = compute_diff(
            &source,
            &dest,
            DiffOptions {
                is_bootstrap: false,
                manifest: Some(&manifest),
            },
        );

        let touched: Vec<&str> = result.operations.iter().map(FileOp::filename).collect();
        let unique: BTreeSet<&str> = touched.iter().copied().collect();
        assert_eq!(touched.len(), unique.len(), "a file appears in one bucket");

        for file in source.iter() {
            let covered = unique.contains(file.filename.as_str())
                || dest.hash_of(&file.filename) == Some(file.hash.as_str());
            assert!(covered, "{} neither applied nor unchanged", file.filename);
        }
        for file in dest.iter().filter(|f| !source.contains(&f.filename)) {
            let covered = unique.contains(file.filename.as_str())
                || result.skipped_untracked.contains(&file.filename);
            assert!(covered, "{} neither deleted nor skipped", file.filename);
        }
    }

    #[test]
    fn operations_are_grouped_adds_updates_deletes() {
        let source = set(&[("Z.js", "new"), ("M.js", "m2")]);
        let dest = set(&[("M.js", "m1"), ("A.js", "a")]);
        let manifest = manifest_tracking(&["A.js"]);
        let result = compute_diff(
            &source,
            &dest,
            DiffOptions {
                is_bootstrap: false,
                manifest: Some(&manifest),
            },
        );
        let kinds: Vec<OpKind> = result.operations.iter().map(FileOp::kind).collect();
        assert_eq!(kinds, vec![OpKind::Add, OpKind::Update, OpKind::Delete]);
    }

    #[test]
    fn unchanged_plan_has_no_drift() {
        let source = set(&[("A.js", "a2")]);
        let dest = set(&[("A.js", "a1")]);
        let result = compute_diff(&source, &dest, DiffOptions::default());
        let report = verify_drift(&result.operations, &source, &dest);
        assert!(!report.has_drift());
    }

    #[test]
    fn changed_source_is_drift() {
        let source = set(&[("A.js", "a2")]);
        let dest = set(&[("A.js", "a1")]);
        let result = compute_diff(&source, &dest, DiffOptions::default());

        let fresh_source = set(&[("A.js", "a3")]);
        let report = verify_drift(&result.operations, &fresh_source, &dest);
        assert!(report.has_drift());
        assert_eq!(report.details[0].kind, DriftKind::SourceChanged);
    }

    #[test]
    fn changed_destination_is_drift() {
        let source = set(&[("A.js", "a2")]);
        let dest = set(&[("A.js", "a1")]);
        let result = compute_diff(&source, &dest, DiffOptions::default());

        let fresh_dest = set(&[("A.js", "edited locally")]);
        let report = verify_drift(&result.operations, &source, &fresh_dest);
        assert_eq!(report.details.len(), 1);
        assert_eq!(report.details[0].kind, DriftKind::DestChanged);
    }

    #[test]
    fn missing_delete_target_is_drift() {
        let ops = vec![FileOp::Delete {
            filename: "Old.js".into(),
            dest_hash: tether_core::content_hash("o"),
        }];
        let report = verify_drift(&ops, &FileSet::new(), &FileSet::new());
        assert_eq!(report.details[0].kind, DriftKind::DestMissing);
        assert!(report.details[0].to_string().contains("Old.js"));
    }

    #[test]
    fn appearing_add_target_is_drift() {
        let source = set(&[("New.js", "n")]);
        let result = compute_diff(&source, &FileSet::new(), DiffOptions::default());
        let fresh_dest = set(&[("New.js", "someone else")]);
        let report = verify_drift(&result.operations, &source, &fresh_dest);
        assert_eq!(report.details[0].kind, DriftKind::DestAppeared);
    }

    #[test]
    fn summary_counts_lines() {
        assert_eq!(diff_summary("a\nb\n", "a\nc\nd\n"), "+2 -1 lines");
        assert_eq!(diff_summary("same\n", "same\n"), "+0 -0 lines");
    }

    #[test]
    fn unified_diff_has_headers() {
        let out = unified_diff("a\n", "b\n", "Code.js");
        assert!(out.contains("--- a/Code.js"));
        assert!(out.contains("+++ b/Code.js"));
        assert!(out.contains("@@"));
    }
}
