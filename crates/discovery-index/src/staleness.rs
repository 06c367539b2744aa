//! Staleness detection: diff the working tree's digests against the manifest.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use tracing::debug;

use crate::manifest::{read_manifest, Manifest};
use crate::scanner::{FileScanner, ScanError};

/// How a file differs from the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    New,
    Modified,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }
}

/// One file that differs from the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub kind: ChangeKind,
    pub file_path: String,
}

/// Why the manifest does not reflect the working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    NoManifest,
    UnsupportedVersion(String),
    EmptyManifest,
    Changed(usize),
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoManifest => write!(f, "no manifest"),
            Self::UnsupportedVersion(v) if v.is_empty() => {
                write!(f, "unsupported manifest version (missing)")
            }
            Self::UnsupportedVersion(v) => write!(f, "unsupported manifest version {}", v),
            Self::EmptyManifest => write!(f, "empty manifest"),
            Self::Changed(1) => write!(f, "1 file changed"),
            Self::Changed(n) => write!(f, "{} files changed", n),
        }
    }
}

/// Result of a staleness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalenessReport {
    /// `None` when the manifest is fresh
    pub reason: Option<StaleReason>,
    /// Every change found, new and modified in scan order, then deleted
    pub changes: Vec<ChangeRecord>,
    /// Number of files in the current scan
    pub files_checked: usize,
}

impl StalenessReport {
    pub fn is_stale(&self) -> bool {
        self.reason.is_some()
    }

    /// CI signal: 0 when fresh, 1 when stale.
    pub fn exit_code(&self) -> i32 {
        if self.is_stale() {
            1
        } else {
            0
        }
    }

    pub fn count(&self, kind: ChangeKind) -> usize {
        self.changes.iter().filter(|c| c.kind == kind).count()
    }
}

/// Compare current digests with a stored manifest.
pub fn detect(manifest: Option<&Manifest>, current: &BTreeMap<String, String>) -> StalenessReport {
    let stale = |reason| StalenessReport {
        reason: Some(reason),
        changes: Vec::new(),
        files_checked: current.len(),
    };

    let Some(manifest) = manifest else {
        return stale(StaleReason::NoManifest);
    };
    if !manifest.is_supported_version() {
        return stale(StaleReason::UnsupportedVersion(manifest.version.clone()));
    }
    if manifest.is_empty() {
        return stale(StaleReason::EmptyManifest);
    }

    let stored = &manifest.source_hashes;
    let mut changes = Vec::new();

    for (path, hash) in current {
        match stored.get(path) {
            None => changes.push(ChangeRecord {
                kind: ChangeKind::New,
                file_path: path.clone(),
            }),
            Some(old) if old != hash => changes.push(ChangeRecord {
                kind: ChangeKind::Modified,
                file_path: path.clone(),
            }),
            Some(_) => {}
        }
    }

    for path in stored.keys() {
        if !current.contains_key(path) {
            changes.push(ChangeRecord {
                kind: ChangeKind::Deleted,
                file_path: path.clone(),
            });
        }
    }

    let reason = if changes.is_empty() {
        None
    } else {
        Some(StaleReason::Changed(changes.len()))
    };

    StalenessReport {
        reason,
        changes,
        files_checked: current.len(),
    }
}

/// Scans the tree and checks it against the manifest on disk.
pub struct StalenessDetector {
    scanner: FileScanner,
    manifest_path: PathBuf,
}

impl StalenessDetector {
    pub fn new(scanner: FileScanner, manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            scanner,
            manifest_path: manifest_path.into(),
        }
    }

    pub fn check(&self) -> Result<StalenessReport, ScanError> {
        let manifest = read_manifest(&self.manifest_path);
        let current = self.scanner.hash_all()?;
        let report = detect(manifest.as_ref(), &current);

        debug!(
            "Staleness check of {} files: {:?}",
            report.files_checked, report.reason
        );
        Ok(report)
    }
}
