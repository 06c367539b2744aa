//! Source manifest: the persisted map of file path to content digest.
//!
//! The manifest is regenerated from scratch on every `generate` and is the
//! reference the staleness detector diffs the working tree against.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::scanner::{FileScanner, ScanError};

/// Manifest format version written by this crate.
pub const MANIFEST_VERSION: &str = "1.0.0";

/// File name of the manifest inside the state directory.
pub const MANIFEST_FILE: &str = "source-manifest.json";

/// Digests of the files the search indexes reflect; written only by the indexer.
pub const INDEXED_MANIFEST_FILE: &str = "indexed-manifest.json";

/// Persisted digest map for the scanned source tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Relative POSIX path to content digest
    pub source_hashes: BTreeMap<String, String>,

    /// When the manifest was generated
    pub generated_at: DateTime<Utc>,

    /// Format version; empty when the file predates versioning
    #[serde(default)]
    pub version: String,
}

impl Manifest {
    /// Create a manifest stamped with the current time.
    pub fn new(source_hashes: BTreeMap<String, String>) -> Self {
        Self {
            source_hashes,
            generated_at: Utc::now(),
            version: MANIFEST_VERSION.to_string(),
        }
    }

    /// Whether this crate understands the manifest's format version.
    pub fn is_supported_version(&self) -> bool {
        self.version == MANIFEST_VERSION
    }

    pub fn is_empty(&self) -> bool {
        self.source_hashes.is_empty()
    }
}

/// Errors that can occur when writing manifests.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize manifest: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Read a manifest, treating an absent or corrupt file as no manifest.
pub fn read_manifest(path: &Path) -> Option<Manifest> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            debug!("No manifest at {:?}: {}", path, e);
            return None;
        }
    };

    match serde_json::from_str(&content) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            warn!("Ignoring unreadable manifest {:?}: {}", path, e);
            None
        }
    }
}

/// Serialize and atomically replace the manifest at `path`.
pub fn write_manifest(path: &Path, manifest: &Manifest) -> Result<(), ManifestError> {
    let content = serde_json::to_vec_pretty(manifest).map_err(ManifestError::Serialize)?;
    write_atomic(path, &content)?;
    info!(
        "Wrote manifest with {} files to {:?}",
        manifest.source_hashes.len(),
        path
    );
    Ok(())
}

/// Scan and hash the source tree into a fresh manifest.
pub fn generate_manifest(scanner: &FileScanner) -> Result<Manifest, ScanError> {
    Ok(Manifest::new(scanner.hash_all()?))
}

/// Write `bytes` to `<path>.tmp` in the same directory, flush it to disk,
/// then rename it over `path`.
///
/// Readers of `path` see either the previous file or the new one in full.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ManifestError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let tmp = temp_path(path);
    {
        let mut file = File::create(&tmp).map_err(io_err(&tmp))?;
        file.write_all(bytes).map_err(io_err(&tmp))?;
        file.sync_all().map_err(io_err(&tmp))?;
    }

    fs::rename(&tmp, path).map_err(io_err(path))
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ManifestError {
    let path = path.to_path_buf();
    move |source| ManifestError::Io { path, source }
}

/// Sibling temp path used by [`write_atomic`].
pub fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
