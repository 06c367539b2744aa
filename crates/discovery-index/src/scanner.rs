//! Source file enumeration.
//!
//! Walks the source root honouring `.gitignore`, then keeps files whose
//! root-relative path matches at least one include glob and no ignore glob.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use thiserror::Error;
use tracing::{debug, warn};

use crate::hasher::hash_file;

/// Errors that can occur while scanning the source tree.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Invalid glob pattern '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("Source root not found: {0}")]
    RootNotFound(PathBuf),
}

/// A file selected by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Path on disk
    pub absolute: PathBuf,
    /// Root-relative path with `/` separators
    pub relative: String,
}

/// Glob-driven file scanner over a source root.
#[derive(Debug, Clone)]
pub struct FileScanner {
    root: PathBuf,
    include: GlobSet,
    ignore: GlobSet,
}

impl FileScanner {
    /// Build a scanner from include and ignore glob patterns.
    ///
    /// Patterns are matched against root-relative paths; `*` does not cross
    /// directory separators, `**` does.
    pub fn new(
        root: impl Into<PathBuf>,
        include: &[String],
        ignore: &[String],
    ) -> Result<Self, ScanError> {
        Ok(Self {
            root: root.into(),
            include: build_globset(include)?,
            ignore: build_globset(ignore)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Enumerate matching files, sorted by relative path.
    pub fn scan(&self) -> Result<Vec<ScannedFile>, ScanError> {
        if !self.root.is_dir() {
            return Err(ScanError::RootNotFound(self.root.clone()));
        }

        let walker = WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }

            let Some(relative) = relative_posix(&self.root, path) else {
                continue;
            };

            if self.include.is_match(&relative) && !self.ignore.is_match(&relative) {
                files.push(ScannedFile {
                    absolute: path.to_path_buf(),
                    relative,
                });
            }
        }

        files.sort_by(|a, b| a.relative.cmp(&b.relative));
        debug!("Scanned {} files under {:?}", files.len(), self.root);
        Ok(files)
    }

    /// Scan and hash every matching file.
    pub fn hash_all(&self) -> Result<BTreeMap<String, String>, ScanError> {
        Ok(self
            .scan()?
            .into_iter()
            .map(|file| {
                let hash = hash_file(&file.absolute);
                (file.relative, hash)
            })
            .collect())
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, ScanError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|source| ScanError::InvalidGlob {
                pattern: pattern.clone(),
                source,
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| ScanError::InvalidGlob {
        pattern: patterns.join(", "),
        source,
    })
}

/// Root-relative path joined with `/`, regardless of platform.
fn relative_posix(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
