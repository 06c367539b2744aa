//! Per-bucket chunk inventory written next to the manifest.
//!
//! Each bucket becomes one JSON file under `buckets/` so no single artifact
//! grows with the whole codebase; `manifest.json` lists the buckets with
//! their checksums and the source files that produced them.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{bucket_for, Chunk, ChunkKind, Role};
use crate::hasher::hash_content;
use crate::manifest::{write_atomic, ManifestError, MANIFEST_VERSION};
use crate::staleness::ChangeRecord;

/// Listing file inside the inventory directory.
pub const INVENTORY_MANIFEST_FILE: &str = "manifest.json";

/// Subdirectory holding one file per bucket.
pub const BUCKETS_DIR: &str = "buckets";

/// Inventory entry for one chunk (content omitted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkSummary {
    pub id: String,
    pub file_path: String,
    pub kind: ChunkKind,
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl From<&Chunk> for ChunkSummary {
    fn from(chunk: &Chunk) -> Self {
        Self {
            id: chunk.id.clone(),
            file_path: chunk.file_path.clone(),
            kind: chunk.kind,
            name: chunk.name.clone(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            role: chunk.role,
        }
    }
}

/// Listing of the bucket files in an inventory directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryManifest {
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub total_items: usize,
    pub buckets: Vec<BucketEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketEntry {
    pub name: String,
    /// Path of the bucket file relative to the inventory directory
    pub file: String,
    pub item_count: usize,
    /// Digest of the bucket file's content
    pub checksum: String,
    /// Sorted relative paths of the files whose chunks are in the bucket
    #[serde(default)]
    pub source_files: Vec<String>,
}

impl InventoryManifest {
    /// Read `manifest.json` from `dir`; absent or corrupt listings are `None`.
    pub fn read(dir: &Path) -> Option<Self> {
        let path = dir.join(INVENTORY_MANIFEST_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No chunk inventory at {:?}: {}", path, e);
                return None;
            }
        };

        match serde_json::from_str::<Self>(&content) {
            Ok(manifest) if manifest.version == MANIFEST_VERSION => Some(manifest),
            Ok(manifest) => {
                warn!(
                    "Ignoring chunk inventory {:?} with unsupported version {:?}",
                    path, manifest.version
                );
                None
            }
            Err(e) => {
                warn!("Ignoring unreadable chunk inventory {:?}: {}", path, e);
                None
            }
        }
    }

    /// Names of buckets whose file is missing or no longer matches its checksum.
    pub fn verify(&self, dir: &Path) -> Vec<String> {
        self.buckets
            .iter()
            .filter(|entry| match fs::read_to_string(dir.join(&entry.file)) {
                Ok(body) => hash_content(&body) != entry.checksum,
                Err(_) => true,
            })
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Buckets that must be regenerated for `changes`.
    ///
    /// A changed file marks every bucket listing it; a file no bucket lists
    /// marks the bucket its path maps to.
    pub fn stale_buckets(&self, changes: &[ChangeRecord], features_root: &str) -> BTreeSet<String> {
        let mut stale = BTreeSet::new();
        for change in changes {
            let mut listed = false;
            for entry in &self.buckets {
                if entry.source_files.binary_search(&change.file_path).is_ok() {
                    stale.insert(entry.name.clone());
                    listed = true;
                }
            }
            if !listed {
                stale.insert(bucket_for(&change.file_path, features_root));
            }
        }
        stale
    }
}

/// Chunk summaries grouped by bucket.
#[derive(Debug, Clone, Default)]
pub struct ChunkInventory {
    buckets: BTreeMap<String, Vec<ChunkSummary>>,
}

impl ChunkInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a previously written inventory.
    ///
    /// `None` when there is no listing or any bucket file fails its checksum,
    /// since a partial inventory cannot be merged into.
    pub fn load(dir: &Path) -> Option<Self> {
        let manifest = InventoryManifest::read(dir)?;

        let corrupt = manifest.verify(dir);
        if !corrupt.is_empty() {
            warn!("Chunk inventory buckets fail their checksum: {}", corrupt.join(", "));
            return None;
        }

        let mut buckets = BTreeMap::new();
        for entry in manifest.buckets {
            let body = fs::read_to_string(dir.join(&entry.file)).ok()?;
            match serde_json::from_str::<Vec<ChunkSummary>>(&body) {
                Ok(items) => {
                    buckets.insert(entry.name, items);
                }
                Err(e) => {
                    warn!("Ignoring unreadable inventory bucket {}: {}", entry.name, e);
                    return None;
                }
            }
        }
        Some(Self { buckets })
    }

    pub fn add(&mut self, chunk: &Chunk) {
        self.buckets
            .entry(chunk.bucket.clone())
            .or_default()
            .push(ChunkSummary::from(chunk));
    }

    /// Drop every summary produced by one of `files`, and any bucket left empty.
    pub fn remove_files(&mut self, files: &HashSet<String>) {
        for items in self.buckets.values_mut() {
            items.retain(|item| !files.contains(&item.file_path));
        }
        self.buckets.retain(|_, items| !items.is_empty());
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn bucket_names(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    /// Write `buckets/<name>.json` per bucket plus `manifest.json` into `dir`,
    /// then remove bucket files left over from earlier runs.
    pub fn write(&self, dir: &Path) -> Result<InventoryManifest, ManifestError> {
        let mut entries = Vec::with_capacity(self.buckets.len());

        for (name, items) in &self.buckets {
            let file = format!("{}/{}.json", BUCKETS_DIR, name);
            let body = serde_json::to_string_pretty(items).map_err(ManifestError::Serialize)?;
            write_atomic(&dir.join(&file), body.as_bytes())?;

            let source_files: BTreeSet<&str> = items.iter().map(|i| i.file_path.as_str()).collect();
            entries.push(BucketEntry {
                name: name.clone(),
                file,
                item_count: items.len(),
                checksum: hash_content(&body),
                source_files: source_files.into_iter().map(str::to_string).collect(),
            });
        }

        let manifest = InventoryManifest {
            version: MANIFEST_VERSION.to_string(),
            generated_at: Utc::now(),
            total_items: self.len(),
            buckets: entries,
        };
        let body = serde_json::to_vec_pretty(&manifest).map_err(ManifestError::Serialize)?;
        write_atomic(&dir.join(INVENTORY_MANIFEST_FILE), &body)?;

        self.remove_stale_files(&dir.join(BUCKETS_DIR))?;

        info!(
            "Wrote chunk inventory: {} items in {} buckets to {:?}",
            manifest.total_items,
            manifest.buckets.len(),
            dir
        );
        Ok(manifest)
    }

    fn remove_stale_files(&self, buckets_dir: &Path) -> Result<(), ManifestError> {
        let entries = match fs::read_dir(buckets_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                return Err(ManifestError::Io {
                    path: buckets_dir.to_path_buf(),
                    source,
                })
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if self.buckets.contains_key(stem) {
                continue;
            }
            debug!("Removing stale inventory bucket {:?}", path);
            fs::remove_file(&path).map_err(|source| ManifestError::Io {
                path: path.clone(),
                source,
            })?;
        }
        Ok(())
    }
}
