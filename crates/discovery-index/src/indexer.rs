//! Main indexer orchestrator.
//!
//! The Indexer coordinates the file scanner, chunker, embedding provider,
//! vector store and lexical index to (re)build the search indexes.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chunker::{ChunkInventory, ChunkKind, Chunker, ChunkerConfig, ChunkerError, ChunkOutcome};
use crate::embeddings::EmbeddingProvider;
use crate::hasher::hash_file;
use crate::lexical::{LexicalError, LexicalIndex, SnippetConfig};
use crate::manifest::{read_manifest, write_manifest, Manifest};
use crate::scanner::{FileScanner, ScanError, ScannedFile};
use crate::staleness::{detect, ChangeKind, StaleReason};
use crate::vector_store::{IndexPoint, VectorStore, VectorStoreError};

/// Default number of points buffered before an upsert.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Whether to rebuild from scratch or update in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    /// Clear the vector collection and lexical index first
    Fresh,
    /// Keep existing data and reindex only files whose digest changed since
    /// the last run, removing data of deleted files
    Incremental,
}

/// Configuration for the indexer.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Points buffered before each upsert
    pub batch_size: usize,
    /// SQLite database of the lexical index
    pub lexical_path: PathBuf,
    /// Where to write the chunk inventory, if anywhere
    pub inventory_dir: Option<PathBuf>,
    /// Digests of the indexed files, read by incremental runs and rewritten
    /// after every run. Without it incremental runs reindex every file.
    pub manifest_path: Option<PathBuf>,
    pub chunker: ChunkerConfig,
    pub snippet: SnippetConfig,
}

impl IndexerConfig {
    pub fn new(lexical_path: impl Into<PathBuf>) -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            lexical_path: lexical_path.into(),
            inventory_dir: None,
            manifest_path: None,
            chunker: ChunkerConfig::default(),
            snippet: SnippetConfig::default(),
        }
    }
}

/// Statistics about an indexing run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub files_scanned: usize,
    /// Files read and indexed without error
    pub files_processed: usize,
    pub files_failed: usize,
    /// Files skipped by an incremental run because their digest is unchanged
    pub files_unchanged: usize,
    /// Files removed from the indexes because they no longer exist
    pub files_deleted: usize,
    /// Chunks that passed the minimum-content filter
    pub chunks_generated: usize,
    /// Chunks dropped by the minimum-content filter
    pub chunks_skipped: usize,
    pub embeddings_created: usize,
    pub points_upserted: usize,
    /// Failed reads, extractions, embeddings and upserts
    pub errors: usize,
    pub duration_ms: u64,
}

/// Errors that abort an indexing run.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("{service} is unavailable: {hint}")]
    ServiceUnavailable { service: String, hint: String },

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Lexical(#[from] LexicalError),

    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),

    #[error(transparent)]
    Chunker(#[from] ChunkerError),
}

/// Which files a run reindexes.
#[derive(Default)]
struct UpdatePlan {
    /// Files to reindex; `None` means every scanned file
    changed: Option<HashSet<String>>,
    /// Indexed files that no longer exist
    deleted: Vec<String>,
    /// Inventory of the previous run, merged into instead of rebuilt
    inventory: Option<ChunkInventory>,
}

impl UpdatePlan {
    fn includes(&self, file: &ScannedFile) -> bool {
        self.changed.as_ref().map_or(true, |c| c.contains(&file.relative))
    }
}

/// Main indexer that orchestrates codebase indexing.
pub struct Indexer {
    config: IndexerConfig,
    scanner: FileScanner,
    chunker: Chunker,
    embeddings: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl Indexer {
    /// Create an indexer with the tree-sitter chunker.
    pub fn new(
        config: IndexerConfig,
        scanner: FileScanner,
        embeddings: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self, IndexError> {
        let chunker = Chunker::new(config.chunker.clone())?;
        Ok(Self::with_chunker(config, scanner, chunker, embeddings, store))
    }

    pub fn with_chunker(
        config: IndexerConfig,
        scanner: FileScanner,
        chunker: Chunker,
        embeddings: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            config,
            scanner,
            chunker,
            embeddings,
            store,
        }
    }

    /// Run the pipeline. Only pre-flight and setup failures are returned as
    /// errors; per-file and per-chunk failures are counted in the stats.
    pub async fn run(&mut self, mode: IndexMode) -> Result<IndexStats, IndexError> {
        let start = Instant::now();
        info!("Starting {:?} index of {:?}", mode, self.scanner.root());

        self.verify_services().await?;

        let lexical = LexicalIndex::open(&self.config.lexical_path)?
            .with_snippet(self.config.snippet.clone());

        let files = self.scanner.scan()?;
        let digests: BTreeMap<String, String> = files
            .iter()
            .map(|f| (f.relative.clone(), hash_file(&f.absolute)))
            .collect();

        let mut plan = match mode {
            IndexMode::Fresh => {
                self.store.clear_collection().await?;
                lexical.clear()?;
                UpdatePlan::default()
            }
            IndexMode::Incremental => {
                self.store.ensure_collection().await?;
                self.plan_incremental(&digests, &lexical)?
            }
        };

        let mut stats = IndexStats {
            files_scanned: files.len(),
            files_deleted: plan.deleted.len(),
            ..Default::default()
        };
        let mut inventory = self
            .config
            .inventory_dir
            .as_ref()
            .map(|_| plan.inventory.take().unwrap_or_default());

        if let Some(changed) = &plan.changed {
            let mut stale: Vec<String> = changed.iter().chain(&plan.deleted).cloned().collect();
            stale.sort();
            self.store.delete_files(&stale).await?;
            for path in &plan.deleted {
                lexical.remove_file(path)?;
            }
            if let Some(inventory) = inventory.as_mut() {
                inventory.remove_files(&stale.into_iter().collect());
            }
        }

        let pending: Vec<&ScannedFile> = files.iter().filter(|f| plan.includes(f)).collect();
        stats.files_unchanged = files.len() - pending.len();
        info!(
            "Found {} files, {} to index, {} deleted",
            files.len(),
            pending.len(),
            stats.files_deleted
        );

        let batch_size = self.config.batch_size.max(1);
        let mut buffer: Vec<IndexPoint> = Vec::with_capacity(batch_size);
        let mut failed: HashSet<String> = HashSet::new();

        for (position, file) in pending.iter().enumerate() {
            let Some(outcome) = self.index_file(file, &lexical, &mut stats, &mut failed) else {
                continue;
            };
            stats.chunks_generated += outcome.chunks.len();
            stats.chunks_skipped += outcome.skipped;

            for chunk in &outcome.chunks {
                if let Some(inventory) = inventory.as_mut() {
                    inventory.add(chunk);
                }

                match self.embeddings.embed(&chunk.content).await {
                    Ok(vector) => {
                        stats.embeddings_created += 1;
                        buffer.push(IndexPoint::from_chunk(chunk, vector));
                    }
                    Err(e) => {
                        warn!("Failed to embed {}: {}", chunk.id, e);
                        stats.errors += 1;
                        failed.insert(chunk.file_path.clone());
                    }
                }

                if buffer.len() >= batch_size {
                    self.flush(&mut buffer, &mut stats, &mut failed).await;
                    info!(
                        "Progress: {}/{} files, {} points upserted, {} errors",
                        position + 1,
                        pending.len(),
                        stats.points_upserted,
                        stats.errors
                    );
                }
            }
        }

        self.flush(&mut buffer, &mut stats, &mut failed).await;

        if let (Some(inventory), Some(dir)) = (inventory, self.config.inventory_dir.as_ref()) {
            if let Err(e) = inventory.write(dir) {
                warn!("Failed to write chunk inventory: {}", e);
                stats.errors += 1;
            }
        }

        if let Some(path) = self.config.manifest_path.as_ref() {
            // Failed files are left out so the next incremental run retries them
            let indexed: BTreeMap<String, String> = digests
                .into_iter()
                .filter(|(file, _)| !failed.contains(file))
                .collect();
            if let Err(e) = write_manifest(path, &Manifest::new(indexed)) {
                warn!("Failed to write index manifest: {}", e);
                stats.errors += 1;
            }
        }

        stats.duration_ms = start.elapsed().as_millis() as u64;
        info!("Indexing complete: {:?}", stats);
        Ok(stats)
    }

    /// Diff the scan against the manifest of the last run.
    ///
    /// Falls back to reindexing every file when the manifest is missing or
    /// unusable, the lexical index is empty, or the inventory to merge into
    /// cannot be loaded intact.
    fn plan_incremental(
        &self,
        digests: &BTreeMap<String, String>,
        lexical: &LexicalIndex,
    ) -> Result<UpdatePlan, IndexError> {
        let Some(manifest_path) = self.config.manifest_path.as_ref() else {
            debug!("No index manifest configured; reindexing every file");
            return Ok(UpdatePlan::default());
        };

        let report = detect(read_manifest(manifest_path).as_ref(), digests);
        match &report.reason {
            None | Some(StaleReason::Changed(_)) => {}
            Some(reason) => {
                info!("Reindexing every file: {}", reason);
                return Ok(UpdatePlan::default());
            }
        }

        if lexical.file_count()? == 0 {
            info!("Lexical index is empty; reindexing every file");
            return Ok(UpdatePlan::default());
        }

        let inventory = match self.config.inventory_dir.as_ref() {
            Some(dir) => match ChunkInventory::load(dir) {
                Some(inventory) => Some(inventory),
                None => {
                    info!("Chunk inventory missing or damaged; reindexing every file");
                    return Ok(UpdatePlan::default());
                }
            },
            None => None,
        };

        let mut changed = HashSet::new();
        let mut deleted = Vec::new();
        for change in report.changes {
            match change.kind {
                ChangeKind::New | ChangeKind::Modified => {
                    changed.insert(change.file_path);
                }
                ChangeKind::Deleted => deleted.push(change.file_path),
            }
        }

        Ok(UpdatePlan {
            changed: Some(changed),
            deleted,
            inventory,
        })
    }

    /// Check both services before touching anything.
    pub async fn verify_services(&self) -> Result<(), IndexError> {
        let health = self.embeddings.health().await;
        if !health.is_healthy() {
            return Err(IndexError::ServiceUnavailable {
                service: format!("Embedding service ({})", self.embeddings.model_name()),
                hint: health.message,
            });
        }

        if let Err(e) = self.store.ping().await {
            return Err(IndexError::ServiceUnavailable {
                service: "Vector store".to_string(),
                hint: format!("{}. Is Qdrant running?", e),
            });
        }

        debug!("Pre-flight checks passed");
        Ok(())
    }

    /// Read, chunk and lexically index one file. `None` when the file could
    /// not be read or chunked; every failure is recorded in `failed`.
    fn index_file(
        &mut self,
        file: &ScannedFile,
        lexical: &LexicalIndex,
        stats: &mut IndexStats,
        failed: &mut HashSet<String>,
    ) -> Option<ChunkOutcome> {
        let source = match std::fs::read_to_string(&file.absolute) {
            Ok(source) => source,
            Err(e) => {
                warn!("Failed to read {}: {}", file.relative, e);
                stats.files_failed += 1;
                stats.errors += 1;
                failed.insert(file.relative.clone());
                return None;
            }
        };

        let outcome = match self.chunker.chunk(&file.relative, &source) {
            Ok(outcome) => Some(outcome),
            Err(ChunkerError::UnsupportedLanguage(_)) => {
                debug!("No symbol extractor for {}", file.relative);
                Some(ChunkOutcome::default())
            }
            Err(e) => {
                warn!("Failed to extract symbols from {}: {}", file.relative, e);
                stats.errors += 1;
                None
            }
        };

        let (symbols, kinds): (Vec<String>, Vec<ChunkKind>) = outcome
            .iter()
            .flat_map(|o| o.chunks.iter())
            .map(|c| (c.name.clone(), c.kind))
            .unzip();

        if let Err(e) = lexical.upsert_file(&file.relative, &source, &symbols, &kinds) {
            warn!("Failed to update lexical index for {}: {}", file.relative, e);
            stats.errors += 1;
            stats.files_failed += 1;
            failed.insert(file.relative.clone());
            return outcome;
        }

        if outcome.is_some() {
            stats.files_processed += 1;
        } else {
            stats.files_failed += 1;
            failed.insert(file.relative.clone());
        }
        outcome
    }

    async fn flush(
        &self,
        buffer: &mut Vec<IndexPoint>,
        stats: &mut IndexStats,
        failed: &mut HashSet<String>,
    ) {
        if buffer.is_empty() {
            return;
        }
        let points = std::mem::take(buffer);
        let count = points.len();
        let files: Vec<String> = points.iter().map(|p| p.payload.file_path.clone()).collect();

        match self.store.upsert_points(points).await {
            Ok(()) => {
                stats.points_upserted += count;
                debug!("Upserted batch of {} points", count);
            }
            Err(e) => {
                warn!("Failed to upsert batch of {} points: {}", count, e);
                stats.errors += 1;
                failed.extend(files);
            }
        }
    }
}
