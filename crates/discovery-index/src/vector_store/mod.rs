//! Vector index storage.
//!
//! [`VectorStore`] is the contract the indexer and searcher program against.
//! [`QdrantStore`] talks to a Qdrant server; [`MemoryVectorStore`] keeps
//! points in process.

pub mod memory;
pub mod qdrant;

pub use memory::MemoryVectorStore;
pub use qdrant::{QdrantConfig, QdrantStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chunker::{Chunk, ChunkKind, Role};

/// Errors returned by vector stores.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VectorStoreError {
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Vector store unavailable: {0}")]
    Unavailable(String),

    #[error("Collection '{0}' does not exist; run the indexer first")]
    MissingCollection(String),

    #[error("Vector store error: {0}")]
    Backend(String),
}

/// Metadata stored with each vector point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointPayload {
    /// Chunk id the point was derived from
    pub chunk_id: String,
    pub file_path: String,
    pub kind: ChunkKind,
    pub name: String,
    /// Starting line number (1-indexed)
    pub start_line: usize,
    /// Ending line number (1-indexed)
    pub end_line: usize,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl From<&Chunk> for PointPayload {
    fn from(chunk: &Chunk) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            file_path: chunk.file_path.clone(),
            kind: chunk.kind,
            name: chunk.name.clone(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            content: chunk.content.clone(),
            role: chunk.role,
        }
    }
}

/// A point to upsert, keyed by chunk id.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

impl IndexPoint {
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.id.clone(),
            vector,
            payload: PointPayload::from(chunk),
        }
    }
}

/// A nearest-neighbour match.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    /// Chunk id
    pub id: String,
    /// Similarity score (higher is better for cosine)
    pub score: f32,
    pub payload: PointPayload,
}

/// Diagnostics about a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionInfo {
    pub point_count: u64,
    pub dimensions: usize,
    pub distance: String,
}

/// Storage and similarity search over chunk vectors.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Cheap reachability check.
    async fn ping(&self) -> Result<(), VectorStoreError>;

    /// Create the collection unless it already exists.
    async fn ensure_collection(&self) -> Result<(), VectorStoreError>;

    /// Drop and recreate the collection.
    async fn clear_collection(&self) -> Result<(), VectorStoreError>;

    /// Insert or replace points by id.
    async fn upsert_points(&self, points: Vec<IndexPoint>) -> Result<(), VectorStoreError>;

    /// Remove every point whose payload `file_path` is one of `file_paths`.
    async fn delete_files(&self, file_paths: &[String]) -> Result<(), VectorStoreError>;

    /// Nearest points to `vector`, optionally restricted to one kind.
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        kind: Option<ChunkKind>,
    ) -> Result<Vec<VectorHit>, VectorStoreError>;

    async fn collection_info(&self) -> Result<CollectionInfo, VectorStoreError>;

    /// Configured vector dimension
    fn dimensions(&self) -> usize;
}

/// Reject vectors whose length differs from the collection dimension.
pub fn check_dimension(expected: usize, vector: &[f32]) -> Result<(), VectorStoreError> {
    if vector.len() == expected {
        Ok(())
    } else {
        Err(VectorStoreError::DimensionMismatch {
            expected,
            actual: vector.len(),
        })
    }
}
