//! Code discovery and hybrid search.
//!
//! This crate provides:
//! - Content hashing, source manifests and staleness detection
//! - Symbol-level chunking of TypeScript/JavaScript using tree-sitter
//! - Embedding generation via a local Ollama server
//! - Vector storage in Qdrant (or in memory)
//! - A SQLite FTS5 lexical index
//! - Hybrid search (lexical + vector) merged with Reciprocal Rank Fusion
//! - A JSON search tool boundary

pub mod chunker;
pub mod embeddings;
pub mod hasher;
pub mod indexer;
pub mod lexical;
pub mod manifest;
pub mod scanner;
pub mod search;
pub mod staleness;
pub mod tool;
pub mod vector_store;

// Re-exports
pub use chunker::{Chunk, ChunkKind, Chunker, ChunkerConfig, Role};
pub use embeddings::{
    EmbeddingError, EmbeddingHealth, EmbeddingProvider, OllamaConfig, OllamaEmbeddings,
};
pub use hasher::{hash_content, hash_file, MISSING_HASH};
pub use indexer::{IndexError, IndexMode, Indexer, IndexerConfig, IndexStats};
pub use lexical::{LexicalError, LexicalHit, LexicalIndex, SnippetConfig};
pub use manifest::{generate_manifest, read_manifest, write_manifest, Manifest, ManifestError};
pub use scanner::{FileScanner, ScanError, ScannedFile};
pub use search::{
    reciprocal_rank_fusion, HybridSearcher, SearchConfig, SearchResponse, SearchResult, Source,
};
pub use staleness::{ChangeKind, ChangeRecord, StaleReason, StalenessDetector, StalenessReport};
pub use tool::{run_search_tool, SearchToolArgs, SearchToolInput, ToolOutput};
pub use vector_store::{MemoryVectorStore, QdrantConfig, QdrantStore, VectorStore, VectorStoreError};

/// Default Qdrant collection name
pub const DEFAULT_COLLECTION: &str = "code_chunks";

/// Default embedding dimensions (nomic-embed-text)
pub const DEFAULT_DIMENSIONS: usize = 768;
