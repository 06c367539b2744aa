//! Hybrid search combining the lexical index and vector similarity.
//!
//! Both rankings are merged with Reciprocal Rank Fusion keyed by file path.
//! The lexical side is required; the vector side is best effort and its
//! failure only downgrades the response to keyword matches plus a warning.

pub mod rrf;

pub use rrf::{fuse, reciprocal_rank_fusion, FusedHit, DEFAULT_RRF_K};

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::chunker::ChunkKind;
use crate::embeddings::EmbeddingProvider;
use crate::lexical::{LexicalError, LexicalHit, LexicalIndex, SnippetConfig};
use crate::vector_store::{VectorHit, VectorStore};

const LEXICAL_LIST: usize = 0;
const VECTOR_LIST: usize = 1;

/// Lines of chunk content used as a preview when no snippet exists.
const PREVIEW_LINES: usize = 3;

/// Configuration for hybrid search.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// RRF k parameter (default 60)
    pub rrf_k: f64,
    /// Result count when the caller passes 0
    pub default_limit: usize,
    /// Candidates fetched from each source per requested result
    pub candidate_multiplier: usize,
    pub snippet: SnippetConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            rrf_k: DEFAULT_RRF_K,
            default_limit: 20,
            candidate_multiplier: 3,
            snippet: SnippetConfig::default(),
        }
    }
}

/// Which ranking contributed a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Lexical,
    Vector,
}

/// A fused search result for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub file: String,
    /// `[start, end]`, 1-indexed and inclusive
    pub line_range: [usize; 2],
    pub preview: String,
    /// RRF score (higher is better)
    pub score: f64,
    pub sources: Vec<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ChunkKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Outcome of a search. Serializes to `{results, totalCount, warning?}` or
/// `{error, suggestion}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SearchResponse {
    Success {
        results: Vec<SearchResult>,
        #[serde(rename = "totalCount")]
        total_count: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        warning: Option<String>,
    },
    Failure {
        error: String,
        suggestion: String,
    },
}

impl SearchResponse {
    pub fn results(&self) -> &[SearchResult] {
        match self {
            Self::Success { results, .. } => results,
            Self::Failure { .. } => &[],
        }
    }

    pub fn warning(&self) -> Option<&str> {
        match self {
            Self::Success { warning, .. } => warning.as_deref(),
            Self::Failure { .. } => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

enum LexicalSource {
    Index(LexicalIndex),
    /// Opened per query so an index built later is picked up
    Path(PathBuf),
}

/// Hybrid searcher over the lexical index and a vector store.
pub struct HybridSearcher {
    config: SearchConfig,
    embeddings: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    lexical: LexicalSource,
}

impl HybridSearcher {
    /// Create a searcher over an already open lexical index.
    pub fn new(
        config: SearchConfig,
        embeddings: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        lexical: LexicalIndex,
    ) -> Self {
        let lexical = lexical.with_snippet(config.snippet.clone());
        Self {
            config,
            embeddings,
            store,
            lexical: LexicalSource::Index(lexical),
        }
    }

    /// Create a searcher that opens the lexical index at `path` on each query.
    pub fn with_lexical_path(
        config: SearchConfig,
        embeddings: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        path: impl AsRef<Path>,
    ) -> Self {
        Self {
            config,
            embeddings,
            store,
            lexical: LexicalSource::Path(path.as_ref().to_path_buf()),
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Search for `query`. Never fails: problems are reported in the response.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        kind: Option<ChunkKind>,
    ) -> SearchResponse {
        let limit = if limit == 0 { self.config.default_limit } else { limit };
        let fetch_limit = limit.saturating_mul(self.config.candidate_multiplier.max(1));
        debug!("Searching for {:?} (limit {}, kind {:?})", query, limit, kind);

        let lexical_hits = match self.lexical_search(query, fetch_limit, kind) {
            Ok(hits) => hits,
            Err(e) => return lexical_failure(e),
        };

        if query.trim().is_empty() {
            return SearchResponse::Success {
                results: Vec::new(),
                total_count: 0,
                warning: None,
            };
        }

        let (vector_hits, warning) = match self.vector_search(query, fetch_limit, kind).await {
            Ok(hits) => (dedupe_by_file(hits), None),
            Err(message) => {
                warn!("Vector search unavailable, using keyword results only: {}", message);
                (
                    Vec::new(),
                    Some(format!(
                        "Semantic search unavailable ({}); showing keyword matches only",
                        message
                    )),
                )
            }
        };

        let lists = vec![
            lexical_hits.iter().map(|h| h.file.clone()).collect::<Vec<_>>(),
            vector_hits.iter().map(|h| h.payload.file_path.clone()).collect::<Vec<_>>(),
        ];
        let mut fused = fuse(&lists, self.config.rrf_k);
        let total_count = fused.len();
        fused.truncate(limit);

        let lexical_by_file: HashMap<&str, &LexicalHit> =
            lexical_hits.iter().map(|h| (h.file.as_str(), h)).collect();
        let vector_by_file: HashMap<&str, &VectorHit> = vector_hits
            .iter()
            .map(|h| (h.payload.file_path.as_str(), h))
            .collect();

        let results = fused
            .iter()
            .map(|hit| {
                build_result(
                    hit,
                    lexical_by_file.get(hit.key.as_str()).copied(),
                    vector_by_file.get(hit.key.as_str()).copied(),
                )
            })
            .collect();

        SearchResponse::Success {
            results,
            total_count,
            warning,
        }
    }

    fn lexical_search(
        &self,
        query: &str,
        limit: usize,
        kind: Option<ChunkKind>,
    ) -> Result<Vec<LexicalHit>, LexicalError> {
        match &self.lexical {
            LexicalSource::Index(index) => index.search(query, limit, kind),
            LexicalSource::Path(path) => LexicalIndex::open_existing(path)?
                .with_snippet(self.config.snippet.clone())
                .search(query, limit, kind),
        }
    }

    async fn vector_search(
        &self,
        query: &str,
        limit: usize,
        kind: Option<ChunkKind>,
    ) -> Result<Vec<VectorHit>, String> {
        let vector = self.embeddings.embed(query).await.map_err(|e| e.to_string())?;
        self.store
            .search(&vector, limit, kind)
            .await
            .map_err(|e| e.to_string())
    }
}

fn lexical_failure(error: LexicalError) -> SearchResponse {
    warn!("Lexical search failed: {}", error);
    match error {
        LexicalError::NotBuilt(_) => SearchResponse::Failure {
            error: "Search index has not been built".to_string(),
            suggestion: "Run `discovery index` to build it".to_string(),
        },
        other => SearchResponse::Failure {
            error: format!("Search index unavailable: {}", other),
            suggestion: "Rebuild it with `discovery index`".to_string(),
        },
    }
}

/// Keep the best-ranked vector hit per file.
fn dedupe_by_file(hits: Vec<VectorHit>) -> Vec<VectorHit> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|h| seen.insert(h.payload.file_path.clone()))
        .collect()
}

fn build_result(
    hit: &FusedHit,
    lexical: Option<&LexicalHit>,
    vector: Option<&VectorHit>,
) -> SearchResult {
    let mut sources = Vec::with_capacity(2);
    if hit.in_list(LEXICAL_LIST) {
        sources.push(Source::Lexical);
    }
    if hit.in_list(VECTOR_LIST) {
        sources.push(Source::Vector);
    }

    let line_range = match (vector, lexical) {
        (Some(v), _) => [v.payload.start_line, v.payload.end_line],
        (None, Some(l)) => [l.line, l.line],
        (None, None) => [1, 1],
    };

    let preview = match (lexical, vector) {
        (Some(l), _) => l.snippet.clone(),
        (None, Some(v)) => preview_of(&v.payload.content),
        (None, None) => String::new(),
    };

    SearchResult {
        file: hit.key.clone(),
        line_range,
        preview,
        score: hit.score,
        sources,
        kind: vector.map(|v| v.payload.kind),
        name: vector
            .map(|v| v.payload.name.clone())
            .filter(|n| !n.is_empty()),
    }
}

fn preview_of(content: &str) -> String {
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(PREVIEW_LINES)
        .collect::<Vec<_>>()
        .join("\n")
}
