//! Embedding provider trait and implementations.
//!
//! The backing service has no batch endpoint: one request produces one
//! vector. [`EmbeddingProvider::embed_sequential`] makes that explicit.

pub mod ollama;

pub use ollama::{OllamaConfig, OllamaEmbeddings};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during embedding generation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("Cannot reach embedding service at {url}: {message}. Start it with `ollama serve`")]
    Connection { url: String, message: String },

    #[error("Embedding model '{model}' is not available. Fetch it with `ollama pull {model}`")]
    ModelNotFound { model: String },

    #[error("Malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding service returned HTTP {status}: {snippet}")]
    Http { status: u16, snippet: String },

    #[error("Invalid embedding service URL: {0}")]
    InvalidEndpoint(String),
}

impl EmbeddingError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

/// Diagnostic snapshot of the embedding service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingHealth {
    pub server_reachable: bool,
    pub model_available: bool,
    pub available_models: Vec<String>,
    pub message: String,
}

impl EmbeddingHealth {
    pub fn is_healthy(&self) -> bool {
        self.server_reachable && self.model_available
    }
}

/// Trait for embedding providers.
///
/// Implementations should be Send + Sync to allow use in async contexts.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text. Empty text is a valid request.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed several texts with one request each, strictly in order.
    ///
    /// Latency is O(n) in the number of texts. Requests are never issued
    /// concurrently since the backing service is not known to tolerate it.
    async fn embed_sequential(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Get the number of dimensions
    fn dimensions(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Check the service without generating an embedding.
    async fn health(&self) -> EmbeddingHealth;
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Validate a raw `{ "embedding": [...] }` body against the expected dimension.
pub fn parse_embedding_response(body: &[u8], expected: usize) -> Result<Vec<f32>, EmbeddingError> {
    let response: EmbeddingResponse = serde_json::from_slice(body).map_err(|e| {
        EmbeddingError::MalformedResponse(format!("{} (body: {})", e, snippet(body)))
    })?;

    if response.embedding.len() != expected {
        return Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: response.embedding.len(),
        });
    }

    Ok(response.embedding)
}

/// First characters of a response body for error messages.
pub(crate) fn snippet(body: &[u8]) -> String {
    const MAX: usize = 200;
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX {
        trimmed.to_string()
    } else {
        let mut cut: String = trimmed.chars().take(MAX).collect();
        cut.push_str("...");
        cut
    }
}
