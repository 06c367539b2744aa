//! Ollama embedding client.
//!
//! - `POST {base}/api/embeddings` with `{ model, prompt }`, answered by `{ embedding }`
//! - `GET {base}/api/tags` for the health check

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{parse_embedding_response, snippet, EmbeddingError, EmbeddingHealth, EmbeddingProvider};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

/// Connection settings for [`OllamaEmbeddings`].
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub dimensions: usize,
    /// Whole-request timeout; a hung call surfaces as a connection error
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: crate::DEFAULT_DIMENSIONS,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}

/// Embedding provider backed by a local Ollama server.
pub struct OllamaEmbeddings {
    client: Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl OllamaEmbeddings {
    pub fn new(config: OllamaConfig) -> Result<Self, EmbeddingError> {
        let base = config.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(EmbeddingError::InvalidEndpoint(config.base_url.clone()));
        }
        let base_url = base.trim_end_matches('/').to_string();

        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(5)))
            .build()
            .map_err(|e| EmbeddingError::Connection {
                url: base_url.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url,
            model: config.model,
            dimensions: config.dimensions,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request one embedding for `text` from `model`.
    pub async fn generate_embedding(
        &self,
        text: &str,
        model: &str,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/api/embeddings", self.base_url);
        debug!("Requesting embedding of {} chars from {}", text.len(), url);

        let response = self
            .client
            .post(&url)
            .json(&EmbeddingRequest { model, prompt: text })
            .send()
            .await
            .map_err(|e| self.connection_error(e))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                self.connection_error(e)
            } else {
                EmbeddingError::MalformedResponse(format!("failed to read body: {}", e))
            }
        })?;

        if status.is_success() {
            return parse_embedding_response(&body, self.dimensions);
        }

        let detail = snippet(&body);
        if status == StatusCode::NOT_FOUND || detail.to_lowercase().contains("not found") {
            return Err(EmbeddingError::ModelNotFound {
                model: model.to_string(),
            });
        }

        Err(EmbeddingError::Http {
            status: status.as_u16(),
            snippet: detail,
        })
    }

    /// Names of the models the server has pulled.
    pub async fn list_models(&self) -> Result<Vec<String>, EmbeddingError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.connection_error(e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.connection_error(e))?;

        if !status.is_success() {
            return Err(EmbeddingError::Http {
                status: status.as_u16(),
                snippet: snippet(&body),
            });
        }

        let tags: TagsResponse = serde_json::from_slice(&body)
            .map_err(|e| EmbeddingError::MalformedResponse(format!("tags: {}", e)))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Detailed health report. Never fails.
    pub async fn health_details(&self) -> EmbeddingHealth {
        match self.list_models().await {
            Ok(models) => {
                let model_available = models.iter().any(|m| model_matches(m, &self.model));
                let message = if model_available {
                    format!("Model '{}' is available at {}", self.model, self.base_url)
                } else {
                    format!(
                        "Model '{}' not found at {}. Fetch it with `ollama pull {}`",
                        self.model, self.base_url, self.model
                    )
                };
                EmbeddingHealth {
                    server_reachable: true,
                    model_available,
                    available_models: models,
                    message,
                }
            }
            Err(e) => {
                warn!("Embedding health check failed: {}", e);
                EmbeddingHealth {
                    server_reachable: !matches!(e, EmbeddingError::Connection { .. }),
                    model_available: false,
                    available_models: Vec::new(),
                    message: e.to_string(),
                }
            }
        }
    }

    fn connection_error(&self, e: reqwest::Error) -> EmbeddingError {
        let message = if e.is_timeout() {
            format!("request timed out ({})", e)
        } else {
            e.to_string()
        };
        EmbeddingError::Connection {
            url: self.base_url.clone(),
            message,
        }
    }
}

/// Whether a pulled model name satisfies the configured one.
///
/// `nomic-embed-text` matches `nomic-embed-text:latest` and any other tag of
/// the same model; an explicit tag must match exactly.
pub fn model_matches(available: &str, wanted: &str) -> bool {
    if available == wanted {
        return true;
    }
    if wanted.contains(':') {
        return false;
    }
    available.split(':').next() == Some(wanted)
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.generate_embedding(text, &self.model).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn health(&self) -> EmbeddingHealth {
        self.health_details().await
    }
}
