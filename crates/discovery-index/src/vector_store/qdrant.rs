//! Qdrant-backed vector store.
//!
//! Qdrant only accepts integer or UUID point ids, so each chunk id is mapped
//! to a name-based UUID and the chunk id itself is kept in the payload.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::{Qdrant, QdrantError};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    check_dimension, CollectionInfo, IndexPoint, PointPayload, VectorHit, VectorStore,
    VectorStoreError,
};
use crate::chunker::{ChunkKind, Role};

/// Configuration for connecting to Qdrant.
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    /// Qdrant server URL (gRPC port)
    pub url: String,

    /// API key (optional)
    pub api_key: Option<String>,

    /// Collection name
    pub collection_name: String,

    /// Vector dimensions
    pub dimensions: usize,

    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            api_key: None,
            collection_name: crate::DEFAULT_COLLECTION.to_string(),
            dimensions: crate::DEFAULT_DIMENSIONS,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Vector store backed by a Qdrant collection with cosine distance.
pub struct QdrantStore {
    client: Qdrant,
    url: String,
    collection_name: String,
    dimensions: usize,
}

impl QdrantStore {
    /// Create a client from configuration. No request is made until first use.
    pub fn from_config(config: &QdrantConfig) -> Result<Self, VectorStoreError> {
        let mut builder = Qdrant::from_url(&config.url)
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .skip_compatibility_check();

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| VectorStoreError::Unavailable(format!("{}: {}", config.url, e)))?;

        info!("Configured Qdrant store at {}", config.url);

        Ok(Self {
            client,
            url: config.url.clone(),
            collection_name: config.collection_name.clone(),
            dimensions: config.dimensions,
        })
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    async fn exists(&self) -> Result<bool, VectorStoreError> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(|e| self.unavailable(e))?;
        Ok(collections
            .collections
            .iter()
            .any(|c| c.name == self.collection_name))
    }

    async fn create(&self) -> Result<(), VectorStoreError> {
        info!(
            "Creating collection: {} with {} dimensions",
            self.collection_name, self.dimensions
        );

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection_name).vectors_config(
                    VectorParamsBuilder::new(self.dimensions as u64, Distance::Cosine),
                ),
            )
            .await
            .map_err(backend)?;
        Ok(())
    }

    fn unavailable(&self, e: QdrantError) -> VectorStoreError {
        VectorStoreError::Unavailable(format!("{}: {}", self.url, e))
    }
}

fn backend(e: QdrantError) -> VectorStoreError {
    VectorStoreError::Backend(e.to_string())
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ping(&self) -> Result<(), VectorStoreError> {
        self.client
            .health_check()
            .await
            .map_err(|e| self.unavailable(e))?;
        Ok(())
    }

    async fn ensure_collection(&self) -> Result<(), VectorStoreError> {
        if self.exists().await? {
            debug!("Collection {} already exists", self.collection_name);
            return Ok(());
        }
        self.create().await
    }

    async fn clear_collection(&self) -> Result<(), VectorStoreError> {
        if self.exists().await? {
            info!("Deleting collection: {}", self.collection_name);
            self.client
                .delete_collection(&self.collection_name)
                .await
                .map_err(backend)?;
        }
        self.create().await
    }

    async fn upsert_points(&self, points: Vec<IndexPoint>) -> Result<(), VectorStoreError> {
        if points.is_empty() {
            debug!("No points to upsert");
            return Ok(());
        }
        for point in &points {
            check_dimension(self.dimensions, &point.vector)?;
        }

        debug!("Upserting {} points", points.len());

        let qdrant_points: Vec<PointStruct> = points
            .into_iter()
            .map(|p| {
                let payload = payload_to_qdrant_map(&p.payload);
                PointStruct::new(point_uuid(&p.id), p.vector, payload)
            })
            .collect();

        self.client
            .upsert_points(
                UpsertPointsBuilder::new(&self.collection_name, qdrant_points).wait(true),
            )
            .await
            .map_err(backend)?;

        Ok(())
    }

    async fn delete_files(&self, file_paths: &[String]) -> Result<(), VectorStoreError> {
        if file_paths.is_empty() {
            debug!("No files to delete");
            return Ok(());
        }

        debug!("Deleting points of {} files", file_paths.len());

        let filter = Filter::must([Condition::matches("file_path", file_paths.to_vec())]);
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection_name)
                    .points(filter)
                    .wait(true),
            )
            .await
            .map_err(backend)?;

        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        kind: Option<ChunkKind>,
    ) -> Result<Vec<VectorHit>, VectorStoreError> {
        check_dimension(self.dimensions, vector)?;
        debug!("Searching for {} similar vectors", limit);

        let mut search_builder =
            SearchPointsBuilder::new(&self.collection_name, vector.to_vec(), limit as u64)
                .with_payload(true);

        if let Some(kind) = kind {
            search_builder = search_builder.filter(Filter::must([Condition::matches(
                "kind",
                kind.as_str().to_string(),
            )]));
        }

        let results = self
            .client
            .search_points(search_builder)
            .await
            .map_err(backend)?;

        let hits: Vec<VectorHit> = results
            .result
            .into_iter()
            .map(|p| {
                let payload = qdrant_map_to_payload(&p.payload);
                VectorHit {
                    id: payload.chunk_id.clone(),
                    score: p.score,
                    payload,
                }
            })
            .collect();

        debug!("Found {} search hits", hits.len());
        Ok(hits)
    }

    async fn collection_info(&self) -> Result<CollectionInfo, VectorStoreError> {
        let response = self
            .client
            .collection_info(&self.collection_name)
            .await
            .map_err(backend)?;

        let info = response
            .result
            .ok_or_else(|| VectorStoreError::MissingCollection(self.collection_name.clone()))?;

        let params = info
            .config
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config);

        let (dimensions, distance) = match params {
            Some(VectorsConfigKind::Params(p)) => (
                p.size as usize,
                Distance::try_from(p.distance)
                    .map(|d| d.as_str_name().to_lowercase())
                    .unwrap_or_else(|_| "unknown".to_string()),
            ),
            _ => (self.dimensions, "unknown".to_string()),
        };

        Ok(CollectionInfo {
            point_count: info.points_count.unwrap_or(0),
            dimensions,
            distance,
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Deterministic point UUID for a chunk id.
pub fn point_uuid(chunk_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, chunk_id.as_bytes()).to_string()
}

/// Convert PointPayload to Qdrant's HashMap<String, Value>.
fn payload_to_qdrant_map(payload: &PointPayload) -> HashMap<String, Value> {
    let mut map = HashMap::new();

    map.insert("chunk_id".to_string(), Value::from(payload.chunk_id.clone()));
    map.insert("file_path".to_string(), Value::from(payload.file_path.clone()));
    map.insert("kind".to_string(), Value::from(payload.kind.as_str().to_string()));
    map.insert("name".to_string(), Value::from(payload.name.clone()));
    map.insert("start_line".to_string(), Value::from(payload.start_line as i64));
    map.insert("end_line".to_string(), Value::from(payload.end_line as i64));
    map.insert("content".to_string(), Value::from(payload.content.clone()));

    if let Some(role) = payload.role {
        map.insert("role".to_string(), Value::from(role.as_str().to_string()));
    }

    map
}

/// Convert Qdrant's HashMap<String, Value> back to PointPayload.
fn qdrant_map_to_payload(map: &HashMap<String, Value>) -> PointPayload {
    let role = match extract_string(map.get("role")).as_str() {
        "stateful" => Some(Role::Stateful),
        "presentational" => Some(Role::Presentational),
        _ => None,
    };

    PointPayload {
        chunk_id: extract_string(map.get("chunk_id")),
        file_path: extract_string(map.get("file_path")),
        kind: extract_string(map.get("kind"))
            .parse()
            .unwrap_or(ChunkKind::Unknown),
        name: extract_string(map.get("name")),
        start_line: extract_integer(map.get("start_line")) as usize,
        end_line: extract_integer(map.get("end_line")) as usize,
        content: extract_string(map.get("content")),
        role,
    }
}

fn extract_string(value: Option<&Value>) -> String {
    value
        .and_then(|v| match &v.kind {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

fn extract_integer(value: Option<&Value>) -> i64 {
    value
        .and_then(|v| match &v.kind {
            Some(Kind::IntegerValue(i)) => Some(*i),
            _ => None,
        })
        .unwrap_or(0)
}
