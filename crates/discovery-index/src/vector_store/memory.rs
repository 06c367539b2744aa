//! In-process vector store using cosine similarity.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{check_dimension, CollectionInfo, IndexPoint, VectorHit, VectorStore, VectorStoreError};
use crate::chunker::ChunkKind;

/// Vector store held in memory. Points keep their first insertion position.
pub struct MemoryVectorStore {
    name: String,
    dimensions: usize,
    points: RwLock<Option<Vec<IndexPoint>>>,
    available: AtomicBool,
}

impl MemoryVectorStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            name: "memory".to_string(),
            dimensions,
            points: RwLock::new(None),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the store going down or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), VectorStoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(VectorStoreError::Unavailable(format!("{} store is offline", self.name)))
        }
    }

    fn missing(&self) -> VectorStoreError {
        VectorStoreError::MissingCollection(self.name.clone())
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn ping(&self) -> Result<(), VectorStoreError> {
        self.check_available()
    }

    async fn ensure_collection(&self) -> Result<(), VectorStoreError> {
        self.check_available()?;
        let mut points = self.points.write().await;
        if points.is_none() {
            *points = Some(Vec::new());
        }
        Ok(())
    }

    async fn clear_collection(&self) -> Result<(), VectorStoreError> {
        self.check_available()?;
        *self.points.write().await = Some(Vec::new());
        Ok(())
    }

    async fn upsert_points(&self, new_points: Vec<IndexPoint>) -> Result<(), VectorStoreError> {
        self.check_available()?;
        for point in &new_points {
            check_dimension(self.dimensions, &point.vector)?;
        }

        let mut guard = self.points.write().await;
        let points = guard.as_mut().ok_or_else(|| self.missing())?;

        for point in new_points {
            match points.iter_mut().find(|p| p.id == point.id) {
                Some(existing) => *existing = point,
                None => points.push(point),
            }
        }
        Ok(())
    }

    async fn delete_files(&self, file_paths: &[String]) -> Result<(), VectorStoreError> {
        self.check_available()?;
        let mut guard = self.points.write().await;
        let points = guard.as_mut().ok_or_else(|| self.missing())?;
        points.retain(|p| !file_paths.contains(&p.payload.file_path));
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        kind: Option<ChunkKind>,
    ) -> Result<Vec<VectorHit>, VectorStoreError> {
        self.check_available()?;
        check_dimension(self.dimensions, vector)?;

        let guard = self.points.read().await;
        let points = guard.as_ref().ok_or_else(|| self.missing())?;

        let mut hits: Vec<VectorHit> = points
            .iter()
            .filter(|p| kind.map_or(true, |k| p.payload.kind == k))
            .map(|p| VectorHit {
                id: p.id.clone(),
                score: cosine_similarity(vector, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn collection_info(&self) -> Result<CollectionInfo, VectorStoreError> {
        self.check_available()?;
        let guard = self.points.read().await;
        let points = guard.as_ref().ok_or_else(|| self.missing())?;

        Ok(CollectionInfo {
            point_count: points.len() as u64,
            dimensions: self.dimensions,
            distance: "cosine".to_string(),
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Cosine similarity; zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::PointPayload;

    fn point(id: &str, kind: ChunkKind, vector: Vec<f32>, name: &str) -> IndexPoint {
        IndexPoint {
            id: id.to_string(),
            vector,
            payload: PointPayload {
                chunk_id: id.to_string(),
                file_path: format!("src/{}.ts", id),
                kind,
                name: name.to_string(),
                start_line: 1,
                end_line: 2,
                content: format!("function {}() {{}}", name),
                role: None,
            },
        }
    }

    #[tokio::test]
    async fn test_ensure_collection_is_idempotent() {
        let store = MemoryVectorStore::new(2);
        store.ensure_collection().await.unwrap();
        store
            .upsert_points(vec![point("a", ChunkKind::Function, vec![1.0, 0.0], "a")])
            .await
            .unwrap();
        store.ensure_collection().await.unwrap();

        assert_eq!(store.collection_info().await.unwrap().point_count, 1);
    }

    #[tokio::test]
    async fn test_upsert_same_id_replaces() {
        let store = MemoryVectorStore::new(2);
        store.ensure_collection().await.unwrap();

        store
            .upsert_points(vec![point("a", ChunkKind::Function, vec![1.0, 0.0], "first")])
            .await
            .unwrap();
        store
            .upsert_points(vec![point("a", ChunkKind::Function, vec![0.0, 1.0], "second")])
            .await
            .unwrap();

        let info = store.collection_info().await.unwrap();
        assert_eq!(info.point_count, 1);

        let hits = store.search(&[0.0, 1.0], 10, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].payload.name, "second");
    }

    #[tokio::test]
    async fn test_search_wrong_dimension() {
        let store = MemoryVectorStore::new(3);
        store.ensure_collection().await.unwrap();

        let err = store.search(&[1.0, 0.0], 5, None).await.unwrap_err();
        assert!(err.to_string().contains("dimension"));
    }

    #[tokio::test]
    async fn test_upsert_wrong_dimension() {
        let store = MemoryVectorStore::new(3);
        store.ensure_collection().await.unwrap();

        let err = store
            .upsert_points(vec![point("a", ChunkKind::Function, vec![1.0], "a")])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::DimensionMismatch { expected: 3, actual: 1 }));
    }

    #[tokio::test]
    async fn test_search_ranks_and_filters() {
        let store = MemoryVectorStore::new(2);
        store.ensure_collection().await.unwrap();
        store
            .upsert_points(vec![
                point("far", ChunkKind::Function, vec![0.0, 1.0], "far"),
                point("near", ChunkKind::Function, vec![1.0, 0.1], "near"),
                point("hook", ChunkKind::Hook, vec![1.0, 0.0], "useNear"),
            ])
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.0], 2, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["hook", "near"]);

        let hooks = store.search(&[1.0, 0.0], 10, Some(ChunkKind::Hook)).await.unwrap();
        assert_eq!(hooks.len(), 1);
        assert_eq!(hooks[0].payload.kind, ChunkKind::Hook);
    }

    #[tokio::test]
    async fn test_clear_and_missing_collection() {
        let store = MemoryVectorStore::new(2);
        assert!(matches!(
            store.search(&[1.0, 0.0], 1, None).await,
            Err(VectorStoreError::MissingCollection(_))
        ));

        store.ensure_collection().await.unwrap();
        store
            .upsert_points(vec![point("a", ChunkKind::Function, vec![1.0, 0.0], "a")])
            .await
            .unwrap();
        store.clear_collection().await.unwrap();

        let info = store.collection_info().await.unwrap();
        assert_eq!(info.point_count, 0);
        assert_eq!(info.dimensions, 2);
        assert_eq!(info.distance, "cosine");
    }

    #[tokio::test]
    async fn test_delete_files() {
        let store = MemoryVectorStore::new(2);
        store.ensure_collection().await.unwrap();
        store
            .upsert_points(vec![
                point("a", ChunkKind::Function, vec![1.0, 0.0], "a"),
                point("b", ChunkKind::Hook, vec![0.0, 1.0], "b"),
            ])
            .await
            .unwrap();

        store.delete_files(&["src/a.ts".to_string()]).await.unwrap();

        let hits = store.search(&[1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
        store.delete_files(&[]).await.unwrap();
        assert_eq!(store.collection_info().await.unwrap().point_count, 1);
    }

    #[tokio::test]
    async fn test_offline_store() {
        let store = MemoryVectorStore::new(2);
        store.set_available(false);
        assert!(matches!(store.ping().await, Err(VectorStoreError::Unavailable(_))));
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
