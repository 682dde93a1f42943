//! Vector index trait and an exact in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{Chunk, ScoredChunk};
use crate::error::{RagError, Result};
use crate::filter::FilterSet;

/// Nearest-neighbour search over chunk embeddings.
///
/// Filters are applied before scoring, so `limit` is never spent on
/// excluded chunks.
///
/// # Example
///
/// ```rust,ignore
/// use docmind_rag::{InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::new();
/// index.upsert(&chunks).await?;
/// let hits = index.search(&query_embedding, &FilterSet::default(), 50).await?;
/// ```
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Insert or replace chunks. Chunks must have embeddings set.
    async fn upsert(&self, chunks: &[Arc<Chunk>]) -> Result<()>;

    /// Remove every chunk of a document, returning how many were removed.
    async fn delete_document(&self, document_id: &str) -> Result<usize>;

    /// The `limit` chunks most similar to `embedding`, by descending score.
    async fn search(
        &self,
        embedding: &[f32],
        filters: &FilterSet,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>>;
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if the vectors differ in length, either has zero magnitude,
/// or the result is not finite.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let cosine = dot / (norm_a * norm_b);
    if cosine.is_finite() { cosine } else { 0.0 }
}

/// An exact (brute-force) cosine index.
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    chunks: RwLock<HashMap<String, Arc<Chunk>>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chunks.read().await.is_empty()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn name(&self) -> &str {
        "in-memory-vector"
    }

    async fn upsert(&self, chunks: &[Arc<Chunk>]) -> Result<()> {
        if let Some(missing) = chunks.iter().find(|c| c.embedding.is_empty()) {
            return Err(RagError::Index {
                backend: self.name().to_string(),
                message: format!("chunk '{}' has no embedding", missing.chunk_id),
            });
        }
        let mut index = self.chunks.write().await;
        for chunk in chunks {
            index.insert(chunk.chunk_id.clone(), Arc::clone(chunk));
        }
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let mut index = self.chunks.write().await;
        let before = index.len();
        index.retain(|_, c| c.document_id != document_id);
        Ok(before - index.len())
    }

    async fn search(
        &self,
        embedding: &[f32],
        filters: &FilterSet,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let index = self.chunks.read().await;

        let mut scored: Vec<ScoredChunk> = index
            .values()
            .filter(|chunk| filters.matches(chunk))
            .map(|chunk| ScoredChunk {
                chunk: Arc::clone(chunk),
                score: cosine_similarity(&chunk.embedding, embedding),
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id)));
        scored.truncate(limit);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::keys;

    fn chunk(id: &str, doc: &str, embedding: Vec<f32>) -> Arc<Chunk> {
        Arc::new(Chunk::new(id, doc, id, 0).with_embedding(embedding))
    }

    #[test]
    fn cosine_of_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn non_finite_cosine_is_zero() {
        assert_eq!(cosine_similarity(&[f32::NAN, 1.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[f32::INFINITY, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn search_order_is_total_with_degenerate_embeddings() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(&[
                chunk("nan", "d1", vec![f32::NAN, 0.0]),
                chunk("far", "d2", vec![-1.0, 0.0]),
                chunk("near", "d3", vec![1.0, 0.1]),
                chunk("exact", "d4", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.0], &FilterSet::new(), 10).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "near", "nan", "far"]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn upsert_requires_embeddings() {
        let index = InMemoryVectorIndex::new();
        let bare = Arc::new(Chunk::new("x", "d", "text", 0));
        assert!(matches!(index.upsert(&[bare]).await, Err(RagError::Index { .. })));
    }

    #[tokio::test]
    async fn search_filters_before_ranking() {
        let index = InMemoryVectorIndex::new();
        let best = Arc::new(
            Chunk::new("best", "d1", "t", 0)
                .with_embedding(vec![1.0, 0.0])
                .with_metadata(keys::DOCUMENT_TYPE, "contract"),
        );
        let other = Arc::new(
            Chunk::new("other", "d2", "t", 0)
                .with_embedding(vec![0.6, 0.8])
                .with_metadata(keys::DOCUMENT_TYPE, "invoice"),
        );
        index.upsert(&[best, other]).await.unwrap();

        let hits = index
            .search(&[1.0, 0.0], &FilterSet::new().with_document_type("invoice"), 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.chunk_id, "other");
    }

    #[tokio::test]
    async fn delete_document_cascades() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(&[chunk("a", "d1", vec![1.0]), chunk("b", "d1", vec![1.0]), chunk("c", "d2", vec![1.0])])
            .await
            .unwrap();
        assert_eq!(index.delete_document("d1").await.unwrap(), 2);
        assert_eq!(index.len().await, 1);
    }
}
