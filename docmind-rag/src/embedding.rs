//! Embedding provider trait for generating vector embeddings from text.

use std::hash::Hasher;

use async_trait::async_trait;
use twox_hash::XxHash64;

use crate::error::{RagError, Result};
use crate::text;

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends behind a unified async
/// interface. The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends that support native batching should override it.
///
/// # Example
///
/// ```rust,ignore
/// use docmind_rag::EmbeddingProvider;
///
/// let provider = HashEmbeddingProvider::new(256)?;
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// The default implementation calls [`embed`](EmbeddingProvider::embed)
    /// sequentially for each input.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Provider name used in logs and errors.
    fn name(&self) -> &str {
        "embedding"
    }
}

/// Deterministic feature-hashing embedder.
///
/// Content terms and adjacent-term bigrams are hashed with xxHash64 into a
/// fixed number of signed buckets, then L2-normalized. Texts sharing
/// vocabulary land close in cosine space. Needs no model or network, which
/// makes it the default for tests and offline runs.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dimensions: usize,
    seed: u64,
}

impl HashEmbeddingProvider {
    pub const DEFAULT_DIMENSIONS: usize = 256;

    /// # Errors
    ///
    /// Returns [`RagError::Embedding`] if `dimensions` is zero.
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(RagError::Embedding {
                provider: "hash".to_string(),
                message: "dimensions must be greater than zero".to_string(),
            });
        }
        Ok(Self { dimensions, seed: 0 })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn bucket(&self, feature: &str, weight: f32, vector: &mut [f32]) {
        let mut hasher = XxHash64::with_seed(self.seed);
        hasher.write(feature.as_bytes());
        let hash = hasher.finish();
        let index = (hash % self.dimensions as u64) as usize;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        vector[index] += sign * weight;
    }

    fn embed_sync(&self, input: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let terms = text::content_terms(input);
        for term in &terms {
            self.bucket(term, 1.0, &mut vector);
        }
        for pair in terms.windows(2) {
            self.bucket(&format!("{} {}", pair[0], pair[1]), 0.5, &mut vector);
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self { dimensions: Self::DEFAULT_DIMENSIONS, seed: 0 }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::cosine_similarity;

    #[tokio::test]
    async fn embeddings_are_deterministic_and_normalized() {
        let provider = HashEmbeddingProvider::new(64).unwrap();
        let a = provider.embed("invoice total amount").await.unwrap();
        let b = provider.embed("invoice total amount").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn shared_vocabulary_is_closer() {
        let provider = HashEmbeddingProvider::default();
        let query = provider.embed("invoice payment amount").await.unwrap();
        let near = provider.embed("the invoice payment amount was 1200").await.unwrap();
        let far = provider.embed("quarterly hiring plan for engineering").await.unwrap();
        assert!(cosine_similarity(&query, &near) > cosine_similarity(&query, &far));
    }

    #[tokio::test]
    async fn stop_word_only_text_is_zero_vector() {
        let provider = HashEmbeddingProvider::default();
        let v = provider.embed("the and of").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn zero_dimensions_rejected() {
        assert!(HashEmbeddingProvider::new(0).is_err());
    }
}
