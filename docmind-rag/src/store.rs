//! Chunk store: the system of record for ingested chunks.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::Chunk;
use crate::error::Result;
use crate::filter::FilterSet;

/// Storage for chunks, keyed by `chunk_id`.
///
/// Read methods are called concurrently from many queries; writes happen on
/// the separate ingestion path.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Insert or replace chunks.
    async fn put(&self, chunks: &[Arc<Chunk>]) -> Result<()>;

    /// Look up a chunk by id.
    async fn get(&self, chunk_id: &str) -> Result<Option<Arc<Chunk>>>;

    /// Every chunk of a document, in ordinal order.
    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Arc<Chunk>>>;

    /// Every chunk satisfying `filters`, ordered by `chunk_id`.
    async fn filtered(&self, filters: &FilterSet) -> Result<Vec<Arc<Chunk>>>;

    /// Remove a document's chunks, returning the removed ids.
    async fn delete_document(&self, document_id: &str) -> Result<Vec<String>>;

    async fn len(&self) -> Result<usize>;
}

#[derive(Debug, Default)]
struct StoreState {
    chunks: BTreeMap<String, Arc<Chunk>>,
    by_document: HashMap<String, Vec<String>>,
}

/// A [`ChunkStore`] held in memory behind a `tokio::sync::RwLock`.
///
/// Suitable for development, testing, and small corpora.
#[derive(Debug, Default)]
pub struct InMemoryChunkStore {
    state: RwLock<StoreState>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn put(&self, chunks: &[Arc<Chunk>]) -> Result<()> {
        let mut state = self.state.write().await;
        for chunk in chunks {
            let ids = state.by_document.entry(chunk.document_id.clone()).or_default();
            if !ids.contains(&chunk.chunk_id) {
                ids.push(chunk.chunk_id.clone());
            }
            state.chunks.insert(chunk.chunk_id.clone(), Arc::clone(chunk));
        }
        Ok(())
    }

    async fn get(&self, chunk_id: &str) -> Result<Option<Arc<Chunk>>> {
        Ok(self.state.read().await.chunks.get(chunk_id).cloned())
    }

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Arc<Chunk>>> {
        let state = self.state.read().await;
        let mut chunks: Vec<Arc<Chunk>> = state
            .by_document
            .get(document_id)
            .map(|ids| ids.iter().filter_map(|id| state.chunks.get(id).cloned()).collect())
            .unwrap_or_default();
        chunks.sort_by_key(|c| c.ordinal);
        Ok(chunks)
    }

    async fn filtered(&self, filters: &FilterSet) -> Result<Vec<Arc<Chunk>>> {
        let state = self.state.read().await;
        Ok(state.chunks.values().filter(|c| filters.matches(c)).cloned().collect())
    }

    async fn delete_document(&self, document_id: &str) -> Result<Vec<String>> {
        let mut state = self.state.write().await;
        let ids = state.by_document.remove(document_id).unwrap_or_default();
        for id in &ids {
            state.chunks.remove(id);
        }
        Ok(ids)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.state.read().await.chunks.len())
    }
}
