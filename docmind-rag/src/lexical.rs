//! Lexical (keyword) index trait and an in-memory Okapi BM25 implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{Chunk, ScoredChunk};
use crate::error::Result;
use crate::filter::FilterSet;
use crate::text;

/// Scored keyword search over chunk text.
///
/// Filters are applied before scoring, so `limit` is never spent on
/// excluded chunks.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Insert or replace chunks.
    async fn index(&self, chunks: &[Arc<Chunk>]) -> Result<()>;

    /// Remove every chunk of a document, returning how many were removed.
    async fn delete_document(&self, document_id: &str) -> Result<usize>;

    /// The `limit` best-matching chunks for `query`, by descending score.
    /// Chunks with no matching term are not returned.
    async fn search(&self, query: &str, filters: &FilterSet, limit: usize) -> Result<Vec<ScoredChunk>>;
}

/// BM25 term-frequency saturation.
pub const DEFAULT_K1: f64 = 1.2;
/// BM25 length normalization.
pub const DEFAULT_B: f64 = 0.75;

#[derive(Debug)]
struct Posting {
    chunk: Arc<Chunk>,
    term_freqs: HashMap<String, u32>,
    length: usize,
}

#[derive(Debug, Default)]
struct Bm25State {
    postings: HashMap<String, Posting>,
    doc_freqs: HashMap<String, usize>,
    total_length: usize,
}

impl Bm25State {
    fn remove(&mut self, chunk_id: &str) -> bool {
        let Some(posting) = self.postings.remove(chunk_id) else {
            return false;
        };
        self.total_length -= posting.length;
        for term in posting.term_freqs.keys() {
            if let Some(df) = self.doc_freqs.get_mut(term) {
                *df -= 1;
                if *df == 0 {
                    self.doc_freqs.remove(term);
                }
            }
        }
        true
    }

    fn insert(&mut self, chunk: &Arc<Chunk>) {
        self.remove(&chunk.chunk_id);
        let terms = text::content_terms(&chunk.text);
        let mut term_freqs: HashMap<String, u32> = HashMap::new();
        for term in &terms {
            *term_freqs.entry(term.clone()).or_default() += 1;
        }
        for term in term_freqs.keys() {
            *self.doc_freqs.entry(term.clone()).or_default() += 1;
        }
        self.total_length += terms.len();
        self.postings.insert(
            chunk.chunk_id.clone(),
            Posting { chunk: Arc::clone(chunk), term_freqs, length: terms.len() },
        );
    }
}

/// Okapi BM25 over an in-memory inverted index.
///
/// Text is tokenized with the shared content-term tokenizer (lowercased,
/// stop words removed, plural `s` stripped). IDF uses the Lucene variant
/// `ln(1 + (N - df + 0.5) / (df + 0.5))`, which is never negative.
#[derive(Debug)]
pub struct InMemoryLexicalIndex {
    state: RwLock<Bm25State>,
    k1: f64,
    b: f64,
}

impl Default for InMemoryLexicalIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLexicalIndex {
    pub fn new() -> Self {
        Self::with_params(DEFAULT_K1, DEFAULT_B)
    }

    pub fn with_params(k1: f64, b: f64) -> Self {
        Self { state: RwLock::new(Bm25State::default()), k1, b }
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.postings.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.postings.is_empty()
    }
}

#[async_trait]
impl LexicalIndex for InMemoryLexicalIndex {
    fn name(&self) -> &str {
        "in-memory-bm25"
    }

    async fn index(&self, chunks: &[Arc<Chunk>]) -> Result<()> {
        let mut state = self.state.write().await;
        for chunk in chunks {
            state.insert(chunk);
        }
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        let ids: Vec<String> = state
            .postings
            .values()
            .filter(|p| p.chunk.document_id == document_id)
            .map(|p| p.chunk.chunk_id.clone())
            .collect();
        for id in &ids {
            state.remove(id);
        }
        Ok(ids.len())
    }

    async fn search(&self, query: &str, filters: &FilterSet, limit: usize) -> Result<Vec<ScoredChunk>> {
        let mut query_terms = text::content_terms(query);
        query_terms.sort();
        query_terms.dedup();
        if query_terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let state = self.state.read().await;
        let n = state.postings.len() as f64;
        if n == 0.0 {
            return Ok(Vec::new());
        }
        let avg_len = (state.total_length as f64 / n).max(1.0);

        let idf: Vec<(String, f64)> = query_terms
            .into_iter()
            .filter_map(|term| {
                let df = *state.doc_freqs.get(&term)? as f64;
                Some((term, (1.0 + (n - df + 0.5) / (df + 0.5)).ln()))
            })
            .collect();

        let mut scored: Vec<ScoredChunk> = state
            .postings
            .values()
            .filter(|p| filters.matches(&p.chunk))
            .filter_map(|p| {
                let mut score = 0.0;
                for (term, term_idf) in &idf {
                    let Some(&tf) = p.term_freqs.get(term) else { continue };
                    let tf = tf as f64;
                    let norm = self.k1 * (1.0 - self.b + self.b * p.length as f64 / avg_len);
                    score += term_idf * tf * (self.k1 + 1.0) / (tf + norm);
                }
                (score > 0.0).then(|| ScoredChunk { chunk: Arc::clone(&p.chunk), score: score as f32 })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
        });
        scored.truncate(limit);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::keys;

    fn chunk(id: &str, text: &str) -> Arc<Chunk> {
        Arc::new(Chunk::new(id, format!("doc-{id}"), text, 0))
    }

    async fn index_of(chunks: &[Arc<Chunk>]) -> InMemoryLexicalIndex {
        let index = InMemoryLexicalIndex::new();
        index.index(chunks).await.unwrap();
        index
    }

    #[tokio::test]
    async fn ranks_by_term_matches() {
        let index = index_of(&[
            chunk("a", "invoice amount 1200 paid by ACME"),
            chunk("b", "invoice for consulting services"),
            chunk("c", "employee handbook vacation policy"),
        ])
        .await;

        let hits = index.search("invoice amount", &FilterSet::new(), 10).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.chunk.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn rare_terms_weigh_more() {
        let index = index_of(&[
            chunk("a", "report report zebra"),
            chunk("b", "report summary"),
            chunk("c", "report appendix"),
        ])
        .await;
        let hits = index.search("zebra report", &FilterSet::new(), 1).await.unwrap();
        assert_eq!(hits[0].chunk.chunk_id, "a");
    }

    #[tokio::test]
    async fn stop_word_query_returns_nothing() {
        let index = index_of(&[chunk("a", "the invoice")]).await;
        assert!(index.search("the of and", &FilterSet::new(), 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn filters_apply_before_limit() {
        let strong = Arc::new(
            Chunk::new("strong", "d1", "invoice invoice invoice", 0)
                .with_metadata(keys::DOCUMENT_TYPE, "receipt"),
        );
        let weak = Arc::new(
            Chunk::new("weak", "d2", "invoice and many other unrelated words here", 0)
                .with_metadata(keys::DOCUMENT_TYPE, "invoice"),
        );
        let index = index_of(&[strong, weak]).await;
        let hits = index
            .search("invoice", &FilterSet::new().with_document_type("invoice"), 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.chunk_id, "weak");
    }

    #[tokio::test]
    async fn reindex_and_delete_keep_statistics_consistent() {
        let index = index_of(&[chunk("a", "alpha beta"), chunk("b", "beta gamma")]).await;
        index.index(&[chunk("a", "delta")]).await.unwrap();
        assert!(index.search("alpha", &FilterSet::new(), 5).await.unwrap().is_empty());

        assert_eq!(index.delete_document("doc-b").await.unwrap(), 1);
        assert!(index.search("beta", &FilterSet::new(), 5).await.unwrap().is_empty());
        assert_eq!(index.len().await, 1);
    }
}
