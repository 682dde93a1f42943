//! Concurrent lexical and dense retrieval with per-source timeouts.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::RetrievalMethod;
use crate::document::{RetrievalCandidate, RetrievalSource, ScoredChunk};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::lexical::LexicalIndex;
use crate::planner::QueryPlan;
use crate::vector::VectorIndex;

/// What one retrieval source produced for a query.
#[derive(Debug, Clone)]
pub enum SourceOutcome {
    /// Ranked candidates, best first. May be empty.
    Succeeded(Vec<RetrievalCandidate>),
    /// The source errored or timed out.
    Failed { reason: String },
    /// The retrieval method did not configure this source.
    Skipped,
}

impl SourceOutcome {
    pub fn candidates(&self) -> &[RetrievalCandidate] {
        match self {
            SourceOutcome::Succeeded(candidates) => candidates,
            _ => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SourceOutcome::Failed { .. })
    }
}

/// Both sources' outcomes for one query.
#[derive(Debug, Clone)]
pub struct RetrievalOutput {
    pub lexical: SourceOutcome,
    pub dense: SourceOutcome,
}

impl RetrievalOutput {
    /// Sources that were configured but failed.
    pub fn failed_sources(&self) -> Vec<RetrievalSource> {
        let mut failed = Vec::new();
        if self.lexical.is_failed() {
            failed.push(RetrievalSource::Lexical);
        }
        if self.dense.is_failed() {
            failed.push(RetrievalSource::Dense);
        }
        failed
    }

    /// One source failed while another succeeded.
    pub fn is_partial(&self) -> bool {
        !self.failed_sources().is_empty()
    }
}

/// Issues the lexical and dense lookups for a query concurrently.
///
/// Each source runs under its own timeout; exceeding it counts as that
/// source failing, not as a query-level error. Dropping the future returned
/// by [`retrieve`](Self::retrieve) drops both lookups.
#[derive(Clone)]
pub struct MultiRetriever {
    lexical: Arc<dyn LexicalIndex>,
    vector: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    limit: usize,
    lexical_timeout: Duration,
    dense_timeout: Duration,
}

impl MultiRetriever {
    pub fn new(
        lexical: Arc<dyn LexicalIndex>,
        vector: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            lexical,
            vector,
            embedder,
            limit: 50,
            lexical_timeout: Duration::from_secs(2),
            dense_timeout: Duration::from_secs(2),
        }
    }

    /// Cap each source's list at `limit` candidates.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_timeouts(mut self, lexical: Duration, dense: Duration) -> Self {
        self.lexical_timeout = lexical;
        self.dense_timeout = dense;
        self
    }

    /// # Errors
    ///
    /// [`RagError::RetrievalUnavailable`] when every configured source failed.
    pub async fn retrieve(&self, plan: &QueryPlan, method: RetrievalMethod) -> Result<RetrievalOutput> {
        let lexical = async {
            if !method.uses_lexical() {
                return SourceOutcome::Skipped;
            }
            let search = self.lexical.search(&plan.lexical_text, &plan.filters, self.limit);
            bounded(RetrievalSource::Lexical, self.lexical_timeout, search).await
        };

        let dense = async {
            if !method.uses_dense() {
                return SourceOutcome::Skipped;
            }
            let search = async {
                let embedding = self.embedder.embed(&plan.original).await?;
                self.vector.search(&embedding, &plan.filters, self.limit).await
            };
            bounded(RetrievalSource::Dense, self.dense_timeout, search).await
        };

        let (lexical, dense) = tokio::join!(lexical, dense);
        let output = RetrievalOutput { lexical, dense };

        let configured = usize::from(method.uses_lexical()) + usize::from(method.uses_dense());
        let failed = output.failed_sources();
        if failed.len() == configured {
            let failures = [(RetrievalSource::Lexical, &output.lexical), (RetrievalSource::Dense, &output.dense)]
                .into_iter()
                .filter_map(|(source, outcome)| match outcome {
                    SourceOutcome::Failed { reason } => Some(format!("{source}: {reason}")),
                    _ => None,
                })
                .collect();
            return Err(RagError::RetrievalUnavailable { failures });
        }

        debug!(
            stage = "retrieval",
            lexical_count = output.lexical.candidates().len(),
            dense_count = output.dense.candidates().len(),
            partial = !failed.is_empty(),
            "retrieval completed"
        );
        Ok(output)
    }
}

async fn bounded<F>(source: RetrievalSource, timeout: Duration, search: F) -> SourceOutcome
where
    F: Future<Output = Result<Vec<ScoredChunk>>>,
{
    match tokio::time::timeout(timeout, search).await {
        Ok(Ok(hits)) => SourceOutcome::Succeeded(
            hits.into_iter()
                .enumerate()
                .map(|(i, hit)| RetrievalCandidate {
                    chunk: hit.chunk,
                    source,
                    raw_score: hit.score,
                    rank: i + 1,
                })
                .collect(),
        ),
        Ok(Err(e)) => {
            warn!(source = %source, error = %e, "retrieval source failed");
            SourceOutcome::Failed { reason: e.to_string() }
        }
        Err(_) => {
            let timeout_ms = timeout.as_millis() as u64;
            warn!(source = %source, timeout_ms, "retrieval source timed out");
            SourceOutcome::Failed { reason: format!("timed out after {timeout_ms} ms") }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Chunk;
    use crate::embedding::HashEmbeddingProvider;
    use crate::filter::FilterSet;
    use crate::lexical::InMemoryLexicalIndex;
    use crate::planner::QueryPlanner;
    use crate::vector::InMemoryVectorIndex;

    async fn retriever() -> MultiRetriever {
        let embedder = Arc::new(HashEmbeddingProvider::new(64).unwrap());
        let lexical = Arc::new(InMemoryLexicalIndex::new());
        let vector = Arc::new(InMemoryVectorIndex::new());
        let texts = [("a", "invoice total 1200"), ("b", "invoice due date"), ("c", "holiday policy")];
        let mut chunks = Vec::new();
        for (id, text) in texts {
            let embedding = embedder.embed(text).await.unwrap();
            chunks.push(Arc::new(Chunk::new(id, "d", text, 0).with_embedding(embedding)));
        }
        lexical.index(&chunks).await.unwrap();
        vector.upsert(&chunks).await.unwrap();
        MultiRetriever::new(lexical, vector, embedder)
    }

    fn plan(q: &str) -> QueryPlan {
        QueryPlanner::new(1000).plan(q, &FilterSet::new()).unwrap()
    }

    #[tokio::test]
    async fn ranks_are_one_based_per_source() {
        let output = retriever().await.retrieve(&plan("invoice total"), RetrievalMethod::Hybrid).await.unwrap();
        let lexical = output.lexical.candidates();
        assert_eq!(lexical[0].chunk.chunk_id, "a");
        assert_eq!(lexical[0].rank, 1);
        assert!(lexical.iter().all(|c| c.source == RetrievalSource::Lexical));
        assert_eq!(output.dense.candidates()[0].rank, 1);
        assert!(!output.is_partial());
    }

    #[tokio::test]
    async fn limit_caps_each_source() {
        let output = retriever()
            .await
            .with_limit(1)
            .retrieve(&plan("invoice"), RetrievalMethod::Hybrid)
            .await
            .unwrap();
        assert_eq!(output.lexical.candidates().len(), 1);
        assert_eq!(output.dense.candidates().len(), 1);
    }

    #[tokio::test]
    async fn unconfigured_source_is_skipped() {
        let output = retriever().await.retrieve(&plan("invoice"), RetrievalMethod::LexicalOnly).await.unwrap();
        assert!(matches!(output.dense, SourceOutcome::Skipped));
        assert!(output.failed_sources().is_empty());
    }
}
