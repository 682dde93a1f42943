//! Grounded-answer pipeline orchestrator.
//!
//! The [`RagPipeline`] runs every query through six stages: plan, retrieve
//! (lexical and dense concurrently), fuse, rerank, generate and guard. It
//! also owns the write path that keeps the chunk store and both indexes in
//! step.
//!
//! # Example
//!
//! ```rust,ignore
//! use docmind_rag::{Document, FilterSet, HashEmbeddingProvider, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .embedding_provider(Arc::new(HashEmbeddingProvider::new(256)?))
//!     .llm(Arc::new(my_llm))
//!     .build()?;
//!
//! pipeline.ingest(&Document::new("inv-42", "Invoice 42 totals $1,200.")).await?;
//! let answer = pipeline.answer("What does invoice 42 total?", &FilterSet::default()).await?;
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use docmind_guardrail::{GuardrailSet, PiiRedactor};
use docmind_model::LlmProvider;
use futures::future::{AbortHandle, Abortable};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::{PipelineConfig, PipelineLimits, RerankerType};
use crate::document::{AnswerResult, Chunk, Document, FusedCandidate, RetrievalStats, StageTimings};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::filter::FilterSet;
use crate::generation::GroundedGenerator;
use crate::guard::PostGenerationGuard;
use crate::lexical::{InMemoryLexicalIndex, LexicalIndex};
use crate::planner::{QueryPlan, QueryPlanner};
use crate::reranker::{
    CrossEncoderModel, CrossEncoderReranker, HeuristicReranker, LlmReranker, Reranker, rerank_stage,
};
use crate::retrieval::{MultiRetriever, RetrievalOutput};
use crate::sink::{AnswerRecord, AnswerSink};
use crate::store::{ChunkStore, InMemoryChunkStore};
use crate::vector::{InMemoryVectorIndex, VectorIndex};

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// The grounded-answer pipeline.
///
/// Collaborators are shared `Arc`s and only read on the query path, so one
/// pipeline serves any number of concurrent queries. Construct one via
/// [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: PipelineConfig,
    limits: PipelineLimits,
    store: Arc<dyn ChunkStore>,
    lexical: Arc<dyn LexicalIndex>,
    vector: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Arc<dyn Chunker>,
    planner: QueryPlanner,
    retriever: MultiRetriever,
    rerankers: BTreeMap<RerankerType, Arc<dyn Reranker>>,
    generator: GroundedGenerator,
    guard: PostGenerationGuard,
    sink: Option<Arc<dyn AnswerSink>>,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// The default configuration used by [`answer`](Self::answer).
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn limits(&self) -> &PipelineLimits {
        &self.limits
    }

    pub fn chunk_store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    /// Answer a query with the pipeline's default configuration.
    pub async fn answer(&self, query: &str, filters: &FilterSet) -> Result<AnswerResult> {
        self.answer_query(query, filters, &self.config).await
    }

    /// Answer a query.
    ///
    /// Degraded conditions (one retrieval source down, reranker skipped,
    /// citations stripped) are reported in
    /// [`AnswerResult::retrieval_stats`]. Dropping the returned future
    /// cancels any outstanding retrieval, rerank or generation call.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidQuery`] for an empty or oversized query or
    ///   unsatisfiable filters
    /// - [`RagError::RetrievalUnavailable`] if every retrieval source failed
    /// - [`RagError::GenerationTimeout`] / [`RagError::Generation`] if the
    ///   model timed out or failed
    /// - [`RagError::EmptyAnswer`] if nothing survived redaction
    pub async fn answer_query(
        &self,
        query: &str,
        filters: &FilterSet,
        config: &PipelineConfig,
    ) -> Result<AnswerResult> {
        let query_id = Uuid::new_v4();
        let span = info_span!("rag.query", query.id = %query_id);
        let result = self.execute(query_id, query, filters, config).instrument(span.clone()).await;
        if let Err(e) = &result {
            span.in_scope(|| error!(kind = ?e.kind(), error = %e, "rag query failed"));
        }
        result
    }

    /// Like [`answer_query`](Self::answer_query), with a handle that aborts
    /// the query from elsewhere. An aborted query resolves to
    /// [`RagError::Cancelled`].
    pub fn answer_query_abortable<'a>(
        &'a self,
        query: &'a str,
        filters: &'a FilterSet,
        config: &'a PipelineConfig,
    ) -> (impl Future<Output = Result<AnswerResult>> + 'a, AbortHandle) {
        let (handle, registration) = AbortHandle::new_pair();
        let query = Abortable::new(self.answer_query(query, filters, config), registration);
        let future = async move {
            match query.await {
                Ok(result) => result,
                Err(_aborted) => {
                    warn!("rag query aborted");
                    Err(RagError::Cancelled)
                }
            }
        };
        (future, handle)
    }

    /// Plan, retrieve and fuse without reranking or generation.
    ///
    /// # Errors
    ///
    /// [`RagError::InvalidQuery`] or [`RagError::RetrievalUnavailable`].
    pub async fn search(
        &self,
        query: &str,
        filters: &FilterSet,
        config: &PipelineConfig,
    ) -> Result<Vec<FusedCandidate>> {
        let plan = self.planner.plan(query, filters)?;
        let retrieved = self.retriever.retrieve(&plan, config.retrieval_method).await?;
        let fused = config.fusion_method.fuse(retrieved.lexical.candidates(), retrieved.dense.candidates());
        info!(result_count = fused.len(), "search completed");
        Ok(fused)
    }

    async fn execute(
        &self,
        query_id: Uuid,
        query: &str,
        filters: &FilterSet,
        config: &PipelineConfig,
    ) -> Result<AnswerResult> {
        let started = Instant::now();
        let mut timings = StageTimings::default();

        config.validate()?;
        let stage = Instant::now();
        let plan: QueryPlan = self.planner.plan(query, filters)?;
        let top_k = filters
            .max_results
            .unwrap_or(config.max_results)
            .min(self.limits.rerank_candidate_limit);
        timings.planning_ms = elapsed_ms(stage);

        let stage = Instant::now();
        let retrieved: RetrievalOutput = self.retriever.retrieve(&plan, config.retrieval_method).await?;
        timings.retrieval_ms = elapsed_ms(stage);

        let stage = Instant::now();
        let fused = config.fusion_method.fuse(retrieved.lexical.candidates(), retrieved.dense.candidates());
        timings.fusion_ms = elapsed_ms(stage);
        debug!(stage = "fusion", fused_count = fused.len(), "fusion completed");

        let stage = Instant::now();
        let reranker = match config.reranker_type {
            RerankerType::None => None,
            kind => self.rerankers.get(&kind).map(|r| &**r),
        };
        let reranked = rerank_stage(
            reranker,
            &plan.original,
            &fused,
            self.limits.rerank_candidate_limit,
            top_k,
            self.limits.rerank_timeout,
        )
        .await;
        timings.rerank_ms = elapsed_ms(stage);

        let stage = Instant::now();
        let generation = self.generator.generate(&plan.original, &reranked.candidates).await?;
        timings.generation_ms = elapsed_ms(stage);

        let stage = Instant::now();
        let report = self.guard.review(&generation.draft, &generation.context.chunks).await?;
        timings.guard_ms = elapsed_ms(stage);
        timings.total_ms = elapsed_ms(started);

        let failed_sources = retrieved.failed_sources();
        let stats = RetrievalStats {
            lexical_count: retrieved.lexical.candidates().len(),
            dense_count: retrieved.dense.candidates().len(),
            fused_count: fused.len(),
            reranked_count: reranked.candidates.len(),
            partial_retrieval: !failed_sources.is_empty(),
            failed_sources,
            reranker_skipped: reranked.skipped,
            rerank_delta: reranked.delta,
            context_chunks: generation.context.chunks.len(),
            truncated_chunks: generation.context.truncated,
            citations_stripped: report.citations_stripped,
            claims_flagged: report.claims_flagged,
            unsupported_sentences: report.unsupported_sentences,
            redactions: report.redactions,
            timings,
        };

        let result = AnswerResult {
            query_id,
            answer_text: report.answer_text,
            citations: report.citations,
            confidence_score: report.confidence,
            status: report.status,
            retrieval_stats: stats,
            model_used: generation.model,
        };

        info!(
            query_length = plan.original.chars().count(),
            answer_length = result.answer_text.chars().count(),
            citation_count = result.citations.len(),
            confidence = result.confidence_score,
            status = ?result.status,
            partial_retrieval = result.retrieval_stats.partial_retrieval,
            reranker_skipped = result.retrieval_stats.reranker_skipped,
            duration_ms = result.retrieval_stats.timings.total_ms,
            "rag query completed"
        );

        if let Some(sink) = &self.sink {
            let shown = generation.context.chunks.iter().map(|c| c.chunk_id().to_string()).collect();
            let record = AnswerRecord::from_result(&plan.original, shown, &result);
            match tokio::time::timeout(self.limits.sink_timeout, sink.record(&record)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "failed to record answer"),
                Err(_) => warn!(
                    timeout_ms = self.limits.sink_timeout.as_millis() as u64,
                    "answer sink timed out, record dropped"
                ),
            }
        }

        Ok(result)
    }

    /// Chunk, embed and index a document.
    ///
    /// A document that was ingested before is replaced. Returns the stored
    /// chunks with embeddings attached.
    ///
    /// # Errors
    ///
    /// Collaborator errors from the embedder, store or indexes.
    pub async fn ingest(&self, document: &Document) -> Result<Vec<Arc<Chunk>>> {
        let mut chunks = self.chunker.chunk(document);
        if chunks.is_empty() {
            info!(document.id = %document.id, chunk_count = 0, "ingested document (empty)");
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await.map_err(|e| {
            error!(document.id = %document.id, error = %e, "embedding failed during ingestion");
            e
        })?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::Embedding {
                provider: self.embedder.name().to_string(),
                message: format!("expected {} embeddings, got {}", chunks.len(), embeddings.len()),
            });
        }
        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = embedding;
        }
        let chunks: Vec<Arc<Chunk>> = chunks.into_iter().map(Arc::new).collect();

        if !self.store.chunks_for_document(&document.id).await?.is_empty() {
            self.delete_document(&document.id).await?;
        }
        self.store.put(&chunks).await?;
        self.lexical.index(&chunks).await?;
        self.vector.upsert(&chunks).await.map_err(|e| {
            error!(document.id = %document.id, error = %e, "vector upsert failed during ingestion");
            e
        })?;

        info!(document.id = %document.id, chunk_count = chunks.len(), "ingested document");
        Ok(chunks)
    }

    /// Ingest several documents, stopping at the first failure.
    pub async fn ingest_batch(&self, documents: &[Document]) -> Result<Vec<Arc<Chunk>>> {
        let mut all_chunks = Vec::new();
        for document in documents {
            all_chunks.extend(self.ingest(document).await?);
        }
        Ok(all_chunks)
    }

    /// Remove a document's chunks from the store and both indexes.
    ///
    /// Returns the number of chunks removed from the store.
    pub async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let removed = self.store.delete_document(document_id).await?;
        let lexical = self.lexical.delete_document(document_id).await?;
        let vector = self.vector.delete_document(document_id).await?;
        info!(document.id = document_id, chunks = removed.len(), lexical, vector, "deleted document");
        Ok(removed.len())
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// Only the embedding provider and the LLM are required. The chunk store
/// and indexes default to the in-memory implementations, the chunker to
/// [`RecursiveChunker`], the cross-encoder to
/// [`LexicalCrossEncoder`](crate::LexicalCrossEncoder), and the guardrails
/// to a [`PiiRedactor`].
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(PipelineConfig::builder().reranker_type(RerankerType::Llm).build()?)
///     .limits(PipelineLimits::builder().context_char_budget(8000).build()?)
///     .embedding_provider(Arc::new(embedder))
///     .llm(Arc::new(llm))
///     .answer_sink(Arc::new(InMemoryAnswerSink::new()))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<PipelineConfig>,
    limits: Option<PipelineLimits>,
    store: Option<Arc<dyn ChunkStore>>,
    lexical: Option<Arc<dyn LexicalIndex>>,
    vector: Option<Arc<dyn VectorIndex>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    chunker: Option<Arc<dyn Chunker>>,
    llm: Option<Arc<dyn LlmProvider>>,
    rerankers: BTreeMap<RerankerType, Arc<dyn Reranker>>,
    guardrails: Option<GuardrailSet>,
    sink: Option<Arc<dyn AnswerSink>>,
}

impl RagPipelineBuilder {
    /// Set the default per-query configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn limits(mut self, limits: PipelineLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn chunk_store(mut self, store: Arc<dyn ChunkStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn lexical_index(mut self, index: Arc<dyn LexicalIndex>) -> Self {
        self.lexical = Some(index);
        self
    }

    pub fn vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.vector = Some(index);
        self
    }

    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(provider);
        self
    }

    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// The model used for generation, and for LLM reranking unless an
    /// [`LlmReranker`] is supplied.
    pub fn llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Use `reranker` whenever a query selects `kind`.
    pub fn reranker(mut self, kind: RerankerType, reranker: Arc<dyn Reranker>) -> Self {
        self.rerankers.insert(kind, reranker);
        self
    }

    /// Use `model` for [`RerankerType::CrossEncoder`].
    pub fn cross_encoder(self, model: Arc<dyn CrossEncoderModel>) -> Self {
        self.reranker(RerankerType::CrossEncoder, Arc::new(CrossEncoderReranker::new(model)))
    }

    /// Guardrails applied to answers and citation spans.
    pub fn guardrails(mut self, guardrails: GuardrailSet) -> Self {
        self.guardrails = Some(guardrails);
        self
    }

    pub fn answer_sink(mut self, sink: Arc<dyn AnswerSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the embedding provider or LLM is
    /// missing, or the config and limits are inconsistent.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        let limits = self.limits.unwrap_or_default();
        limits.validate()?;
        limits.check_config(&config)?;

        let embedder = self
            .embedder
            .ok_or_else(|| RagError::Config("embedding_provider is required".to_string()))?;
        let llm = self.llm.ok_or_else(|| RagError::Config("llm is required".to_string()))?;

        let store = self.store.unwrap_or_else(|| Arc::new(InMemoryChunkStore::new()));
        let lexical = self.lexical.unwrap_or_else(|| Arc::new(InMemoryLexicalIndex::new()));
        let vector = self.vector.unwrap_or_else(|| Arc::new(InMemoryVectorIndex::new()));
        let chunker = self.chunker.unwrap_or_else(|| Arc::new(RecursiveChunker::default()));

        let mut rerankers = self.rerankers;
        rerankers
            .entry(RerankerType::CrossEncoder)
            .or_insert_with(|| Arc::new(CrossEncoderReranker::default()));
        rerankers.entry(RerankerType::Llm).or_insert_with(|| Arc::new(LlmReranker::new(Arc::clone(&llm))));
        rerankers.entry(RerankerType::Heuristic).or_insert_with(|| Arc::new(HeuristicReranker));

        let guardrails = self.guardrails.unwrap_or_else(|| GuardrailSet::new().with(PiiRedactor::new()));
        let guard = PostGenerationGuard::new(guardrails, limits.entailment_threshold, limits.unverified_ceiling);

        let retriever = MultiRetriever::new(Arc::clone(&lexical), Arc::clone(&vector), Arc::clone(&embedder))
            .with_limit(limits.retrieval_limit)
            .with_timeouts(limits.lexical_timeout, limits.dense_timeout);
        let generator = GroundedGenerator::new(llm, limits.context_char_budget, limits.generation_timeout);

        info!(
            retrieval_method = ?config.retrieval_method,
            reranker_type = ?config.reranker_type,
            lexical = lexical.name(),
            vector = vector.name(),
            embedder = embedder.name(),
            model = generator.model(),
            "built rag pipeline"
        );

        Ok(RagPipeline {
            planner: QueryPlanner::new(limits.max_query_chars),
            config,
            limits,
            store,
            lexical,
            vector,
            embedder,
            chunker,
            retriever,
            rerankers,
            generator,
            guard,
            sink: self.sink,
        })
    }
}
