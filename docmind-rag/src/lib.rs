//! # docmind-rag
//!
//! Hybrid retrieval and grounded-answer pipeline for DocuMind.
//!
//! ## Overview
//!
//! Every query runs through six stages:
//!
//! 1. [`QueryPlanner`] - normalizes the question and validates filters
//! 2. [`MultiRetriever`] - lexical (BM25) and dense (vector) lookups run
//!    concurrently, each under its own timeout
//! 3. [`FusionStrategy`] - reciprocal-rank or weighted-sum fusion
//! 4. [`Reranker`] - cross-encoder, LLM or heuristic scoring of a bounded
//!    candidate set, falling back to fusion order on failure
//! 5. [`GroundedGenerator`] - prompts the model with a bounded context window
//!    and requires per-claim chunk citations
//! 6. [`PostGenerationGuard`] - drops unresolvable citations, strips claims
//!    their sources do not entail, and redacts PII
//!
//! Degraded conditions are reported in [`RetrievalStats`]; only
//! [`RagError`] variants classified by [`ErrorKind`] fail a query.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docmind_rag::{Document, ExtractiveLlm, FilterSet, HashEmbeddingProvider, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .embedding_provider(Arc::new(HashEmbeddingProvider::new(256)?))
//!     .llm(Arc::new(ExtractiveLlm::new()))
//!     .build()?;
//!
//! pipeline.ingest(&Document::new("inv-42", "Invoice 42 totals $1,200.")).await?;
//! let answer = pipeline.answer("What does invoice 42 total?", &FilterSet::default()).await?;
//! for citation in &answer.citations {
//!     println!("{} -> {}", citation.chunk_id, citation.span.text);
//! }
//! ```
//!
//! ## Features
//!
//! - `openai` - [`OpenAIEmbeddingProvider`] and the OpenAI-compatible chat
//!   client from `docmind-model`
//! - `tantivy` - [`TantivyLexicalIndex`]

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod extractive;
pub mod filter;
pub mod fusion;
pub mod generation;
pub mod guard;
pub mod lexical;
#[cfg(feature = "openai")]
pub mod openai;
pub mod pipeline;
pub mod planner;
pub mod reranker;
pub mod retrieval;
pub mod sink;
pub mod store;
#[cfg(feature = "tantivy")]
pub mod tantivy_index;
pub mod text;
pub mod vector;

pub use chunking::{Chunker, RecursiveChunker};
pub use config::{
    PipelineConfig, PipelineConfigBuilder, PipelineLimits, PipelineLimitsBuilder, RerankerType,
    RetrievalMethod,
};
pub use document::{
    AnswerResult, AnswerStatus, Chunk, Citation, Document, FusedCandidate, Metadata, MetadataValue,
    RerankedCandidate, RetrievalCandidate, RetrievalSource, RetrievalStats, ScoredChunk, Span,
    StageTimings, keys,
};
pub use embedding::{EmbeddingProvider, HashEmbeddingProvider};
pub use error::{ErrorKind, QueryFailure, RagError, Result};
pub use extractive::ExtractiveLlm;
pub use filter::{DateRange, FilterSet};
pub use fusion::FusionStrategy;
pub use generation::{CANNOT_ANSWER_TEXT, ContextWindow, Draft, GroundedGenerator};
pub use guard::{Entailment, GuardReport, PostGenerationGuard};
pub use lexical::{InMemoryLexicalIndex, LexicalIndex};
#[cfg(feature = "openai")]
pub use openai::OpenAIEmbeddingProvider;
pub use pipeline::{RagPipeline, RagPipelineBuilder};
pub use planner::{QueryPlan, QueryPlanner};
pub use reranker::{
    CrossEncoderModel, CrossEncoderReranker, HeuristicReranker, LexicalCrossEncoder, LlmReranker,
    RerankOutput, Reranker, rerank_stage,
};
pub use retrieval::{MultiRetriever, RetrievalOutput, SourceOutcome};
pub use sink::{AnswerRecord, AnswerSink, InMemoryAnswerSink, RagStats};
pub use store::{ChunkStore, InMemoryChunkStore};
#[cfg(feature = "tantivy")]
pub use tantivy_index::TantivyLexicalIndex;
pub use vector::{InMemoryVectorIndex, VectorIndex};
