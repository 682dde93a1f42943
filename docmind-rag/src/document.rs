//! Data types for documents, chunks, candidates and answers.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known metadata keys.
pub mod keys {
    pub const DOCUMENT_TYPE: &str = "document_type";
    pub const PAGE_NUMBER: &str = "page_number";
    pub const CREATED_AT: &str = "created_at";
    pub const AUTHOR: &str = "author";
    pub const CONFIDENCE: &str = "confidence";
}

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
    Text(String),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Integer(i) => Some(*i as f64),
            MetadataValue::Float(f) => Some(*f),
            MetadataValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// The value as a date; text in `YYYY-MM-DD` form is accepted.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            MetadataValue::Date(d) => Some(*d),
            MetadataValue::Text(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").ok(),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Integer(i) => write!(f, "{i}"),
            MetadataValue::Float(x) => write!(f, "{x}"),
            MetadataValue::Date(d) => write!(f, "{d}"),
            MetadataValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<NaiveDate> for MetadataValue {
    fn from(value: NaiveDate) -> Self {
        MetadataValue::Date(value)
    }
}

/// Metadata attached to documents and chunks.
pub type Metadata = HashMap<String, MetadataValue>;

/// A source document submitted for ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Metadata inherited by every chunk.
    #[serde(default)]
    pub metadata: Metadata,
    /// Optional URI pointing to the original source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), metadata: Metadata::new(), source_uri: None }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_source_uri(mut self, uri: impl Into<String>) -> Self {
        self.source_uri = Some(uri.into());
        self
    }
}

/// A unit of indexed text. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    pub text: String,
    /// Empty until the ingestion path attaches an embedding.
    #[serde(default)]
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
    /// Position within the source document.
    pub ordinal: usize,
}

impl Chunk {
    pub fn new(
        chunk_id: impl Into<String>,
        document_id: impl Into<String>,
        text: impl Into<String>,
        ordinal: usize,
    ) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            document_id: document_id.into(),
            text: text.into(),
            embedding: Vec::new(),
            metadata: Metadata::new(),
            ordinal,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn document_type(&self) -> Option<&str> {
        self.metadata.get(keys::DOCUMENT_TYPE).and_then(MetadataValue::as_str)
    }
}

/// The retriever a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalSource {
    Lexical,
    Dense,
}

impl fmt::Display for RetrievalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalSource::Lexical => f.write_str("lexical"),
            RetrievalSource::Dense => f.write_str("dense"),
        }
    }
}

/// A chunk with a backend-specific score, as returned by an index.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Arc<Chunk>,
    pub score: f32,
}

/// One entry of a single source's ranked list. Exists only within a query.
#[derive(Debug, Clone)]
pub struct RetrievalCandidate {
    pub chunk: Arc<Chunk>,
    pub source: RetrievalSource,
    /// Source-specific; not comparable across sources.
    pub raw_score: f32,
    /// 1-based position in the source's list.
    pub rank: usize,
}

/// Candidates from all sources merged per chunk.
#[derive(Debug, Clone)]
pub struct FusedCandidate {
    pub chunk: Arc<Chunk>,
    pub fused_score: f64,
    pub sources: BTreeSet<RetrievalSource>,
}

impl FusedCandidate {
    pub fn chunk_id(&self) -> &str {
        &self.chunk.chunk_id
    }
}

/// A fused candidate after reranking.
#[derive(Debug, Clone)]
pub struct RerankedCandidate {
    pub chunk: Arc<Chunk>,
    pub rerank_score: f64,
    pub fused_score: f64,
    /// Dense `1..=K` with no ties.
    pub final_rank: usize,
}

impl RerankedCandidate {
    pub fn chunk_id(&self) -> &str {
        &self.chunk.chunk_id
    }
}

/// Byte range within a chunk's text plus the quoted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// A pointer from a generated claim to its supporting chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: String,
    pub document_id: String,
    pub span: Span,
    pub relevance_score: f64,
}

/// How well the returned answer is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    /// At least one citation survived verification.
    Grounded,
    /// An answer was produced but none of its citations survived.
    Unverified,
    /// The sources did not contain enough material to answer.
    CannotAnswer,
}

/// Wall-clock time spent in each stage, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimings {
    pub planning_ms: u64,
    pub retrieval_ms: u64,
    pub fusion_ms: u64,
    pub rerank_ms: u64,
    pub generation_ms: u64,
    pub guard_ms: u64,
    pub total_ms: u64,
}

/// Counts, degradation flags and timings for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalStats {
    pub lexical_count: usize,
    pub dense_count: usize,
    pub fused_count: usize,
    pub reranked_count: usize,
    /// One source failed or timed out while another succeeded.
    pub partial_retrieval: bool,
    pub failed_sources: Vec<RetrievalSource>,
    /// The reranker failed or timed out and fusion order was used.
    pub reranker_skipped: bool,
    /// Mean absolute rank displacement between fusion and rerank order.
    pub rerank_delta: f64,
    /// Chunks that fit the context window.
    pub context_chunks: usize,
    /// Reranked chunks dropped by the context budget.
    pub truncated_chunks: usize,
    pub citations_stripped: usize,
    pub claims_flagged: usize,
    /// Answer sentences the guard could not tie to a citation.
    pub unsupported_sentences: usize,
    pub redactions: usize,
    pub timings: StageTimings,
}

/// The result of a successful query. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub query_id: Uuid,
    pub answer_text: String,
    pub citations: Vec<Citation>,
    /// In `[0, 1]`.
    pub confidence_score: f64,
    pub status: AnswerStatus,
    pub retrieval_stats: RetrievalStats,
    pub model_used: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_value_deserializes_untagged() {
        let meta: Metadata = serde_json::from_str(
            r#"{"document_type":"invoice","page_number":3,"confidence":0.9,"created_at":"2024-03-01","ocr":true}"#,
        )
        .unwrap();
        assert_eq!(meta["document_type"], MetadataValue::Text("invoice".into()));
        assert_eq!(meta["page_number"], MetadataValue::Integer(3));
        assert_eq!(meta["confidence"], MetadataValue::Float(0.9));
        assert_eq!(
            meta["created_at"],
            MetadataValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert_eq!(meta["ocr"], MetadataValue::Bool(true));
    }

    #[test]
    fn text_dates_are_readable_as_dates() {
        let value = MetadataValue::from("2023-12-31");
        assert_eq!(value.as_date(), NaiveDate::from_ymd_opt(2023, 12, 31));
        assert_eq!(MetadataValue::from(7i64).as_f64(), Some(7.0));
    }

    #[test]
    fn answer_status_serializes_snake_case() {
        let json = serde_json::to_string(&AnswerStatus::CannotAnswer).unwrap();
        assert_eq!(json, "\"cannot_answer\"");
    }
}
