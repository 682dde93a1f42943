//! Answer persistence for analytics.
//!
//! After every successful query the pipeline hands an [`AnswerRecord`] to
//! the configured [`AnswerSink`]. Sink failures are logged and never affect
//! the answer returned to the caller.

use std::hash::Hasher;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use twox_hash::XxHash64;
use uuid::Uuid;

use crate::document::{AnswerResult, AnswerStatus, Citation, StageTimings};
use crate::error::Result;

/// What gets persisted about one answered query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub query_id: Uuid,
    pub question: String,
    pub answer_text: String,
    /// Hex XxHash64 of the answer text, for deduplication.
    pub answer_hash: String,
    pub model_used: String,
    pub status: AnswerStatus,
    /// Chunks shown to the generator, in rank order.
    pub context_chunk_ids: Vec<String>,
    pub citations: Vec<Citation>,
    pub confidence: f64,
    pub timings: StageTimings,
    pub created_at: DateTime<Utc>,
}

impl AnswerRecord {
    pub fn from_result(question: &str, context_chunk_ids: Vec<String>, result: &AnswerResult) -> Self {
        Self {
            query_id: result.query_id,
            question: question.to_string(),
            answer_text: result.answer_text.clone(),
            answer_hash: answer_hash(&result.answer_text),
            model_used: result.model_used.clone(),
            status: result.status,
            context_chunk_ids,
            citations: result.citations.clone(),
            confidence: result.confidence_score,
            timings: result.retrieval_stats.timings.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Stable content hash of an answer.
pub fn answer_hash(text: &str) -> String {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(text.as_bytes());
    format!("{:016x}", hasher.finish())
}

/// Receives a record of every successful answer.
///
/// `record` is awaited on the query path under
/// [`PipelineLimits::sink_timeout`](crate::PipelineLimits::sink_timeout);
/// a sink that needs longer should hand the record to its own background
/// writer and return.
#[async_trait]
pub trait AnswerSink: Send + Sync {
    async fn record(&self, record: &AnswerRecord) -> Result<()>;
}

/// Aggregate answer statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RagStats {
    pub total_queries: usize,
    pub grounded: usize,
    pub unverified: usize,
    pub cannot_answer: usize,
    pub average_confidence: f64,
    pub total_citations: usize,
}

/// Keeps records in memory. Intended for tests and local tooling.
#[derive(Debug, Default)]
pub struct InMemoryAnswerSink {
    records: RwLock<Vec<AnswerRecord>>,
}

impl InMemoryAnswerSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<AnswerRecord> {
        self.records.read().await.clone()
    }

    pub async fn stats(&self) -> RagStats {
        let records = self.records.read().await;
        let mut stats = RagStats { total_queries: records.len(), ..RagStats::default() };
        for record in records.iter() {
            match record.status {
                AnswerStatus::Grounded => stats.grounded += 1,
                AnswerStatus::Unverified => stats.unverified += 1,
                AnswerStatus::CannotAnswer => stats.cannot_answer += 1,
            }
            stats.total_citations += record.citations.len();
        }
        if !records.is_empty() {
            stats.average_confidence =
                records.iter().map(|r| r.confidence).sum::<f64>() / records.len() as f64;
        }
        stats
    }
}

#[async_trait]
impl AnswerSink for InMemoryAnswerSink {
    async fn record(&self, record: &AnswerRecord) -> Result<()> {
        self.records.write().await.push(record.clone());
        Ok(())
    }
}
