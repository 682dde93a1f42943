//! Rerankers and the bounded rerank stage.
//!
//! A [`Reranker`] scores `(query, passage)` relevance for a small candidate
//! set. [`rerank_stage`] enforces the candidate bound, applies the timeout,
//! and falls back to fusion order whenever the reranker cannot be trusted.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docmind_model::{GenerationRequest, LlmProvider};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::document::{FusedCandidate, RerankedCandidate};
use crate::error::{RagError, Result};
use crate::text;

/// Re-scores fused candidates against the query.
///
/// Implementations return one score per candidate, aligned with the input
/// order. Higher is more relevant; the scale is implementation-defined.
#[async_trait]
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    async fn rerank(&self, query: &str, candidates: &[FusedCandidate]) -> Result<Vec<f64>>;
}

/// A model that scores query/passage pairs jointly.
#[async_trait]
pub trait CrossEncoderModel: Send + Sync {
    fn name(&self) -> &str;

    /// One relevance score per passage, aligned with `passages`.
    async fn score_pairs(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>>;
}

/// Reranks with a [`CrossEncoderModel`].
pub struct CrossEncoderReranker {
    model: Arc<dyn CrossEncoderModel>,
}

impl CrossEncoderReranker {
    pub fn new(model: Arc<dyn CrossEncoderModel>) -> Self {
        Self { model }
    }
}

impl Default for CrossEncoderReranker {
    fn default() -> Self {
        Self::new(Arc::new(LexicalCrossEncoder))
    }
}

#[async_trait]
impl Reranker for CrossEncoderReranker {
    fn name(&self) -> &str {
        self.model.name()
    }

    async fn rerank(&self, query: &str, candidates: &[FusedCandidate]) -> Result<Vec<f64>> {
        let passages: Vec<&str> = candidates.iter().map(|c| c.chunk.text.as_str()).collect();
        let scores = self.model.score_pairs(query, &passages).await?;
        Ok(scores.into_iter().map(f64::from).collect())
    }
}

/// A dependency-free pair scorer.
///
/// `0.6 × term coverage + 0.3 × bigram coverage + 0.1 × min(5 × density, 1)`
/// where coverage is the fraction of distinct query content terms present in
/// the passage, bigram coverage the fraction of adjacent query term pairs
/// that also occur adjacently in the passage, and density the share of
/// passage terms that are query terms.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalCrossEncoder;

fn bigrams(terms: &[String]) -> HashSet<(&str, &str)> {
    terms.windows(2).map(|w| (w[0].as_str(), w[1].as_str())).collect()
}

impl LexicalCrossEncoder {
    pub fn score(query: &str, passage: &str) -> f32 {
        let query_terms = text::content_terms(query);
        let query_set: HashSet<&str> = query_terms.iter().map(String::as_str).collect();
        if query_set.is_empty() {
            return 0.0;
        }
        let passage_terms = text::content_terms(passage);
        let passage_set: HashSet<&str> = passage_terms.iter().map(String::as_str).collect();

        let coverage = query_set.intersection(&passage_set).count() as f32 / query_set.len() as f32;

        let query_bigrams = bigrams(&query_terms);
        let bigram = if query_bigrams.is_empty() {
            coverage
        } else {
            let passage_bigrams = bigrams(&passage_terms);
            query_bigrams.intersection(&passage_bigrams).count() as f32 / query_bigrams.len() as f32
        };

        let density = if passage_terms.is_empty() {
            0.0
        } else {
            let hits = passage_terms.iter().filter(|t| query_set.contains(t.as_str())).count();
            hits as f32 / passage_terms.len() as f32
        };

        0.6 * coverage + 0.3 * bigram + 0.1 * (density * 5.0).min(1.0)
    }
}

#[async_trait]
impl CrossEncoderModel for LexicalCrossEncoder {
    fn name(&self) -> &str {
        "lexical-cross-encoder"
    }

    async fn score_pairs(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        Ok(passages.iter().map(|p| Self::score(query, p)).collect())
    }
}

/// Jaccard similarity between query and passage content terms.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicReranker;

#[async_trait]
impl Reranker for HeuristicReranker {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn rerank(&self, query: &str, candidates: &[FusedCandidate]) -> Result<Vec<f64>> {
        let query_terms = text::term_set(query);
        Ok(candidates
            .iter()
            .map(|c| {
                let passage_terms = text::term_set(&c.chunk.text);
                let union = query_terms.union(&passage_terms).count();
                if union == 0 {
                    0.0
                } else {
                    query_terms.intersection(&passage_terms).count() as f64 / union as f64
                }
            })
            .collect())
    }
}

const LLM_PASSAGE_CHARS: usize = 800;

const LLM_RERANK_SYSTEM: &str = "You judge how relevant each passage is to a question. \
Score every passage from 0 (irrelevant) to 10 (directly answers the question). \
Respond with only a JSON array of objects like [{\"index\": 1, \"score\": 7}], one per passage.";

#[derive(Debug, Deserialize)]
struct PassageScore {
    index: usize,
    score: f64,
}

/// Asks a language model to grade each passage from 0 to 10.
///
/// Passages are numbered from 1 and truncated to 800 characters. Grades are
/// divided by 10; passages the model leaves out score 0.
pub struct LlmReranker {
    llm: Arc<dyn LlmProvider>,
    instructions: Option<String>,
}

impl LlmReranker {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm, instructions: None }
    }

    /// Domain guidance appended to the grading instructions.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    fn request(&self, query: &str, candidates: &[FusedCandidate]) -> GenerationRequest {
        let mut system = LLM_RERANK_SYSTEM.to_string();
        if let Some(instructions) = &self.instructions {
            system.push_str("\n\n");
            system.push_str(instructions);
        }
        let context = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[{}] {}", i + 1, text::truncate_chars(&c.chunk.text, LLM_PASSAGE_CHARS)))
            .collect::<Vec<_>>()
            .join("\n\n");
        GenerationRequest::new(format!("Question: {query}\n\nScore all {} passages.", candidates.len()))
            .with_system(system)
            .with_context(context)
            .with_temperature(0.0)
    }

    fn parse(&self, response: &str, count: usize) -> Result<Vec<f64>> {
        let payload = text::strip_code_fence(response);
        let array = match (payload.find('['), payload.rfind(']')) {
            (Some(start), Some(end)) if start < end => &payload[start..=end],
            _ => payload,
        };
        let grades: Vec<PassageScore> = serde_json::from_str(array).map_err(|e| RagError::Reranker {
            reranker: self.name().to_string(),
            message: format!("unparseable scores: {e}"),
        })?;

        let mut scores = vec![0.0; count];
        for grade in grades {
            if let Some(slot) = grade.index.checked_sub(1).and_then(|i| scores.get_mut(i)) {
                *slot = (grade.score / 10.0).clamp(0.0, 1.0);
            }
        }
        Ok(scores)
    }
}

#[async_trait]
impl Reranker for LlmReranker {
    fn name(&self) -> &str {
        "llm"
    }

    async fn rerank(&self, query: &str, candidates: &[FusedCandidate]) -> Result<Vec<f64>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let response = self.llm.generate(&self.request(query, candidates)).await?;
        self.parse(&response, candidates.len())
    }
}

/// Result of the rerank stage.
#[derive(Debug, Clone, Default)]
pub struct RerankOutput {
    /// At most `top_k` candidates with dense `final_rank`s from 1.
    pub candidates: Vec<RerankedCandidate>,
    /// How many fused candidates were handed to the reranker.
    pub scored_count: usize,
    /// The reranker failed, timed out, or returned unusable scores.
    pub skipped: bool,
    /// Mean absolute displacement between fusion and rerank positions.
    pub delta: f64,
}

/// Rerank the best `candidate_limit` fused candidates and keep `top_k`.
///
/// Candidates beyond `candidate_limit` are dropped before the reranker is
/// called. With no reranker the fusion order is kept. Errors, timeouts,
/// wrong-length or non-finite scores fall back to fusion order and set
/// [`RerankOutput::skipped`].
pub async fn rerank_stage(
    reranker: Option<&dyn Reranker>,
    query: &str,
    fused: &[FusedCandidate],
    candidate_limit: usize,
    top_k: usize,
    timeout: Duration,
) -> RerankOutput {
    let bounded = &fused[..fused.len().min(candidate_limit)];
    let Some(reranker) = reranker else {
        return fusion_order(bounded, top_k, false);
    };
    if bounded.is_empty() {
        return RerankOutput::default();
    }

    let scores = match tokio::time::timeout(timeout, reranker.rerank(query, bounded)).await {
        Ok(Ok(scores)) if scores.len() == bounded.len() && scores.iter().all(|s| s.is_finite()) => scores,
        Ok(Ok(scores)) => {
            warn!(
                reranker = reranker.name(),
                expected = bounded.len(),
                received = scores.len(),
                "reranker returned unusable scores, keeping fusion order"
            );
            return fusion_order(bounded, top_k, true);
        }
        Ok(Err(e)) => {
            warn!(reranker = reranker.name(), error = %e, "reranker failed, keeping fusion order");
            return fusion_order(bounded, top_k, true);
        }
        Err(_) => {
            warn!(
                reranker = reranker.name(),
                timeout_ms = timeout.as_millis() as u64,
                "reranker timed out, keeping fusion order"
            );
            return fusion_order(bounded, top_k, true);
        }
    };

    let mut order: Vec<usize> = (0..bounded.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b].total_cmp(&scores[a]).then_with(|| bounded[a].chunk_id().cmp(bounded[b].chunk_id()))
    });

    let delta = order
        .iter()
        .enumerate()
        .map(|(new_pos, &old_pos)| new_pos.abs_diff(old_pos) as f64)
        .sum::<f64>()
        / bounded.len() as f64;

    let candidates = order
        .into_iter()
        .take(top_k)
        .enumerate()
        .map(|(i, idx)| RerankedCandidate {
            chunk: Arc::clone(&bounded[idx].chunk),
            rerank_score: scores[idx],
            fused_score: bounded[idx].fused_score,
            final_rank: i + 1,
        })
        .collect();

    debug!(stage = "rerank", reranker = reranker.name(), scored = bounded.len(), delta, "rerank completed");
    RerankOutput { candidates, scored_count: bounded.len(), skipped: false, delta }
}

fn fusion_order(bounded: &[FusedCandidate], top_k: usize, skipped: bool) -> RerankOutput {
    let candidates = bounded
        .iter()
        .take(top_k)
        .enumerate()
        .map(|(i, c)| RerankedCandidate {
            chunk: Arc::clone(&c.chunk),
            rerank_score: c.fused_score,
            fused_score: c.fused_score,
            final_rank: i + 1,
        })
        .collect();
    RerankOutput { candidates, scored_count: if skipped { bounded.len() } else { 0 }, skipped, delta: 0.0 }
}
