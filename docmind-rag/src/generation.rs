//! Grounded answer generation.
//!
//! The generator shows the model a bounded context window of reranked
//! chunks and requires a JSON answer whose every claim names the chunk ids
//! supporting it, or the literal `CANNOT_ANSWER`. Output is a provisional
//! [`Draft`]; nothing here verifies the citations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use docmind_model::{GenerationRequest, LlmProvider};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::document::{Citation, RerankedCandidate, Span};
use crate::error::{RagError, Result};
use crate::text;

/// The literal a model returns when the sources are insufficient.
pub const CANNOT_ANSWER: &str = "CANNOT_ANSWER";

/// Answer text returned when the sources are insufficient.
pub const CANNOT_ANSWER_TEXT: &str =
    "I don't have enough information to answer this question from the available sources.";

const SYSTEM_PROMPT: &str = r#"You answer questions using only the numbered sources provided.
Every statement in your answer must be derivable from the sources. Do not use outside knowledge.

Respond with a single JSON object and nothing else:
{
  "answer": "<the complete answer>",
  "claims": [
    {
      "text": "<one factual statement from the answer>",
      "citations": [{"chunk_id": "<id of a supporting source>", "quote": "<exact supporting text copied from that source>"}]
    }
  ]
}

Cite only chunk ids that appear in the sources. If the sources do not contain enough information to answer, respond with exactly CANNOT_ANSWER."#;

/// The chunks shown to the model and their rendered text.
#[derive(Debug, Clone, Default)]
pub struct ContextWindow {
    /// Shown chunks in `final_rank` order.
    pub chunks: Vec<RerankedCandidate>,
    pub text: String,
    /// Reranked chunks left out to respect the budget.
    pub truncated: usize,
}

impl ContextWindow {
    /// Fit the highest-ranked chunks into `char_budget` characters.
    ///
    /// Chunks are taken in rank order until the next one would exceed the
    /// budget. If even the top chunk does not fit, a truncated copy of it is
    /// shown so the model always sees something.
    pub fn build(candidates: &[RerankedCandidate], char_budget: usize) -> Self {
        let mut window = ContextWindow::default();
        let mut used = 0;
        let mut blocks = Vec::new();

        for (i, candidate) in candidates.iter().enumerate() {
            let block = render_block(candidate.chunk_id(), &candidate.chunk.text);
            let len = block.chars().count() + if blocks.is_empty() { 0 } else { 2 };
            if used + len > char_budget {
                if blocks.is_empty() {
                    let header = render_block(candidate.chunk_id(), "").chars().count();
                    let room = char_budget.saturating_sub(header);
                    blocks.push(render_block(candidate.chunk_id(), text::truncate_chars(&candidate.chunk.text, room)));
                    window.chunks.push(candidate.clone());
                    window.truncated = candidates.len() - 1;
                } else {
                    window.truncated = candidates.len() - i;
                }
                break;
            }
            used += len;
            blocks.push(block);
            window.chunks.push(candidate.clone());
        }

        window.text = blocks.join("\n\n");
        window
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.chunks.iter().any(|c| c.chunk_id() == chunk_id)
    }
}

fn render_block(chunk_id: &str, body: &str) -> String {
    format!("[{chunk_id}]\n{body}")
}

/// One statement of a draft answer with its proposed support.
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    pub text: String,
    pub citations: Vec<Citation>,
}

/// Unverified generator output.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub answer_text: String,
    pub claims: Vec<Claim>,
    /// The model declined, or its output could not be used.
    pub cannot_answer: bool,
}

impl Draft {
    pub fn cannot_answer() -> Self {
        Self { answer_text: CANNOT_ANSWER_TEXT.to_string(), claims: Vec::new(), cannot_answer: true }
    }

    pub fn citation_count(&self) -> usize {
        self.claims.iter().map(|c| c.citations.len()).sum()
    }
}

/// A draft plus the context it was generated from.
#[derive(Debug, Clone)]
pub struct Generation {
    pub draft: Draft,
    pub context: ContextWindow,
    pub model: String,
}

#[derive(Debug, Deserialize)]
struct RawAnswer {
    answer: String,
    #[serde(default)]
    claims: Vec<RawClaim>,
}

#[derive(Debug, Deserialize)]
struct RawClaim {
    text: String,
    #[serde(default)]
    citations: Vec<RawCitation>,
}

#[derive(Debug, Deserialize)]
struct RawCitation {
    chunk_id: String,
    #[serde(default)]
    quote: Option<String>,
}

/// Produces citation-annotated drafts from reranked chunks.
pub struct GroundedGenerator {
    llm: Arc<dyn LlmProvider>,
    context_char_budget: usize,
    timeout: Duration,
}

impl GroundedGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, context_char_budget: usize, timeout: Duration) -> Self {
        Self { llm, context_char_budget, timeout }
    }

    pub fn model(&self) -> &str {
        self.llm.name()
    }

    /// Generate a draft answer for `query` from `candidates`.
    ///
    /// With no candidates the model is not called and a cannot-answer draft
    /// is returned.
    ///
    /// # Errors
    ///
    /// [`RagError::GenerationTimeout`] when the model exceeds the timeout,
    /// [`RagError::Generation`] when the provider fails.
    pub async fn generate(&self, query: &str, candidates: &[RerankedCandidate]) -> Result<Generation> {
        let model = self.llm.name().to_string();
        let context = ContextWindow::build(candidates, self.context_char_budget);
        if context.chunks.is_empty() {
            debug!(stage = "generation", "no context, skipping model call");
            return Ok(Generation { draft: Draft::cannot_answer(), context, model });
        }

        let request = GenerationRequest::new(format!(
            "Question: {query}\n\nAnswer the question using only the sources above, in the JSON format described."
        ))
        .with_system(SYSTEM_PROMPT)
        .with_context(format!("Sources:\n\n{}", context.text))
        .with_temperature(0.0);

        let response = match tokio::time::timeout(self.timeout, self.llm.generate(&request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(RagError::Generation { model, message: e.to_string() }),
            Err(_) => {
                return Err(RagError::GenerationTimeout { timeout_ms: self.timeout.as_millis() as u64 });
            }
        };

        let draft = parse_draft(&response, &context);
        debug!(
            stage = "generation",
            model = %model,
            context_chunks = context.chunks.len(),
            truncated = context.truncated,
            claims = draft.claims.len(),
            cannot_answer = draft.cannot_answer,
            "generation completed"
        );
        Ok(Generation { draft, context, model })
    }
}

/// Interpret a model response against the chunks it was shown.
///
/// Unparseable output is treated as a refusal. Citations of chunks outside
/// the window are kept with an empty span so the guard can reject them.
pub fn parse_draft(response: &str, context: &ContextWindow) -> Draft {
    let payload = text::strip_code_fence(response);
    if payload.starts_with(CANNOT_ANSWER) {
        return Draft::cannot_answer();
    }
    let json = match (payload.find('{'), payload.rfind('}')) {
        (Some(start), Some(end)) if start < end => &payload[start..=end],
        _ => payload,
    };
    let raw: RawAnswer = match serde_json::from_str(json) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "model output is not a valid answer, treating as cannot-answer");
            return Draft::cannot_answer();
        }
    };
    let answer_text = raw.answer.trim();
    if answer_text.is_empty() || answer_text == CANNOT_ANSWER {
        return Draft::cannot_answer();
    }

    let shown: HashMap<&str, &RerankedCandidate> =
        context.chunks.iter().map(|c| (c.chunk_id(), c)).collect();

    let claims = raw
        .claims
        .into_iter()
        .map(|claim| Claim {
            text: claim.text,
            citations: claim
                .citations
                .into_iter()
                .map(|c| match shown.get(c.chunk_id.as_str()) {
                    Some(candidate) => Citation {
                        document_id: candidate.chunk.document_id.clone(),
                        span: locate(&candidate.chunk.text, c.quote.as_deref()),
                        chunk_id: c.chunk_id,
                        relevance_score: 0.0,
                    },
                    None => Citation {
                        chunk_id: c.chunk_id,
                        document_id: String::new(),
                        span: Span { start: 0, end: 0, text: String::new() },
                        relevance_score: 0.0,
                    },
                })
                .collect(),
        })
        .collect();

    Draft { answer_text: answer_text.to_string(), claims, cannot_answer: false }
}

/// Find `quote` in `chunk_text`: exact match, then ASCII case-insensitive.
/// A missing or unlocatable quote spans the whole chunk.
pub fn locate(chunk_text: &str, quote: Option<&str>) -> Span {
    let whole = Span { start: 0, end: chunk_text.len(), text: chunk_text.to_string() };
    let Some(quote) = quote.map(str::trim).filter(|q| !q.is_empty()) else {
        return whole;
    };
    let start = chunk_text
        .find(quote)
        .or_else(|| chunk_text.to_ascii_lowercase().find(&quote.to_ascii_lowercase()));
    match start {
        Some(start) => {
            let end = start + quote.len();
            Span { start, end, text: chunk_text[start..end].to_string() }
        }
        None => whole,
    }
}

#[cfg(test)]
mod tests {
    use docmind_model::MockLlm;

    use super::*;
    use crate::document::Chunk;

    fn reranked(items: &[(&str, &str)]) -> Vec<RerankedCandidate> {
        items
            .iter()
            .enumerate()
            .map(|(i, (id, text))| RerankedCandidate {
                chunk: Arc::new(Chunk::new(*id, format!("doc-{id}"), *text, 0)),
                rerank_score: 1.0,
                fused_score: 1.0,
                final_rank: i + 1,
            })
            .collect()
    }

    #[test]
    fn context_drops_lowest_ranked_first() {
        let candidates = reranked(&[("a", "aaaa"), ("b", "bbbb"), ("c", "cccc")]);
        // Each block is "[x]\nxxxx" = 8 chars, plus 2 for the separator.
        let window = ContextWindow::build(&candidates, 18);
        assert_eq!(window.chunks.len(), 2);
        assert_eq!(window.truncated, 1);
        assert!(window.contains("b"));
        assert!(!window.contains("c"));
    }

    #[test]
    fn oversized_top_chunk_is_truncated_not_dropped() {
        let candidates = reranked(&[("a", &"x".repeat(100)), ("b", "short")]);
        let window = ContextWindow::build(&candidates, 20);
        assert_eq!(window.chunks.len(), 1);
        assert_eq!(window.truncated, 1);
        assert!(window.text.chars().count() <= 20);
    }

    #[test]
    fn quotes_are_located_exactly_then_case_insensitively() {
        let text = "Invoice 42 totals $1,200. Paid by ACME.";
        let exact = locate(text, Some("totals $1,200"));
        assert_eq!(&text[exact.start..exact.end], "totals $1,200");

        let folded = locate(text, Some("paid by acme"));
        assert_eq!(folded.text, "Paid by ACME");

        let missing = locate(text, Some("not in the chunk"));
        assert_eq!((missing.start, missing.end), (0, text.len()));
    }

    #[test]
    fn parses_fenced_json_and_marks_unknown_chunks() {
        let context = ContextWindow::build(&reranked(&[("a", "The total is 1200.")]), 1000);
        let response = r#"```json
{"answer": "The total is 1200.", "claims": [{"text": "The total is 1200.", "citations": [{"chunk_id": "a", "quote": "total is 1200"}, {"chunk_id": "X"}]}]}
```"#;
        let draft = parse_draft(response, &context);
        assert!(!draft.cannot_answer);
        let citations = &draft.claims[0].citations;
        assert_eq!(citations[0].document_id, "doc-a");
        assert_eq!(citations[0].span.text, "total is 1200");
        assert_eq!(citations[1].chunk_id, "X");
        assert!(citations[1].document_id.is_empty());
    }

    #[test]
    fn refusal_and_garbage_become_cannot_answer() {
        let context = ContextWindow::build(&reranked(&[("a", "text")]), 1000);
        assert!(parse_draft("CANNOT_ANSWER", &context).cannot_answer);
        assert!(parse_draft("Sure! The answer is 7.", &context).cannot_answer);
        assert!(parse_draft(r#"{"answer": "  "}"#, &context).cannot_answer);
    }

    #[tokio::test]
    async fn empty_context_skips_the_model() {
        let llm = Arc::new(MockLlm::new("mock").with_response("unused"));
        let generator = GroundedGenerator::new(llm.clone(), 1000, Duration::from_secs(1));
        let generation = generator.generate("q", &[]).await.unwrap();
        assert!(generation.draft.cannot_answer);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let llm = Arc::new(MockLlm::new("slow").with_response("{}").with_delay(Duration::from_millis(200)));
        let generator = GroundedGenerator::new(llm, 1000, Duration::from_millis(20));
        let err = generator.generate("q", &reranked(&[("a", "text")])).await.unwrap_err();
        assert!(matches!(err, RagError::GenerationTimeout { timeout_ms: 20 }));
    }

    #[tokio::test]
    async fn provider_failure_is_a_generation_error() {
        let llm = Arc::new(MockLlm::new("broken").failing("quota exceeded"));
        let generator = GroundedGenerator::new(llm, 1000, Duration::from_secs(1));
        let err = generator.generate("q", &reranked(&[("a", "text")])).await.unwrap_err();
        assert!(matches!(err, RagError::Generation { ref model, .. } if model == "broken"));
    }
}
