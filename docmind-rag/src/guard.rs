//! Post-generation verification: citation resolution, entailment and
//! redaction.

use std::collections::HashSet;
use std::sync::LazyLock;

use docmind_guardrail::{GuardrailError, GuardrailSet, PiiRedactor};
use regex::Regex;
use tracing::{debug, warn};

use crate::document::{AnswerStatus, Citation, RerankedCandidate};
use crate::error::{RagError, Result};
use crate::generation::Draft;
use crate::text;

static REDACTION_PLACEHOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[REDACTED_[A-Z_]+\]").ok());

/// How well a claim is supported by one chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entailment {
    /// Fraction of the claim's distinct content terms found in the chunk.
    pub coverage: f64,
    /// Every number in the claim also appears in the chunk.
    pub numbers_match: bool,
}

impl Entailment {
    /// Lexical entailment of `claim` by `source`.
    ///
    /// A claim with no content terms is trivially covered.
    pub fn check(claim: &str, source: &str) -> Self {
        let claim_terms = text::term_set(claim);
        let coverage = if claim_terms.is_empty() {
            1.0
        } else {
            let source_terms = text::term_set(source);
            claim_terms.intersection(&source_terms).count() as f64 / claim_terms.len() as f64
        };

        let source_numbers = text::extract_numbers(source);
        let numbers_match = text::extract_numbers(claim)
            .iter()
            .all(|n| source_numbers.iter().any(|s| (s - n).abs() < 1e-9));

        Self { coverage, numbers_match }
    }

    pub fn is_supported(&self, threshold: f64) -> bool {
        self.numbers_match && self.coverage >= threshold
    }
}

/// A verified answer ready to leave the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardReport {
    pub answer_text: String,
    pub citations: Vec<Citation>,
    pub status: AnswerStatus,
    pub confidence: f64,
    pub citations_stripped: usize,
    pub claims_flagged: usize,
    /// Answer sentences no surviving citation or supported claim entails.
    pub unsupported_sentences: usize,
    pub redactions: usize,
}

/// Checks a [`Draft`] against the chunks the generator was shown.
///
/// Citations of chunks outside the shown set are dropped, citations whose
/// span does not entail the claim are stripped and the claim flagged, and
/// the answer text is passed through the guardrail set. Every sentence of
/// the answer must be entailed by a surviving citation span or a supported
/// claim; otherwise the answer is `Unverified`. Review only fails when
/// nothing of the answer survives redaction.
#[derive(Debug, Clone)]
pub struct PostGenerationGuard {
    guardrails: GuardrailSet,
    entailment_threshold: f64,
    unverified_ceiling: f64,
}

impl Default for PostGenerationGuard {
    fn default() -> Self {
        Self::new(GuardrailSet::new().with(PiiRedactor::new()), 0.5, 0.3)
    }
}

impl PostGenerationGuard {
    pub fn new(guardrails: GuardrailSet, entailment_threshold: f64, unverified_ceiling: f64) -> Self {
        Self { guardrails, entailment_threshold, unverified_ceiling }
    }

    /// # Errors
    ///
    /// [`RagError::EmptyAnswer`] when a guardrail blocks the answer or no
    /// alphanumeric content remains after redaction.
    pub async fn review(&self, draft: &Draft, shown: &[RerankedCandidate]) -> Result<GuardReport> {
        if draft.cannot_answer {
            return Ok(GuardReport {
                answer_text: draft.answer_text.clone(),
                citations: Vec::new(),
                status: AnswerStatus::CannotAnswer,
                confidence: 0.0,
                citations_stripped: 0,
                claims_flagged: 0,
                unsupported_sentences: 0,
                redactions: 0,
            });
        }

        let shown: HashSet<&str> = shown.iter().map(RerankedCandidate::chunk_id).collect();
        let mut citations: Vec<Citation> = Vec::new();
        let mut seen: HashSet<(String, usize, usize)> = HashSet::new();
        let mut stripped = 0;
        let mut flagged = 0;
        let mut supported_claims: Vec<&str> = Vec::new();

        for claim in &draft.claims {
            let mut supported = false;
            for citation in &claim.citations {
                if !shown.contains(citation.chunk_id.as_str()) {
                    debug!(chunk_id = %citation.chunk_id, "dropping citation of a chunk that was not shown");
                    stripped += 1;
                    continue;
                }
                let entailment = Entailment::check(&claim.text, &citation.span.text);
                if !entailment.is_supported(self.entailment_threshold) {
                    debug!(
                        chunk_id = %citation.chunk_id,
                        coverage = entailment.coverage,
                        numbers_match = entailment.numbers_match,
                        "stripping citation that does not entail its claim"
                    );
                    stripped += 1;
                    continue;
                }
                supported = true;
                let key = (citation.chunk_id.clone(), citation.span.start, citation.span.end);
                if seen.insert(key) {
                    citations.push(Citation { relevance_score: entailment.coverage, ..citation.clone() });
                }
            }
            if supported {
                supported_claims.push(&claim.text);
            } else {
                flagged += 1;
            }
        }

        let unsupported_sentences = text::sentences(&draft.answer_text)
            .into_iter()
            .filter(|sentence| !self.is_grounded(sentence, &citations, &supported_claims))
            .count();

        let outcome = self.guardrails.run(&draft.answer_text).await.map_err(|e| blocked(&e))?;
        let mut redactions = outcome.total_changes();
        if !has_content(&outcome.text) {
            warn!(redactions, "redaction removed the entire answer");
            return Err(RagError::EmptyAnswer("nothing remained after redaction".to_string()));
        }

        let mut redacted_citations = Vec::with_capacity(citations.len());
        for mut citation in citations {
            match self.guardrails.run(&citation.span.text).await {
                Ok(span) => {
                    redactions += span.total_changes();
                    citation.span.text = span.text;
                    redacted_citations.push(citation);
                }
                Err(e) => {
                    warn!(chunk_id = %citation.chunk_id, error = %e, "dropping citation blocked by guardrails");
                    stripped += 1;
                }
            }
        }

        let (status, confidence) = if redacted_citations.is_empty() {
            (AnswerStatus::Unverified, UNCITED_CONFIDENCE.min(self.unverified_ceiling))
        } else {
            let supported_ratio = supported_claims.len() as f64 / draft.claims.len().max(1) as f64;
            let mean_relevance = redacted_citations.iter().map(|c| c.relevance_score).sum::<f64>()
                / redacted_citations.len() as f64;
            let base = base_confidence(redacted_citations.len(), outcome.text.chars().count());
            let confidence = (base * supported_ratio * (0.5 + 0.5 * mean_relevance)).clamp(0.0, 1.0);
            if unsupported_sentences > 0 {
                warn!(unsupported_sentences, "answer states more than its citations support");
                (AnswerStatus::Unverified, confidence.min(self.unverified_ceiling))
            } else {
                (AnswerStatus::Grounded, confidence)
            }
        };

        debug!(
            stage = "guard",
            kept = redacted_citations.len(),
            stripped,
            flagged,
            unsupported_sentences,
            redactions,
            ?status,
            "guard completed"
        );

        Ok(GuardReport {
            answer_text: outcome.text,
            citations: redacted_citations,
            status,
            confidence,
            citations_stripped: stripped,
            claims_flagged: flagged,
            unsupported_sentences,
            redactions,
        })
    }
}

impl PostGenerationGuard {
    /// Whether a surviving citation span or supported claim entails `sentence`.
    fn is_grounded(&self, sentence: &str, citations: &[Citation], claims: &[&str]) -> bool {
        citations
            .iter()
            .map(|c| c.span.text.as_str())
            .chain(claims.iter().copied())
            .any(|source| Entailment::check(sentence, source).is_supported(self.entailment_threshold))
    }
}

/// Confidence of an answer that cites nothing.
const UNCITED_CONFIDENCE: f64 = 0.3;

/// Citation count and answer length, before verification adjustments.
fn base_confidence(citations: usize, answer_chars: usize) -> f64 {
    (0.2 * citations as f64).min(0.6) + (answer_chars as f64 / 1000.0).min(0.2) + 0.2
}

fn blocked(error: &GuardrailError) -> RagError {
    warn!(error = %error, "guardrails blocked the answer");
    RagError::EmptyAnswer(error.to_string())
}

/// Whether anything alphanumeric is left once placeholders are removed.
fn has_content(text: &str) -> bool {
    let remaining = match REDACTION_PLACEHOLDER.as_ref() {
        Some(re) => re.replace_all(text, ""),
        None => text.into(),
    };
    remaining.chars().any(char::is_alphanumeric)
}
