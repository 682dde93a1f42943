//! An offline [`LlmProvider`] that answers by quoting the sources.

use std::collections::HashSet;

use async_trait::async_trait;
use docmind_model::{GenerationRequest, LlmProvider};
use serde_json::json;

use crate::generation::CANNOT_ANSWER;
use crate::text;

/// Minimum share of query terms a sentence must contain to be quoted.
const MIN_OVERLAP: f64 = 0.34;

/// Answers from the sources in a grounded-generation request by picking the
/// sentences that share the most terms with the question.
///
/// It reads the `[chunk_id]` blocks of the request context and the
/// `Question:` line of the prompt, and replies in the grounded JSON answer
/// format with each quoted sentence cited to its chunk. When no sentence
/// mentions enough of the question it replies `CANNOT_ANSWER`. Useful for
/// running the pipeline without a model endpoint.
#[derive(Debug, Clone)]
pub struct ExtractiveLlm {
    name: String,
    max_sentences: usize,
}

impl Default for ExtractiveLlm {
    fn default() -> Self {
        Self { name: "extractive".to_string(), max_sentences: 2 }
    }
}

impl ExtractiveLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_sentences(mut self, max_sentences: usize) -> Self {
        self.max_sentences = max_sentences.max(1);
        self
    }

    fn answer(&self, request: &GenerationRequest) -> String {
        let question = request
            .prompt
            .lines()
            .find_map(|line| line.strip_prefix("Question:"))
            .unwrap_or(&request.prompt);
        let query_terms = text::term_set(question);
        if query_terms.is_empty() {
            return CANNOT_ANSWER.to_string();
        }

        let blocks = source_blocks(&request.context);
        let mut picks: Vec<(f64, usize, &str, &str)> = Vec::new();
        for (chunk_id, body) in &blocks {
            for sentence in text::sentences(body) {
                let terms: HashSet<String> = text::term_set(sentence);
                let overlap = query_terms.intersection(&terms).count() as f64 / query_terms.len() as f64;
                if overlap >= MIN_OVERLAP {
                    picks.push((overlap, picks.len(), *chunk_id, sentence));
                }
            }
        }
        if picks.is_empty() {
            return CANNOT_ANSWER.to_string();
        }

        picks.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        picks.truncate(self.max_sentences);
        picks.sort_by_key(|p| p.1);

        let answer = picks.iter().map(|p| p.3).collect::<Vec<_>>().join(" ");
        let claims: Vec<_> = picks
            .iter()
            .map(|(_, _, chunk_id, sentence)| {
                json!({"text": sentence, "citations": [{"chunk_id": chunk_id, "quote": sentence}]})
            })
            .collect();
        json!({"answer": answer, "claims": claims}).to_string()
    }
}

/// `(chunk_id, body)` pairs from `[chunk_id]` headed blocks.
fn source_blocks(context: &str) -> Vec<(&str, String)> {
    let mut blocks: Vec<(&str, String)> = Vec::new();
    for line in context.lines() {
        let header = line
            .trim()
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .filter(|id| !id.is_empty() && !id.contains(char::is_whitespace));
        if let Some(chunk_id) = header {
            blocks.push((chunk_id, String::new()));
        } else if let Some((_, body)) = blocks.last_mut() {
            body.push_str(line);
            body.push('\n');
        }
    }
    blocks
}

#[async_trait]
impl LlmProvider for ExtractiveLlm {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &GenerationRequest) -> docmind_model::Result<String> {
        Ok(self.answer(request))
    }
}
