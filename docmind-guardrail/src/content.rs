use async_trait::async_trait;

use crate::{Guardrail, GuardrailResult, Severity};

const HARMFUL_TERMS: &[&str] = &[
    "how to make a bomb",
    "build a weapon",
    "synthesize nerve agent",
    "self-harm instructions",
    "kill yourself",
];

#[derive(Debug, Clone)]
enum Rule {
    MaxLength(usize),
    BlockedTerms(Vec<String>),
}

/// Rejects text that is too long or contains blocked phrases.
#[derive(Debug, Clone)]
pub struct ContentFilter {
    name: String,
    rule: Rule,
    severity: Severity,
}

impl ContentFilter {
    /// Fail text longer than `max_chars` characters.
    pub fn max_length(max_chars: usize) -> Self {
        Self {
            name: "max_length".to_string(),
            rule: Rule::MaxLength(max_chars),
            severity: Severity::Medium,
        }
    }

    /// Fail text containing any of `terms` (case-insensitive).
    pub fn blocked_terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: "blocked_terms".to_string(),
            rule: Rule::BlockedTerms(terms.into_iter().map(|t| t.into().to_lowercase()).collect()),
            severity: Severity::High,
        }
    }

    /// Fail text containing a built-in list of harmful phrases.
    pub fn harmful_content() -> Self {
        Self::blocked_terms(HARMFUL_TERMS.iter().copied())
            .with_name("harmful_content")
            .with_severity(Severity::Critical)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

#[async_trait]
impl Guardrail for ContentFilter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(&self, text: &str) -> GuardrailResult {
        match &self.rule {
            Rule::MaxLength(max) => {
                let len = text.chars().count();
                if len > *max {
                    return GuardrailResult::Fail {
                        reason: format!("text length {len} exceeds {max}"),
                        severity: self.severity,
                    };
                }
            }
            Rule::BlockedTerms(terms) => {
                let lower = text.to_lowercase();
                if let Some(term) = terms.iter().find(|t| lower.contains(t.as_str())) {
                    return GuardrailResult::Fail {
                        reason: format!("contains blocked term '{term}'"),
                        severity: self.severity,
                    };
                }
            }
        }
        GuardrailResult::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn max_length_fails_long_text() {
        let filter = ContentFilter::max_length(5);
        assert!(filter.validate("short").await.is_pass());
        assert!(filter.validate("too long").await.is_fail());
    }

    #[tokio::test]
    async fn blocked_terms_are_case_insensitive() {
        let filter = ContentFilter::blocked_terms(["Project Falcon"]);
        let result = filter.validate("the project falcon budget").await;
        assert!(matches!(result, GuardrailResult::Fail { severity: Severity::High, .. }));
    }

    #[tokio::test]
    async fn harmful_content_is_critical() {
        let filter = ContentFilter::harmful_content();
        assert_eq!(filter.name(), "harmful_content");
        let result = filter.validate("Here is how to make a bomb").await;
        assert!(matches!(result, GuardrailResult::Fail { severity: Severity::Critical, .. }));
    }
}
