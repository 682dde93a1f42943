use std::sync::Arc;

use tracing::{debug, warn};

use crate::{Guardrail, GuardrailError, GuardrailResult, Result, Severity};

/// A rewrite applied by one guardrail during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformation {
    pub guardrail: String,
    pub reason: String,
    pub changes: usize,
}

/// Result of running a [`GuardrailSet`] over some text.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardrailOutcome {
    /// Text after every rewrite.
    pub text: String,
    /// Rewrites in the order they were applied.
    pub transformations: Vec<Transformation>,
    /// Failures below the blocking severity.
    pub warnings: Vec<String>,
}

impl GuardrailOutcome {
    /// Total number of edits across all rewrites.
    pub fn total_changes(&self) -> usize {
        self.transformations.iter().map(|t| t.changes).sum()
    }
}

/// An ordered collection of guardrails.
///
/// Failures at or above the blocking severity (default [`Severity::High`])
/// abort the run with [`GuardrailError::Blocked`]; lower-severity failures
/// are collected as warnings.
#[derive(Clone)]
pub struct GuardrailSet {
    guardrails: Vec<Arc<dyn Guardrail>>,
    block_at: Severity,
}

impl Default for GuardrailSet {
    fn default() -> Self {
        Self::new()
    }
}

impl GuardrailSet {
    pub fn new() -> Self {
        Self { guardrails: Vec::new(), block_at: Severity::High }
    }

    /// Append a guardrail.
    pub fn with(mut self, guardrail: impl Guardrail + 'static) -> Self {
        self.guardrails.push(Arc::new(guardrail));
        self
    }

    /// Append a shared guardrail.
    pub fn with_arc(mut self, guardrail: Arc<dyn Guardrail>) -> Self {
        self.guardrails.push(guardrail);
        self
    }

    /// Change the minimum severity that blocks the text.
    pub fn block_at(mut self, severity: Severity) -> Self {
        self.block_at = severity;
        self
    }

    pub fn len(&self) -> usize {
        self.guardrails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guardrails.is_empty()
    }

    /// Run every guardrail in order over `text`.
    pub async fn run(&self, text: &str) -> Result<GuardrailOutcome> {
        let mut outcome = GuardrailOutcome {
            text: text.to_string(),
            transformations: Vec::new(),
            warnings: Vec::new(),
        };

        for guardrail in &self.guardrails {
            match guardrail.validate(&outcome.text).await {
                GuardrailResult::Pass => {}
                GuardrailResult::Transform { new_text, reason, changes } => {
                    debug!(guardrail = guardrail.name(), changes, "guardrail rewrote text");
                    outcome.text = new_text;
                    outcome.transformations.push(Transformation {
                        guardrail: guardrail.name().to_string(),
                        reason,
                        changes,
                    });
                }
                GuardrailResult::Fail { reason, severity } if severity >= self.block_at => {
                    warn!(guardrail = guardrail.name(), ?severity, %reason, "guardrail blocked text");
                    return Err(GuardrailError::Blocked {
                        name: guardrail.name().to_string(),
                        reason,
                        severity,
                    });
                }
                GuardrailResult::Fail { reason, severity } => {
                    debug!(guardrail = guardrail.name(), ?severity, %reason, "guardrail warning");
                    outcome.warnings.push(format!("{}: {reason}", guardrail.name()));
                }
            }
        }

        Ok(outcome)
    }
}

impl std::fmt::Debug for GuardrailSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.guardrails.iter().map(|g| g.name()).collect();
        f.debug_struct("GuardrailSet").field("guardrails", &names).field("block_at", &self.block_at).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContentFilter, PiiRedactor};

    #[tokio::test]
    async fn empty_set_passes_text_through() {
        let outcome = GuardrailSet::new().run("hello").await.unwrap();
        assert_eq!(outcome.text, "hello");
        assert_eq!(outcome.total_changes(), 0);
    }

    #[tokio::test]
    async fn rewrites_feed_later_guardrails() {
        let set = GuardrailSet::new()
            .with(PiiRedactor::new())
            .with(ContentFilter::blocked_terms(["bob@corp.io"]));
        let outcome = set.run("write to bob@corp.io").await.unwrap();
        assert_eq!(outcome.text, "write to [REDACTED_EMAIL]");
        assert_eq!(outcome.total_changes(), 1);
    }

    #[tokio::test]
    async fn high_severity_failure_blocks() {
        let set = GuardrailSet::new().with(ContentFilter::blocked_terms(["secret"]));
        let err = set.run("the secret plan").await.unwrap_err();
        assert!(matches!(err, GuardrailError::Blocked { .. }));
    }

    #[tokio::test]
    async fn low_severity_failure_is_a_warning() {
        let set = GuardrailSet::new().with(ContentFilter::max_length(3));
        let outcome = set.run("four").await.unwrap();
        assert_eq!(outcome.text, "four");
        assert_eq!(outcome.warnings.len(), 1);
    }
}
