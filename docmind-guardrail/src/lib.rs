//! # docmind-guardrail
//!
//! Guardrails applied to generated answers before they leave the pipeline.
//!
//! A [`Guardrail`] inspects a piece of text and either passes it, rewrites
//! it (for example masking PII) or fails it with a [`Severity`]. Guardrails
//! are composed into a [`GuardrailSet`], which runs them in order and feeds
//! each rewrite into the next check.
//!
//! ```rust,ignore
//! use docmind_guardrail::{ContentFilter, GuardrailSet, PiiRedactor};
//!
//! let guardrails = GuardrailSet::new()
//!     .with(PiiRedactor::new())
//!     .with(ContentFilter::max_length(4000));
//! let outcome = guardrails.run("Contact jane@example.com").await?;
//! assert_eq!(outcome.text, "Contact [REDACTED_EMAIL]");
//! ```

mod content;
mod error;
mod pii;
mod set;

pub use content::ContentFilter;
pub use error::{GuardrailError, Result};
pub use pii::{PiiRedactor, PiiType};
pub use set::{GuardrailOutcome, GuardrailSet, Transformation};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How serious a guardrail failure is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Verdict of a single guardrail.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardrailResult {
    /// The text is acceptable as is.
    Pass,
    /// The text is acceptable after rewriting.
    Transform {
        /// Rewritten text.
        new_text: String,
        /// Human-readable description of the rewrite.
        reason: String,
        /// Number of individual edits made.
        changes: usize,
    },
    /// The text violates the guardrail.
    Fail {
        /// Why the text was rejected.
        reason: String,
        /// How serious the violation is.
        severity: Severity,
    },
}

impl GuardrailResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail { .. })
    }
}

/// A check over generated text.
#[async_trait]
pub trait Guardrail: Send + Sync {
    /// Stable name used in logs and outcomes.
    fn name(&self) -> &str;

    /// Inspect `text` and return a verdict.
    async fn validate(&self, text: &str) -> GuardrailResult;
}
