use thiserror::Error;

use crate::Severity;

/// Errors raised when running guardrails.
#[derive(Debug, Error)]
pub enum GuardrailError {
    /// A guardrail rejected the text at or above the blocking severity.
    #[error("Guardrail '{name}' blocked the text ({severity:?}): {reason}")]
    Blocked {
        /// Name of the guardrail that failed.
        name: String,
        /// Failure reason reported by the guardrail.
        reason: String,
        /// Severity of the failure.
        severity: Severity,
    },

    /// A detection pattern could not be compiled.
    #[error("Invalid pattern: {0}")]
    Pattern(String),
}

pub type Result<T> = std::result::Result<T, GuardrailError>;
