//! Error types for the `docmind-rag` crate.

use docmind_model::ModelError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in pipeline operations.
///
/// `InvalidQuery`, `RetrievalUnavailable`, `GenerationTimeout` and
/// `EmptyAnswer` are the fatal per-query outcomes. Degraded conditions such
/// as a single failed retrieval source or a skipped reranker never surface
/// here; they are flags on [`RetrievalStats`](crate::RetrievalStats).
#[derive(Debug, Error)]
pub enum RagError {
    /// The query was rejected by the planner.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Every configured retrieval source failed.
    #[error("Retrieval unavailable: {}", failures.join("; "))]
    RetrievalUnavailable {
        /// One entry per failed source.
        failures: Vec<String>,
    },

    /// The generator did not answer within its time budget.
    #[error("Generation timed out after {timeout_ms} ms")]
    GenerationTimeout {
        /// The configured generation timeout.
        timeout_ms: u64,
    },

    /// Nothing of the answer survived the post-generation guard.
    #[error("Empty answer: {0}")]
    EmptyAnswer(String),

    /// The LLM provider failed during generation.
    #[error("Generation error ({model}): {message}")]
    Generation {
        /// The model that produced the error.
        model: String,
        /// A description of the failure.
        message: String,
    },

    /// The query was aborted by the caller.
    #[error("Query cancelled")]
    Cancelled,

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in a lexical or vector index backend.
    #[error("Index error ({backend}): {message}")]
    Index {
        /// The index backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the chunk store.
    #[error("Chunk store error ({backend}): {message}")]
    Store {
        /// The store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during candidate reranking.
    #[error("Reranker error ({reranker}): {message}")]
    Reranker {
        /// The reranker that produced the error.
        reranker: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during document chunking.
    #[error("Chunking error: {0}")]
    Chunking(String),

    /// An error propagated from `docmind-model`.
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl RagError {
    /// Classify the error for callers and logs.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::InvalidQuery(_) => ErrorKind::InvalidQuery,
            RagError::RetrievalUnavailable { .. } => ErrorKind::RetrievalUnavailable,
            RagError::GenerationTimeout { .. } => ErrorKind::GenerationTimeout,
            RagError::EmptyAnswer(_) => ErrorKind::EmptyAnswer,
            RagError::Generation { .. } | RagError::Model(_) => ErrorKind::Generation,
            RagError::Cancelled => ErrorKind::Cancelled,
            RagError::Config(_) => ErrorKind::Config,
            RagError::Embedding { .. }
            | RagError::Index { .. }
            | RagError::Store { .. }
            | RagError::Reranker { .. }
            | RagError::Chunking(_) => ErrorKind::Collaborator,
        }
    }

    /// Whether retrying the whole query may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RetrievalUnavailable | ErrorKind::GenerationTimeout | ErrorKind::Generation
        )
    }
}

/// Coarse classification of a [`RagError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidQuery,
    RetrievalUnavailable,
    GenerationTimeout,
    EmptyAnswer,
    Generation,
    Cancelled,
    Config,
    Collaborator,
}

/// Structured failure returned to callers in place of an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&RagError> for QueryFailure {
    fn from(error: &RagError) -> Self {
        Self { kind: error.kind(), message: error.to_string() }
    }
}

/// A convenience result type for pipeline operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_failure_carries_kind_and_message() {
        let err = RagError::RetrievalUnavailable {
            failures: vec!["lexical: down".into(), "dense: timeout".into()],
        };
        let failure = QueryFailure::from(&err);
        assert_eq!(failure.kind, ErrorKind::RetrievalUnavailable);
        assert_eq!(failure.message, "Retrieval unavailable: lexical: down; dense: timeout");
        assert!(err.is_retryable());
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::EmptyAnswer).unwrap();
        assert_eq!(json, "\"empty_answer\"");
    }

    #[test]
    fn invalid_query_is_not_retryable() {
        assert!(!RagError::InvalidQuery("empty".into()).is_retryable());
    }
}
