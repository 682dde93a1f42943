//! Error types for the `docmind-model` crate.

use thiserror::Error;

/// Errors raised by LLM providers.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The request could not be sent or the connection failed.
    #[error("Request to {provider} failed: {message}")]
    Request {
        /// The provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The provider answered with a non-success status.
    #[error("{provider} returned {status}: {message}")]
    Api {
        /// The provider that produced the error.
        provider: String,
        /// HTTP status code.
        status: u16,
        /// Error detail extracted from the response body.
        message: String,
    },

    /// The provider response could not be interpreted.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Invalid provider configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The provider is deliberately unavailable (mock failure mode).
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for [`ModelError`].
pub type Result<T> = std::result::Result<T, ModelError>;
