//! The provider trait every language model backend implements.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single non-streaming generation request.
///
/// `context` carries the retrieved source material separately from the
/// user-facing `prompt` so that providers with a dedicated context slot
/// (system prompt, document attachments) can place it appropriately.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    /// System-level instructions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Source material the answer must be derived from.
    pub context: String,
    /// The task prompt, usually containing the question.
    pub prompt: String,
    /// Sampling temperature override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum number of output tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl GenerationRequest {
    /// Create a request with only a prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), ..Self::default() }
    }

    /// Set the system instructions.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the source context block.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the maximum number of output tokens.
    pub fn with_max_output_tokens(mut self, max_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_tokens);
        self
    }

    /// Render the request as a single user message: context first, then prompt.
    pub fn user_message(&self) -> String {
        if self.context.is_empty() {
            self.prompt.clone()
        } else {
            format!("{}\n\n{}", self.context, self.prompt)
        }
    }
}

/// A language model that turns a [`GenerationRequest`] into text.
///
/// Implementations must be safe to share across concurrently running
/// queries; the pipeline holds them behind `Arc<dyn LlmProvider>`.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier reported in answer metadata.
    fn name(&self) -> &str;

    /// Generate a complete response for the request.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}
