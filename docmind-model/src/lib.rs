//! # docmind-model
//!
//! LLM provider integrations for the DocuMind grounded-answer pipeline.
//!
//! ## Overview
//!
//! The pipeline talks to language models through the [`LlmProvider`] trait.
//! This crate ships:
//!
//! - [`MockLlm`] - scripted provider for tests and offline development
//! - [`OpenAiCompatibleClient`] - chat completions over any OpenAI-compatible
//!   API (OpenAI, Azure gateways, vLLM, Ollama). Requires the `openai` feature.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docmind_model::{GenerationRequest, LlmProvider, MockLlm};
//!
//! let llm = MockLlm::new("mock").with_response("CANNOT_ANSWER");
//! let text = llm.generate(&GenerationRequest::new("What is the total?")).await?;
//! ```

pub mod error;
pub mod llm;
pub mod mock;
#[cfg(feature = "openai")]
pub mod openai;

pub use error::{ModelError, Result};
pub use llm::{GenerationRequest, LlmProvider};
pub use mock::MockLlm;
#[cfg(feature = "openai")]
pub use openai::{OpenAiCompatibleClient, OpenAiConfig};
