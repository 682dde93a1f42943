//! TOML settings for the `docmind` binary.
//!
//! ```toml
//! [pipeline]
//! retrieval_method = "hybrid"
//! reranker_type = "heuristic"
//! max_results = 4
//!
//! [pipeline.fusion_method]
//! method = "reciprocal_rank"
//! k = 60.0
//!
//! [limits]
//! context_char_budget = 8000
//! generation_timeout_ms = 20000
//!
//! [provider]
//! kind = "openai"
//! model = "gpt-4o-mini"
//! ```

use std::path::Path;

use anyhow::Context;
use docmind_rag::{PipelineConfig, PipelineLimits};
use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pipeline: PipelineConfig,
    pub limits: PipelineLimits,
    pub chunking: ChunkingSettings,
    pub provider: ProviderSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { chunk_size: 1000, chunk_overlap: 200 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Offline sentence extraction.
    #[default]
    Extractive,
    /// OpenAI-compatible chat and embedding endpoints.
    Openai,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// Dimension of the offline hashing embedder.
    pub embedding_dimensions: usize,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self { kind: ProviderKind::Extractive, model: None, base_url: None, embedding_dimensions: 256 }
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid settings file {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let settings: Settings = toml::from_str(raw)?;
        settings.limits.validate()?;
        settings.limits.check_config(&settings.pipeline)?;
        Ok(settings)
    }
}
