//! Configuration for the answer pipeline.
//!
//! [`PipelineConfig`] selects strategies per query profile; [`PipelineLimits`]
//! bounds cost and latency per deployment. Both serialize with serde
//! (durations as milliseconds) and validate through their builders.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::fusion::FusionStrategy;

/// Which retrieval sources a query uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
    #[default]
    Hybrid,
    LexicalOnly,
    DenseOnly,
}

impl RetrievalMethod {
    pub fn uses_lexical(self) -> bool {
        matches!(self, RetrievalMethod::Hybrid | RetrievalMethod::LexicalOnly)
    }

    pub fn uses_dense(self) -> bool {
        matches!(self, RetrievalMethod::Hybrid | RetrievalMethod::DenseOnly)
    }
}

/// Which reranker reorders the fused candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankerType {
    #[default]
    CrossEncoder,
    Llm,
    Heuristic,
    /// Keep fusion order.
    None,
}

/// Strategy selection for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub retrieval_method: RetrievalMethod,
    pub fusion_method: FusionStrategy,
    pub reranker_type: RerankerType,
    /// Number of reranked chunks handed to the generator (top_k).
    pub max_results: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retrieval_method: RetrievalMethod::Hybrid,
            fusion_method: FusionStrategy::default(),
            reranker_type: RerankerType::CrossEncoder,
            max_results: 5,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for constructing a [`PipelineConfig`].
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.max_results == 0 {
            return Err(RagError::Config("max_results must be greater than zero".to_string()));
        }
        self.fusion_method.validate()
    }
}

/// Builder for constructing a validated [`PipelineConfig`].
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn retrieval_method(mut self, method: RetrievalMethod) -> Self {
        self.config.retrieval_method = method;
        self
    }

    pub fn fusion_method(mut self, fusion: FusionStrategy) -> Self {
        self.config.fusion_method = fusion;
        self
    }

    pub fn reranker_type(mut self, reranker: RerankerType) -> Self {
        self.config.reranker_type = reranker;
        self
    }

    pub fn max_results(mut self, max_results: usize) -> Self {
        self.config.max_results = max_results;
        self
    }

    /// # Errors
    ///
    /// Returns [`RagError::Config`] if `max_results == 0` or the fusion
    /// parameters are invalid.
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Cost and latency bounds for every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineLimits {
    /// Maximum candidates per retrieval source.
    pub retrieval_limit: usize,
    /// Maximum fused candidates handed to the reranker.
    pub rerank_candidate_limit: usize,
    /// Character budget for the generator's context window.
    pub context_char_budget: usize,
    /// Longest accepted query, in characters.
    pub max_query_chars: usize,
    /// Minimum fraction of a claim's content terms found in its citation.
    pub entailment_threshold: f64,
    /// Confidence ceiling for unverified answers.
    pub unverified_ceiling: f64,
    #[serde(with = "duration_ms", rename = "lexical_timeout_ms")]
    pub lexical_timeout: Duration,
    #[serde(with = "duration_ms", rename = "dense_timeout_ms")]
    pub dense_timeout: Duration,
    #[serde(with = "duration_ms", rename = "rerank_timeout_ms")]
    pub rerank_timeout: Duration,
    #[serde(with = "duration_ms", rename = "generation_timeout_ms")]
    pub generation_timeout: Duration,
    /// How long a query waits on the answer sink before giving up on the record.
    #[serde(with = "duration_ms", rename = "sink_timeout_ms")]
    pub sink_timeout: Duration,
}

impl Default for PipelineLimits {
    fn default() -> Self {
        Self {
            retrieval_limit: 50,
            rerank_candidate_limit: 25,
            context_char_budget: 12_000,
            max_query_chars: 1000,
            entailment_threshold: 0.5,
            unverified_ceiling: 0.3,
            lexical_timeout: Duration::from_millis(2000),
            dense_timeout: Duration::from_millis(2000),
            rerank_timeout: Duration::from_millis(5000),
            generation_timeout: Duration::from_secs(30),
            sink_timeout: Duration::from_millis(1000),
        }
    }
}

impl PipelineLimits {
    pub fn builder() -> PipelineLimitsBuilder {
        PipelineLimitsBuilder::default()
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("retrieval_limit", self.retrieval_limit),
            ("rerank_candidate_limit", self.rerank_candidate_limit),
            ("context_char_budget", self.context_char_budget),
            ("max_query_chars", self.max_query_chars),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(RagError::Config(format!("{name} must be greater than zero")));
            }
        }
        let timeouts = [
            ("lexical_timeout", self.lexical_timeout),
            ("dense_timeout", self.dense_timeout),
            ("rerank_timeout", self.rerank_timeout),
            ("generation_timeout", self.generation_timeout),
            ("sink_timeout", self.sink_timeout),
        ];
        for (name, value) in timeouts {
            if value.is_zero() {
                return Err(RagError::Config(format!("{name} must be non-zero")));
            }
        }
        if !(0.0..=1.0).contains(&self.entailment_threshold) {
            return Err(RagError::Config(format!(
                "entailment_threshold ({}) must be within [0, 1]",
                self.entailment_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.unverified_ceiling) {
            return Err(RagError::Config(format!(
                "unverified_ceiling ({}) must be within [0, 1]",
                self.unverified_ceiling
            )));
        }
        Ok(())
    }

    /// Check that a config's `max_results` fits within the rerank bound.
    pub fn check_config(&self, config: &PipelineConfig) -> Result<()> {
        config.validate()?;
        if config.max_results > self.rerank_candidate_limit {
            return Err(RagError::Config(format!(
                "max_results ({}) must not exceed rerank_candidate_limit ({})",
                config.max_results, self.rerank_candidate_limit
            )));
        }
        Ok(())
    }
}

/// Builder for constructing validated [`PipelineLimits`].
#[derive(Debug, Clone, Default)]
pub struct PipelineLimitsBuilder {
    limits: PipelineLimits,
}

impl PipelineLimitsBuilder {
    pub fn retrieval_limit(mut self, limit: usize) -> Self {
        self.limits.retrieval_limit = limit;
        self
    }

    pub fn rerank_candidate_limit(mut self, limit: usize) -> Self {
        self.limits.rerank_candidate_limit = limit;
        self
    }

    pub fn context_char_budget(mut self, budget: usize) -> Self {
        self.limits.context_char_budget = budget;
        self
    }

    pub fn max_query_chars(mut self, max_chars: usize) -> Self {
        self.limits.max_query_chars = max_chars;
        self
    }

    pub fn entailment_threshold(mut self, threshold: f64) -> Self {
        self.limits.entailment_threshold = threshold;
        self
    }

    pub fn unverified_ceiling(mut self, ceiling: f64) -> Self {
        self.limits.unverified_ceiling = ceiling;
        self
    }

    /// Set the same timeout for both retrieval sources.
    pub fn retrieval_timeout(mut self, timeout: Duration) -> Self {
        self.limits.lexical_timeout = timeout;
        self.limits.dense_timeout = timeout;
        self
    }

    pub fn lexical_timeout(mut self, timeout: Duration) -> Self {
        self.limits.lexical_timeout = timeout;
        self
    }

    pub fn dense_timeout(mut self, timeout: Duration) -> Self {
        self.limits.dense_timeout = timeout;
        self
    }

    pub fn rerank_timeout(mut self, timeout: Duration) -> Self {
        self.limits.rerank_timeout = timeout;
        self
    }

    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.limits.generation_timeout = timeout;
        self
    }

    pub fn sink_timeout(mut self, timeout: Duration) -> Self {
        self.limits.sink_timeout = timeout;
        self
    }

    /// # Errors
    ///
    /// Returns [`RagError::Config`] if any limit is zero or a ratio is
    /// outside `[0, 1]`.
    pub fn build(self) -> Result<PipelineLimits> {
        self.limits.validate()?;
        Ok(self.limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
        assert!(PipelineLimits::default().validate().is_ok());
        assert!(PipelineLimits::default().check_config(&PipelineConfig::default()).is_ok());
    }

    #[test]
    fn zero_max_results_rejected() {
        let err = PipelineConfig::builder().max_results(0).build().unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[test]
    fn max_results_above_rerank_bound_rejected() {
        let limits = PipelineLimits::builder().rerank_candidate_limit(3).build().unwrap();
        let config = PipelineConfig::builder().max_results(4).build().unwrap();
        assert!(limits.check_config(&config).is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = PipelineLimits::builder().generation_timeout(Duration::ZERO).build().unwrap_err();
        assert!(err.to_string().contains("generation_timeout"));
    }

    #[test]
    fn limits_serialize_timeouts_as_millis() {
        let json = serde_json::to_value(PipelineLimits::default()).unwrap();
        assert_eq!(json["generation_timeout_ms"], 30_000);
        assert_eq!(json["lexical_timeout_ms"], 2000);
        assert_eq!(json["sink_timeout_ms"], 1000);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"reranker_type":"heuristic","retrieval_method":"lexical_only"}"#)
                .unwrap();
        assert_eq!(config.reranker_type, RerankerType::Heuristic);
        assert_eq!(config.retrieval_method, RetrievalMethod::LexicalOnly);
        assert_eq!(config.max_results, 5);
    }
}
