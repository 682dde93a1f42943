//! Rank fusion strategies.
//!
//! Fusion is pure: the same input lists and strategy always produce the
//! same ordering with bit-identical scores. Scores are accumulated per chunk
//! in a fixed source order (lexical, then dense) and the output is sorted
//! with a total order.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::document::{Chunk, FusedCandidate, RetrievalCandidate, RetrievalSource};
use crate::error::{RagError, Result};

/// Default RRF dampening constant.
pub const DEFAULT_RRF_K: f64 = 60.0;

/// How ranked lists from several sources are merged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum FusionStrategy {
    /// `Σ 1 / (k + rank)` over the sources a chunk appears in.
    ReciprocalRank { k: f64 },
    /// `Σ weight × minmax(raw_score)`, normalized per source.
    WeightedSum { lexical_weight: f64, dense_weight: f64 },
}

impl Default for FusionStrategy {
    fn default() -> Self {
        FusionStrategy::ReciprocalRank { k: DEFAULT_RRF_K }
    }
}

impl FusionStrategy {
    pub fn reciprocal_rank() -> Self {
        Self::default()
    }

    pub fn weighted_sum(lexical_weight: f64, dense_weight: f64) -> Self {
        FusionStrategy::WeightedSum { lexical_weight, dense_weight }
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            FusionStrategy::ReciprocalRank { k } => {
                if !(k.is_finite() && k > 0.0) {
                    return Err(RagError::Config(format!("RRF k ({k}) must be positive")));
                }
            }
            FusionStrategy::WeightedSum { lexical_weight, dense_weight } => {
                let valid = |w: f64| w.is_finite() && w >= 0.0;
                if !valid(lexical_weight) || !valid(dense_weight) {
                    return Err(RagError::Config("fusion weights must be non-negative".to_string()));
                }
                if lexical_weight == 0.0 && dense_weight == 0.0 {
                    return Err(RagError::Config("fusion weights must not both be zero".to_string()));
                }
            }
        }
        Ok(())
    }

    /// Merge both sources into one candidate per chunk, best first.
    ///
    /// Ties are broken by the chunk's `ordinal`, then `chunk_id`.
    pub fn fuse(&self, lexical: &[RetrievalCandidate], dense: &[RetrievalCandidate]) -> Vec<FusedCandidate> {
        let mut merged: BTreeMap<&str, (Arc<Chunk>, f64, BTreeSet<RetrievalSource>)> = BTreeMap::new();

        for list in [lexical, dense] {
            let contributions = self.contributions(list);
            for (candidate, contribution) in list.iter().zip(contributions) {
                let entry = merged
                    .entry(candidate.chunk.chunk_id.as_str())
                    .or_insert_with(|| (Arc::clone(&candidate.chunk), 0.0, BTreeSet::new()));
                // A source lists each chunk once; keep the first if it repeats.
                if entry.2.insert(candidate.source) {
                    entry.1 += contribution;
                }
            }
        }

        let mut fused: Vec<FusedCandidate> = merged
            .into_values()
            .map(|(chunk, fused_score, sources)| FusedCandidate { chunk, fused_score, sources })
            .collect();

        fused.sort_by(|a, b| {
            b.fused_score
                .total_cmp(&a.fused_score)
                .then_with(|| a.chunk.ordinal.cmp(&b.chunk.ordinal))
                .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
        });
        fused
    }

    fn contributions(&self, list: &[RetrievalCandidate]) -> Vec<f64> {
        match *self {
            FusionStrategy::ReciprocalRank { k } => {
                list.iter().map(|c| 1.0 / (k + c.rank as f64)).collect()
            }
            FusionStrategy::WeightedSum { lexical_weight, dense_weight } => {
                let weight = |source| match source {
                    RetrievalSource::Lexical => lexical_weight,
                    RetrievalSource::Dense => dense_weight,
                };
                min_max(list).into_iter().zip(list).map(|(norm, c)| weight(c.source) * norm).collect()
            }
        }
    }
}

/// Scale raw scores to `[0, 1]`. A list whose scores are all equal
/// normalizes to 1.0.
fn min_max(list: &[RetrievalCandidate]) -> Vec<f64> {
    let scores: Vec<f64> = list.iter().map(|c| f64::from(c.raw_score)).collect();
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if !range.is_finite() || range <= f64::EPSILON {
        return vec![1.0; scores.len()];
    }
    scores.into_iter().map(|s| (s - min) / range).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, source: RetrievalSource, rank: usize, raw_score: f32) -> RetrievalCandidate {
        RetrievalCandidate { chunk: Arc::new(Chunk::new(id, "d", id, 0)), source, raw_score, rank }
    }

    fn ids(fused: &[FusedCandidate]) -> Vec<&str> {
        fused.iter().map(FusedCandidate::chunk_id).collect()
    }

    #[test]
    fn rrf_lifts_chunks_found_by_both_sources() {
        let lexical = vec![
            candidate("A", RetrievalSource::Lexical, 1, 9.0),
            candidate("B", RetrievalSource::Lexical, 2, 7.0),
        ];
        let dense = vec![
            candidate("B", RetrievalSource::Dense, 1, 0.9),
            candidate("C", RetrievalSource::Dense, 2, 0.8),
        ];
        let fused = FusionStrategy::reciprocal_rank().fuse(&lexical, &dense);
        assert_eq!(ids(&fused), vec!["B", "A", "C"]);
        assert!((fused[0].fused_score - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-12);
        assert_eq!(fused[0].sources.len(), 2);
    }

    #[test]
    fn weighted_sum_normalizes_per_source() {
        let lexical = vec![
            candidate("A", RetrievalSource::Lexical, 1, 30.0),
            candidate("B", RetrievalSource::Lexical, 2, 10.0),
        ];
        let dense = vec![candidate("B", RetrievalSource::Dense, 1, 0.4)];
        let fused = FusionStrategy::weighted_sum(0.5, 0.5).fuse(&lexical, &dense);
        // A: 0.5 * 1.0; B: 0.5 * 0.0 + 0.5 * 1.0 (single-valued list).
        assert_eq!(fused[0].fused_score, 0.5);
        assert_eq!(fused[1].fused_score, 0.5);
        assert_eq!(ids(&fused), vec!["A", "B"]);
    }

    #[test]
    fn ties_break_by_ordinal_then_id() {
        let mut late = candidate("a", RetrievalSource::Lexical, 1, 1.0);
        late.chunk = Arc::new(Chunk::new("a", "d", "a", 5));
        let early = candidate("z", RetrievalSource::Dense, 1, 1.0);
        let fused = FusionStrategy::reciprocal_rank().fuse(&[late], &[early]);
        assert_eq!(ids(&fused), vec!["z", "a"]);
    }

    #[test]
    fn empty_inputs_fuse_to_nothing() {
        assert!(FusionStrategy::default().fuse(&[], &[]).is_empty());
    }

    #[test]
    fn invalid_parameters_rejected() {
        assert!(FusionStrategy::ReciprocalRank { k: 0.0 }.validate().is_err());
        assert!(FusionStrategy::weighted_sum(0.0, 0.0).validate().is_err());
        assert!(FusionStrategy::weighted_sum(-1.0, 1.0).validate().is_err());
        assert!(FusionStrategy::weighted_sum(0.0, 1.0).validate().is_ok());
    }

    #[test]
    fn strategy_serializes_with_method_tag() {
        let json = serde_json::to_value(FusionStrategy::default()).unwrap();
        assert_eq!(json, serde_json::json!({"method": "reciprocal_rank", "k": 60.0}));
    }
}
