//! Metadata filters applied by every retriever before scoring.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::document::{Chunk, keys};
use crate::error::{RagError, Result};

/// Inclusive creation-date range. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| date >= s) && self.end.is_none_or(|e| date <= e)
    }

    pub fn is_inverted(&self) -> bool {
        matches!((self.start, self.end), (Some(s), Some(e)) if s > e)
    }
}

/// Caller-supplied constraints on which chunks may be retrieved.
///
/// An empty `document_types` list admits every type. When a date range or
/// confidence threshold is set, chunks lacking the corresponding metadata
/// are excluded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSet {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub document_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,
    /// Overrides the configured `max_results` for this query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document_type(mut self, document_type: impl Into<String>) -> Self {
        self.document_types.push(document_type.into());
        self
    }

    pub fn with_date_range(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.date_range = Some(DateRange::new(start, end));
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = Some(min_confidence);
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    /// True when no constraint is set.
    pub fn is_unfiltered(&self) -> bool {
        self.document_types.is_empty() && self.date_range.is_none() && self.min_confidence.is_none()
    }

    /// Reject filters that can never match anything.
    pub fn validate(&self) -> Result<()> {
        if self.date_range.is_some_and(|r| r.is_inverted()) {
            return Err(RagError::InvalidQuery("date range start is after its end".to_string()));
        }
        if let Some(min) = self.min_confidence {
            if !(0.0..=1.0).contains(&min) {
                return Err(RagError::InvalidQuery(format!(
                    "min_confidence ({min}) must be within [0, 1]"
                )));
            }
        }
        if self.max_results == Some(0) {
            return Err(RagError::InvalidQuery("max_results must be greater than zero".to_string()));
        }
        Ok(())
    }

    /// Whether `chunk` satisfies every constraint.
    pub fn matches(&self, chunk: &Chunk) -> bool {
        if !self.document_types.is_empty() {
            let admitted = chunk
                .document_type()
                .is_some_and(|t| self.document_types.iter().any(|d| d.eq_ignore_ascii_case(t)));
            if !admitted {
                return false;
            }
        }

        if let Some(range) = &self.date_range {
            let date = chunk.metadata.get(keys::CREATED_AT).and_then(|v| v.as_date());
            if !date.is_some_and(|d| range.contains(d)) {
                return false;
            }
        }

        if let Some(min) = self.min_confidence {
            let confidence = chunk.metadata.get(keys::CONFIDENCE).and_then(|v| v.as_f64());
            if !confidence.is_some_and(|c| c >= min) {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn invoice() -> Chunk {
        Chunk::new("c1", "d1", "Invoice total 1200", 0)
            .with_metadata(keys::DOCUMENT_TYPE, "invoice")
            .with_metadata(keys::CREATED_AT, date(2024, 3, 1))
            .with_metadata(keys::CONFIDENCE, 0.92)
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(FilterSet::new().matches(&Chunk::new("c", "d", "text", 0)));
    }

    #[test]
    fn document_type_is_case_insensitive() {
        assert!(FilterSet::new().with_document_type("Invoice").matches(&invoice()));
        assert!(!FilterSet::new().with_document_type("contract").matches(&invoice()));
    }

    #[test]
    fn date_range_is_inclusive() {
        let f = FilterSet::new().with_date_range(Some(date(2024, 3, 1)), Some(date(2024, 3, 1)));
        assert!(f.matches(&invoice()));
        let f = FilterSet::new().with_date_range(Some(date(2024, 3, 2)), None);
        assert!(!f.matches(&invoice()));
    }

    #[test]
    fn missing_metadata_is_excluded_by_constraints() {
        let bare = Chunk::new("c", "d", "text", 0);
        assert!(!FilterSet::new().with_min_confidence(0.5).matches(&bare));
        assert!(!FilterSet::new().with_date_range(None, Some(date(2030, 1, 1))).matches(&bare));
    }

    #[test]
    fn min_confidence_threshold() {
        assert!(FilterSet::new().with_min_confidence(0.9).matches(&invoice()));
        assert!(!FilterSet::new().with_min_confidence(0.95).matches(&invoice()));
    }

    #[test]
    fn inverted_range_is_invalid() {
        let f = FilterSet::new().with_date_range(Some(date(2024, 5, 1)), Some(date(2024, 1, 1)));
        assert!(matches!(f.validate(), Err(RagError::InvalidQuery(_))));
    }
}
