//! Query normalization and filter validation.

use crate::error::{RagError, Result};
use crate::filter::FilterSet;
use crate::text;

/// A normalized query ready for retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    /// Whitespace-collapsed query, original case. Used by the dense
    /// retriever, the reranker and the generator.
    pub original: String,
    /// Lower-cased form used for keyword matching.
    pub lexical_text: String,
    pub filters: FilterSet,
}

/// Turns raw query text into a [`QueryPlan`]. Has no side effects.
#[derive(Debug, Clone, Copy)]
pub struct QueryPlanner {
    max_query_chars: usize,
}

impl QueryPlanner {
    pub fn new(max_query_chars: usize) -> Self {
        Self { max_query_chars }
    }

    /// # Errors
    ///
    /// [`RagError::InvalidQuery`] when the query is empty after
    /// normalization, exceeds `max_query_chars`, or the filters can never
    /// match (inverted date range, confidence outside `[0, 1]`).
    pub fn plan(&self, raw: &str, filters: &FilterSet) -> Result<QueryPlan> {
        let original = text::normalize_whitespace(raw);
        if original.is_empty() {
            return Err(RagError::InvalidQuery("query is empty".to_string()));
        }
        let length = original.chars().count();
        if length > self.max_query_chars {
            return Err(RagError::InvalidQuery(format!(
                "query is {length} characters; the limit is {}",
                self.max_query_chars
            )));
        }
        filters.validate()?;

        Ok(QueryPlan { lexical_text: original.to_lowercase(), original, filters: filters.clone() })
    }
}
