//! Search requests and query text normalization

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::error::{Result, SearchError};
use crate::search::filters::SearchFilters;
use crate::search::weights::HybridWeights;

/// Upper bound on a single page of results.
pub const MAX_LIMIT: usize = 1000;

/// Default page size.
pub const DEFAULT_LIMIT: usize = 20;

/// Normalize query text: NFKC, trim, collapse internal whitespace.
pub fn normalize_query(text: &str) -> String {
    let nfkc: String = text.nfkc().collect();
    nfkc.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One search request.
///
/// Text is normalized on construction. Call [`Query::validate`] (the
/// orchestrator does) before running it. Deserialized queries go through
/// the same normalization and are validated on the way in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawQuery")]
pub struct Query {
    text: String,
    #[serde(default)]
    filters: SearchFilters,
    limit: usize,
    #[serde(default)]
    offset: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    weights: Option<HybridWeights>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rerank: Option<bool>,
    #[serde(default)]
    allow_filters_only: bool,
}

/// Wire form of [`Query`] before normalization and validation.
#[derive(Deserialize)]
struct RawQuery {
    text: String,
    #[serde(default)]
    filters: SearchFilters,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    weights: Option<HybridWeights>,
    #[serde(default)]
    rerank: Option<bool>,
    #[serde(default)]
    allow_filters_only: bool,
}

const fn default_limit() -> usize {
    DEFAULT_LIMIT
}

impl TryFrom<RawQuery> for Query {
    type Error = SearchError;

    fn try_from(raw: RawQuery) -> Result<Self> {
        if raw.limit > MAX_LIMIT {
            return Err(SearchError::InvalidQuery(format!(
                "limit {} exceeds {MAX_LIMIT}",
                raw.limit
            )));
        }
        let query = Self {
            text: normalize_query(&raw.text),
            filters: raw.filters,
            limit: raw.limit,
            offset: raw.offset,
            weights: raw.weights,
            rerank: raw.rerank,
            allow_filters_only: raw.allow_filters_only,
        };
        query.validate()?;
        Ok(query)
    }
}

impl Query {
    pub fn new(text: &str) -> Self {
        Self {
            text: normalize_query(text),
            filters: SearchFilters::default(),
            limit: DEFAULT_LIMIT,
            offset: 0,
            weights: None,
            rerank: None,
            allow_filters_only: false,
        }
    }

    /// Page size, capped at [`MAX_LIMIT`].
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.min(MAX_LIMIT);
        self
    }

    #[must_use]
    pub const fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    #[must_use]
    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Explicit weights override adaptive selection.
    #[must_use]
    pub const fn with_weights(mut self, weights: HybridWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Force reranking on or off. Unset follows `rerank.enabled`.
    #[must_use]
    pub const fn with_reranking(mut self, enabled: bool) -> Self {
        self.rerank = Some(enabled);
        self
    }

    /// Permit empty text; the result set then comes from the filters alone.
    #[must_use]
    pub const fn allow_filters_only(mut self) -> Self {
        self.allow_filters_only = true;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub const fn filters(&self) -> &SearchFilters {
        &self.filters
    }

    pub const fn limit(&self) -> usize {
        self.limit
    }

    pub const fn offset(&self) -> usize {
        self.offset
    }

    pub const fn weights(&self) -> Option<&HybridWeights> {
        self.weights.as_ref()
    }

    pub const fn rerank(&self) -> Option<bool> {
        self.rerank
    }

    /// True when this request skips retrieval entirely.
    pub fn is_filters_only(&self) -> bool {
        self.text.is_empty() && self.allow_filters_only
    }

    pub fn validate(&self) -> Result<()> {
        if self.text.is_empty() && !self.allow_filters_only {
            return Err(SearchError::InvalidQuery("query text is empty".into()));
        }
        if self.limit == 0 {
            return Err(SearchError::InvalidQuery("limit must be greater than zero".into()));
        }
        self.filters.validate()
    }
}
