//! Search filters
//!
//! Filters narrow the candidate set either before fusion (each ranked list
//! is filtered and re-ranked) or after fusion (fusion ranks are kept). The
//! stage is a config choice, see [`FilterStage`].
//!
//! Matching semantics:
//! - Tags: OR within a field, AND across fields
//! - Classification codes: any-match
//! - Minimum quality: inclusive
//! - Date range: inclusive on both ends, open ends allowed

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};
use crate::search::documents::DocumentMetadata;

/// When filters are applied relative to fusion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStage {
    /// Filter each backend list, then fuse the survivors
    PreFusion,
    /// Fuse everything, then drop non-matching documents
    #[default]
    PostFusion,
}

/// Inclusive date range. Either end may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// Create a range, rejecting `start > end`.
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    fn validate(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(SearchError::InvalidFilter(format!(
                    "date range start {start} is after end {end}"
                )));
            }
        }
        Ok(())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| date >= s) && self.end.is_none_or(|e| date <= e)
    }
}

/// Filters for narrowing search results.
///
/// Collections are ordered so that serialization is canonical; the result
/// cache keys on [`SearchFilters::canonical_key`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Required tag values per field
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, BTreeSet<String>>,

    /// Minimum quality score (0.0 - 1.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_quality: Option<f64>,

    /// Accepted classification codes (any-match)
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub classifications: BTreeSet<String>,

    /// Publication date window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
}

impl SearchFilters {
    /// Create new empty filters
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: require `value` for tag `field` (OR with other values of the same field)
    #[must_use]
    pub fn tag(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags
            .entry(field.into())
            .or_default()
            .insert(value.into());
        self
    }

    /// Builder: set minimum quality, clamped to [0.0, 1.0]
    #[must_use]
    pub fn min_quality(mut self, min_quality: f64) -> Self {
        self.min_quality = Some(if min_quality.is_nan() {
            min_quality
        } else {
            min_quality.clamp(0.0, 1.0)
        });
        self
    }

    /// Builder: accept a classification code
    #[must_use]
    pub fn classification(mut self, code: impl Into<String>) -> Self {
        self.classifications.insert(code.into());
        self
    }

    /// Builder: restrict to a date range
    #[must_use]
    pub const fn date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    /// Check if filters are empty (no filtering will occur)
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
            && self.min_quality.is_none()
            && self.classifications.is_empty()
            && self.date_range.is_none()
    }

    /// Reject malformed values before any backend is called.
    pub fn validate(&self) -> Result<()> {
        for (field, values) in &self.tags {
            if field.trim().is_empty() {
                return Err(SearchError::InvalidFilter("empty tag field name".into()));
            }
            if values.is_empty() {
                return Err(SearchError::InvalidFilter(format!(
                    "tag field '{field}' has no values"
                )));
            }
        }
        if let Some(q) = self.min_quality {
            if !(0.0..=1.0).contains(&q) {
                return Err(SearchError::InvalidFilter(format!(
                    "min_quality {q} is outside 0.0-1.0"
                )));
            }
        }
        if let Some(range) = &self.date_range {
            range.validate()?;
        }
        Ok(())
    }

    /// Check if a document passes all filters
    pub fn matches(&self, meta: &DocumentMetadata) -> bool {
        for (field, wanted) in &self.tags {
            let Some(values) = meta.tags.get(field) else {
                return false;
            };
            if !values.iter().any(|v| wanted.contains(v)) {
                return false;
            }
        }

        if let Some(min_quality) = self.min_quality {
            if meta.quality < min_quality {
                return false;
            }
        }

        if !self.classifications.is_empty()
            && !meta
                .classifications
                .iter()
                .any(|c| self.classifications.contains(c))
        {
            return false;
        }

        if let Some(range) = &self.date_range {
            match meta.date {
                Some(date) if range.contains(date) => {}
                _ => return false,
            }
        }

        true
    }

    /// Filter ids against pre-fetched metadata, keeping order.
    ///
    /// Ids without metadata never match a non-empty filter set.
    pub fn retain_matching(
        &self,
        ids: &[String],
        metadata: &HashMap<String, DocumentMetadata>,
    ) -> Vec<String> {
        if self.is_empty() {
            return ids.to_vec();
        }
        ids.iter()
            .filter(|id| metadata.get(*id).is_some_and(|m| self.matches(m)))
            .cloned()
            .collect()
    }

    /// Stable serialization used for cache keys.
    pub fn canonical_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse `field=value,field=value` tag specs.
    pub fn parse_tags(spec: &str) -> Result<BTreeMap<String, BTreeSet<String>>> {
        let mut tags: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (field, value) = part.split_once('=').ok_or_else(|| {
                SearchError::InvalidFilter(format!("tag '{part}' must look like field=value"))
            })?;
            let (field, value) = (field.trim(), value.trim());
            if field.is_empty() || value.is_empty() {
                return Err(SearchError::InvalidFilter(format!(
                    "tag '{part}' must look like field=value"
                )));
            }
            tags.entry(field.to_string())
                .or_default()
                .insert(value.to_string());
        }
        Ok(tags)
    }
}
