//! Facet counts over a matching document set
//!
//! Facets are computed from already-fetched metadata; no backend is
//! called. Values are ordered by count descending, then value ascending.
//! Values with a zero count never appear.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::search::documents::{DocumentMetadata, DocumentMetadataStore};

/// Default quality bucket edges.
pub const DEFAULT_QUALITY_EDGES: [f64; 3] = [0.25, 0.5, 0.75];

/// One facet dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FacetDefinition {
    /// Values of one tag field
    Tags { field: String },
    /// Classification codes
    Classification,
    /// Quality scores bucketed by ascending interior edges
    QualityBucket { edges: Vec<f64> },
}

impl FacetDefinition {
    /// Facet name in the response.
    pub fn name(&self) -> String {
        match self {
            Self::Tags { field } => field.clone(),
            Self::Classification => "classification".to_string(),
            Self::QualityBucket { .. } => "quality".to_string(),
        }
    }

    fn values(&self, meta: &DocumentMetadata) -> Vec<String> {
        match self {
            Self::Tags { field } => {
                let mut values = meta.tags.get(field).cloned().unwrap_or_default();
                values.sort();
                values.dedup();
                values
            }
            Self::Classification => {
                let mut values = meta.classifications.clone();
                values.sort();
                values.dedup();
                values
            }
            Self::QualityBucket { edges } => vec![quality_bucket(edges, meta.quality)],
        }
    }
}

/// Label of the bucket containing `quality`, e.g. `0.50-0.75`.
///
/// Buckets are half-open `[lo, hi)` except the last, which includes 1.0.
pub fn quality_bucket(edges: &[f64], quality: f64) -> String {
    let mut bounds = Vec::with_capacity(edges.len() + 2);
    bounds.push(0.0);
    bounds.extend(edges.iter().copied().filter(|e| *e > 0.0 && *e < 1.0));
    bounds.push(1.0);

    let q = if quality.is_finite() { quality.clamp(0.0, 1.0) } else { 0.0 };
    let slot = bounds[1..]
        .iter()
        .position(|hi| q < *hi)
        .unwrap_or(bounds.len() - 2);
    format!("{:.2}-{:.2}", bounds[slot], bounds[slot + 1])
}

/// One value and how many matching documents carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetValue {
    pub value: String,
    pub count: usize,
}

/// Facet name to ordered value counts.
pub type Facets = BTreeMap<String, Vec<FacetValue>>;

/// Counts facet values over a document set.
#[derive(Debug, Clone)]
pub struct FacetAggregator {
    definitions: Vec<FacetDefinition>,
    max_values: usize,
}

impl Default for FacetAggregator {
    fn default() -> Self {
        Self::new(
            vec![
                FacetDefinition::Classification,
                FacetDefinition::QualityBucket {
                    edges: DEFAULT_QUALITY_EDGES.to_vec(),
                },
            ],
            50,
        )
    }
}

impl FacetAggregator {
    /// `max_values` caps values per facet; 0 means unlimited.
    pub const fn new(definitions: Vec<FacetDefinition>, max_values: usize) -> Self {
        Self {
            definitions,
            max_values,
        }
    }

    pub fn definitions(&self) -> &[FacetDefinition] {
        &self.definitions
    }

    /// Count facet values over `doc_ids` using store metadata.
    pub fn aggregate(&self, doc_ids: &[String], store: &dyn DocumentMetadataStore) -> Facets {
        let metadata = store.get_facet_values(doc_ids);
        self.aggregate_metadata(doc_ids, &metadata)
    }

    /// Count facet values over pre-fetched metadata. Ids without metadata
    /// are skipped; duplicate ids count once.
    pub fn aggregate_metadata(
        &self,
        doc_ids: &[String],
        metadata: &HashMap<String, DocumentMetadata>,
    ) -> Facets {
        let mut seen = std::collections::HashSet::new();
        let docs: Vec<&DocumentMetadata> = doc_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| metadata.get(id))
            .collect();

        let mut facets = Facets::new();
        for definition in &self.definitions {
            let mut counts: HashMap<String, usize> = HashMap::new();
            for meta in &docs {
                for value in definition.values(meta) {
                    *counts.entry(value).or_default() += 1;
                }
            }

            let mut values: Vec<FacetValue> = counts
                .into_iter()
                .filter(|(_, count)| *count > 0)
                .map(|(value, count)| FacetValue { value, count })
                .collect();
            values.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
            if self.max_values > 0 {
                values.truncate(self.max_values);
            }
            facets.insert(definition.name(), values);
        }

        debug!(docs = docs.len(), facets = facets.len(), "facets aggregated");
        facets
    }
}
