//! RRF (Reciprocal Rank Fusion) across keyword, dense and sparse lists
//!
//! ## Algorithm
//!
//! Fused score for document d:
//! ```text
//! RRF(d) = Σ weight_b / (k + rank_b(d))
//! ```
//!
//! Where:
//! - k is a smoothing constant (default 60)
//! - rank_b(d) is the 1-indexed position of d in backend b's list
//! - weight_b is the backend's share of the [`HybridWeights`] triple
//!
//! A document missing from a list gets no term for that backend. Lists
//! whose weight is exactly zero contribute neither score nor candidates.
//!
//! Ties are broken by the smallest rank the document reached in any list,
//! then by document id, so output order is fully deterministic.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::search::backend::{BackendKind, RankedList};
use crate::search::weights::HybridWeights;

/// Default RRF smoothing constant.
pub const DEFAULT_RRF_K: f64 = 60.0;

/// Per-document fused score with an explainable breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionScore {
    pub doc_id: String,
    /// Sum of all contributions
    pub score: f64,
    /// 1-indexed position in the fused order
    pub fusion_rank: usize,
    /// Rank in each list the document appeared in
    pub ranks: BTreeMap<BackendKind, usize>,
    /// `weight / (k + rank)` per backend
    pub contributions: BTreeMap<BackendKind, f64>,
    /// Raw backend scores, for display only
    pub raw_scores: BTreeMap<BackendKind, f32>,
}

impl FusionScore {
    /// Best rank across all contributing backends.
    pub fn min_rank(&self) -> usize {
        self.ranks.values().copied().min().unwrap_or(usize::MAX)
    }

    /// Backends that contributed to this document.
    pub fn sources(&self) -> Vec<BackendKind> {
        self.ranks.keys().copied().collect()
    }
}

/// Weighted RRF over per-backend ranked lists.
#[derive(Debug, Clone, Copy)]
pub struct FusionEngine {
    k: f64,
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self { k: DEFAULT_RRF_K }
    }
}

impl FusionEngine {
    /// Non-finite or negative `k` falls back to [`DEFAULT_RRF_K`].
    pub fn new(k: f64) -> Self {
        Self { k: sanitize_k(k) }
    }

    pub const fn k(&self) -> f64 {
        self.k
    }

    /// Fuse ranked lists into one ordering.
    ///
    /// Lists are processed in canonical backend order regardless of the
    /// order given, so floating-point sums are reproducible.
    #[instrument(level = "debug", skip_all, fields(k = self.k, lists = lists.len()))]
    pub fn fuse(&self, lists: &[RankedList], weights: &HybridWeights) -> Vec<FusionScore> {
        let mut ordered: Vec<&RankedList> = lists.iter().collect();
        ordered.sort_by_key(|list| list.backend());

        let mut scores: HashMap<&str, FusionScore> = HashMap::new();

        for list in ordered {
            let backend = list.backend();
            let weight = weights.get(backend);
            if weight <= 0.0 {
                continue;
            }

            for (rank, candidate) in list.ranked() {
                let contribution = weight / (self.k + rank as f64);

                scores
                    .entry(candidate.doc_id.as_str())
                    .and_modify(|s| {
                        // first occurrence wins if a list repeats an id
                        if !s.ranks.contains_key(&backend) {
                            s.score += contribution;
                            s.ranks.insert(backend, rank);
                            s.contributions.insert(backend, contribution);
                            s.raw_scores.insert(backend, candidate.score);
                        }
                    })
                    .or_insert_with(|| FusionScore {
                        doc_id: candidate.doc_id.clone(),
                        score: contribution,
                        fusion_rank: 0,
                        ranks: BTreeMap::from([(backend, rank)]),
                        contributions: BTreeMap::from([(backend, contribution)]),
                        raw_scores: BTreeMap::from([(backend, candidate.score)]),
                    });
            }
        }

        let mut fused: Vec<FusionScore> = scores.into_values().collect();
        fused.sort_by(compare_fused);
        for (i, score) in fused.iter_mut().enumerate() {
            score.fusion_rank = i + 1;
        }

        debug!(
            fused = fused.len(),
            top = fused.first().map(|s| s.doc_id.as_str()),
            "rrf fusion complete"
        );
        fused
    }
}

/// Score descending, then smallest minimum rank, then doc id.
pub fn compare_fused(a: &FusionScore, b: &FusionScore) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.min_rank().cmp(&b.min_rank()))
        .then_with(|| a.doc_id.cmp(&b.doc_id))
}

fn sanitize_k(k: f64) -> f64 {
    if k.is_finite() && k >= 0.0 { k } else { DEFAULT_RRF_K }
}
