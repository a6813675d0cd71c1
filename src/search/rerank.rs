//! Second-pass reranking of the fused head
//!
//! Only the first `top_n` fused candidates are ever scored. The reranker
//! runs on the blocking pool under a timeout. Anything that goes wrong
//! (no reranker, too few candidates, an error, a timeout, a wrong number
//! of scores, NaN scores) leaves the fused order untouched and reports
//! why in [`RerankOutcome::skip_reason`].
//!
//! Within the head, a candidate with no text keeps its fusion slot; the
//! scored candidates are sorted by descending rerank score (ties keep
//! fusion order) into the remaining slots. The tail after `top_n` is
//! never reordered.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{Result, SearchError};
use crate::search::documents::DocumentTextSource;
use crate::search::embeddings::tokenize;
use crate::search::fusion::FusionScore;

/// Default maximum number of candidates to rerank per query.
pub const DEFAULT_TOP_N: usize = 100;

/// Default reranker timeout.
pub const DEFAULT_RERANK_TIMEOUT: Duration = Duration::from_secs(5);

/// One query-document pair handed to the scorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerankDocument {
    pub doc_id: String,
    pub text: String,
}

/// Cross-encoder style relevance scorer.
///
/// Implementations are called from the blocking thread pool and must be
/// safe to share across concurrent requests.
pub trait Reranker: Send + Sync {
    /// Model identifier, used in logs.
    fn id(&self) -> &str;

    /// Relevance of one document to the query. Higher is better.
    fn score(&self, query: &str, text: &str) -> Result<f32>;

    /// One score per document, in input order.
    fn score_batch(&self, query: &str, docs: &[RerankDocument]) -> Result<Vec<f32>> {
        docs.iter().map(|d| self.score(query, &d.text)).collect()
    }
}

/// A fused candidate after the rerank stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RerankedCandidate {
    pub fusion: FusionScore,
    pub rerank_score: Option<f32>,
}

/// Final order plus whether reranking took effect.
#[derive(Debug, Clone)]
pub struct RerankOutcome {
    pub candidates: Vec<RerankedCandidate>,
    pub applied: bool,
    pub skip_reason: Option<String>,
}

impl RerankOutcome {
    fn skipped(fused: Vec<FusionScore>, reason: impl Into<String>) -> Self {
        Self {
            candidates: fused
                .into_iter()
                .map(|fusion| RerankedCandidate {
                    fusion,
                    rerank_score: None,
                })
                .collect(),
            applied: false,
            skip_reason: Some(reason.into()),
        }
    }
}

/// Rerank stage configuration plus the optional scorer.
#[derive(Clone)]
pub struct RerankStage {
    reranker: Option<Arc<dyn Reranker>>,
    top_n: usize,
    min_candidates: usize,
    batch_size: usize,
    timeout: Duration,
}

impl Default for RerankStage {
    fn default() -> Self {
        Self {
            reranker: None,
            top_n: DEFAULT_TOP_N,
            min_candidates: 1,
            batch_size: 32,
            timeout: DEFAULT_RERANK_TIMEOUT,
        }
    }
}

impl RerankStage {
    pub fn new(reranker: Option<Arc<dyn Reranker>>) -> Self {
        Self {
            reranker,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n.max(1);
        self
    }

    #[must_use]
    pub const fn with_min_candidates(mut self, min_candidates: usize) -> Self {
        self.min_candidates = min_candidates;
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub const fn top_n(&self) -> usize {
        self.top_n
    }

    pub fn has_reranker(&self) -> bool {
        self.reranker.is_some()
    }

    /// Rerank the head of `fused`. Never fails; see [`RerankOutcome`].
    #[instrument(level = "debug", skip_all, fields(candidates = fused.len(), top_n = self.top_n))]
    pub async fn rerank(
        &self,
        query: &str,
        fused: Vec<FusionScore>,
        texts: &dyn DocumentTextSource,
    ) -> RerankOutcome {
        let Some(reranker) = self.reranker.clone() else {
            return RerankOutcome::skipped(fused, "no reranker configured");
        };

        let head_len = fused.len().min(self.top_n);
        let docs: Vec<RerankDocument> = fused[..head_len]
            .iter()
            .filter_map(|f| {
                texts.document_text(&f.doc_id).map(|text| RerankDocument {
                    doc_id: f.doc_id.clone(),
                    text,
                })
            })
            .collect();

        if docs.is_empty() || docs.len() < self.min_candidates {
            debug!(
                with_text = docs.len(),
                min = self.min_candidates,
                "skipping rerank: too few candidates with text"
            );
            return RerankOutcome::skipped(
                fused,
                format!(
                    "{} candidates with text, need at least {}",
                    docs.len(),
                    self.min_candidates.max(1)
                ),
            );
        }

        let scores = match self.score_blocking(reranker.clone(), query, docs.clone()).await {
            Ok(scores) => scores,
            Err(err) => {
                warn!(model = reranker.id(), error = %err, "reranker failed, keeping fused order");
                return RerankOutcome::skipped(fused, err.to_string());
            }
        };

        if scores.len() != docs.len() {
            warn!(
                expected = docs.len(),
                got = scores.len(),
                "reranker score count mismatch, keeping fused order"
            );
            return RerankOutcome::skipped(
                fused,
                format!("expected {} scores, got {}", docs.len(), scores.len()),
            );
        }
        if scores.iter().any(|s| s.is_nan()) {
            warn!(model = reranker.id(), "reranker returned NaN, keeping fused order");
            return RerankOutcome::skipped(fused, "reranker returned NaN scores");
        }

        let score_of: HashMap<&str, f32> = docs
            .iter()
            .map(|d| d.doc_id.as_str())
            .zip(scores.iter().copied())
            .collect();

        let mut fused = fused;
        let tail = fused.split_off(head_len);
        let mut head: Vec<Option<FusionScore>> = fused.into_iter().map(Some).collect();

        // scored candidates leave their slots; unscored ones stay put
        let mut scored: Vec<RerankedCandidate> = head
            .iter_mut()
            .filter(|slot| matches!(slot, Some(f) if score_of.contains_key(f.doc_id.as_str())))
            .filter_map(Option::take)
            .map(|fusion| {
                let rerank_score = score_of.get(fusion.doc_id.as_str()).copied();
                RerankedCandidate {
                    fusion,
                    rerank_score,
                }
            })
            .collect();
        scored.sort_by(|a, b| {
            let sa = a.rerank_score.unwrap_or(f32::MIN);
            let sb = b.rerank_score.unwrap_or(f32::MIN);
            sb.total_cmp(&sa)
                .then_with(|| a.fusion.fusion_rank.cmp(&b.fusion.fusion_rank))
        });

        let reranked_count = scored.len();
        let mut scored = scored.into_iter();
        let reranked: Vec<RerankedCandidate> = head
            .into_iter()
            .filter_map(|slot| match slot {
                Some(fusion) => Some(RerankedCandidate {
                    fusion,
                    rerank_score: None,
                }),
                None => scored.next(),
            })
            .chain(tail.into_iter().map(|fusion| RerankedCandidate {
                fusion,
                rerank_score: None,
            }))
            .collect();

        debug!(model = reranker.id(), reranked = reranked_count, "rerank applied");
        RerankOutcome {
            candidates: reranked,
            applied: true,
            skip_reason: None,
        }
    }

    async fn score_blocking(
        &self,
        reranker: Arc<dyn Reranker>,
        query: &str,
        docs: Vec<RerankDocument>,
    ) -> Result<Vec<f32>> {
        let query = query.to_string();
        let batch_size = self.batch_size;
        let task = tokio::task::spawn_blocking(move || {
            let mut scores = Vec::with_capacity(docs.len());
            for chunk in docs.chunks(batch_size) {
                scores.extend(reranker.score_batch(&query, chunk)?);
            }
            Ok::<_, SearchError>(scores)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(SearchError::RerankerUnavailable(format!(
                "reranker task failed: {join}"
            ))),
            // the blocking task keeps running; its result is discarded
            Err(_) => Err(SearchError::RerankerUnavailable(format!(
                "timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

/// Deterministic lexical reranker: share of distinct query terms found in
/// the document, plus a bonus when the whole query appears verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct TermOverlapReranker;

impl TermOverlapReranker {
    pub const ID: &'static str = "term-overlap";

    fn overlap(query_terms: &HashSet<String>, query_lower: &str, text: &str) -> f32 {
        if query_terms.is_empty() {
            return 0.0;
        }
        let doc_terms: HashSet<String> = tokenize(text).into_iter().collect();
        let hits = query_terms.iter().filter(|t| doc_terms.contains(*t)).count();
        let mut score = hits as f32 / query_terms.len() as f32;
        if query_terms.len() > 1 && text.to_lowercase().contains(query_lower) {
            score += 0.5;
        }
        score
    }
}

impl Reranker for TermOverlapReranker {
    fn id(&self) -> &str {
        Self::ID
    }

    fn score(&self, query: &str, text: &str) -> Result<f32> {
        let terms: HashSet<String> = tokenize(query).into_iter().collect();
        Ok(Self::overlap(&terms, &query.to_lowercase(), text))
    }

    fn score_batch(&self, query: &str, docs: &[RerankDocument]) -> Result<Vec<f32>> {
        let terms: HashSet<String> = tokenize(query).into_iter().collect();
        let query_lower = query.to_lowercase();
        Ok(docs
            .par_iter()
            .map(|d| Self::overlap(&terms, &query_lower, &d.text))
            .collect())
    }
}
