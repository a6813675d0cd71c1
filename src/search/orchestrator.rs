//! Search orchestration
//!
//! ```text
//! Received → CacheCheck ─┬─ CacheHit ──────────────────────────────────────────────┐
//!                        └─ CacheMiss → Retrieving → Weighting → Fusing             │
//!                                         │            → [Reranking] → Faceting     │
//!                                         │            → CacheWrite → Respond ◄─────┘
//!                                         └─ Failed (every backend failed)
//! ```
//!
//! Only retrieval fans out; every other stage runs inline. Filters are
//! applied here, not by the backends, either to each ranked list before
//! fusion or to the fused list after it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{Config, RetrievalConfig};
use crate::error::{Result, SearchError};
use crate::search::backend::{
    BackendKind, DenseBackend, KeywordBackend, QueryEmbedder, SparseBackend, SparseEncoder,
};
use crate::search::cache::{CacheKey, ResultCache};
use crate::search::characterize::QueryCharacterizer;
use crate::search::documents::{DocumentMetadata, DocumentMetadataStore, DocumentTextSource};
use crate::search::facets::{FacetAggregator, Facets};
use crate::search::filters::{FilterStage, SearchFilters};
use crate::search::fusion::{FusionEngine, FusionScore};
use crate::search::query::Query;
use crate::search::rerank::{RerankOutcome, RerankStage, RerankedCandidate, Reranker};
use crate::search::retriever::{CandidateRetriever, UnavailableBackend};
use crate::search::snippet::{Snippet, SnippetBuilder};
use crate::search::weights::{AdaptiveWeightPolicy, HybridWeights, WeightDecision};

/// Pipeline states. Logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PipelineStage {
    Received,
    CacheCheck,
    CacheHit,
    CacheMiss,
    Retrieving,
    Weighting,
    Fusing,
    Reranking,
    Faceting,
    CacheWrite,
    Respond,
    Failed,
}

impl PipelineStage {
    const ALL: [Self; 12] = [
        Self::Received,
        Self::CacheCheck,
        Self::CacheHit,
        Self::CacheMiss,
        Self::Retrieving,
        Self::Weighting,
        Self::Fusing,
        Self::Reranking,
        Self::Faceting,
        Self::CacheWrite,
        Self::Respond,
        Self::Failed,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::CacheCheck => "cache_check",
            Self::CacheHit => "cache_hit",
            Self::CacheMiss => "cache_miss",
            Self::Retrieving => "retrieving",
            Self::Weighting => "weighting",
            Self::Fusing => "fusing",
            Self::Reranking => "reranking",
            Self::Faceting => "faceting",
            Self::CacheWrite => "cache_write",
            Self::Respond => "respond",
            Self::Failed => "failed",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Respond | Self::Failed)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current stage of one request, readable from the cancel branch.
struct StageTracker {
    stage: AtomicU8,
    started: Instant,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            stage: AtomicU8::new(PipelineStage::Received as u8),
            started: Instant::now(),
        }
    }

    fn enter(&self, stage: PipelineStage) {
        self.stage.store(stage as u8, Ordering::Relaxed);
        debug!(
            stage = %stage,
            elapsed_ms = self.elapsed_ms(),
            "pipeline stage"
        );
    }

    fn current(&self) -> PipelineStage {
        let raw = self.stage.load(Ordering::Relaxed);
        PipelineStage::ALL
            .into_iter()
            .find(|s| *s as u8 == raw)
            .unwrap_or(PipelineStage::Received)
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Per-backend ranks and RRF contributions of one result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub ranks: BTreeMap<BackendKind, usize>,
    pub contributions: BTreeMap<BackendKind, f64>,
}

/// One result on the returned page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub doc_id: String,
    /// Fused RRF score (quality for filters-only searches)
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
    /// 1-indexed position in the fused order
    pub fusion_rank: usize,
    pub breakdown: ScoreBreakdown,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<Snippet>,
}

/// A search response. Degraded conditions show up here, not as errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<RankedResult>,
    pub facets: Facets,
    /// Matching documents before pagination
    pub total_matched: usize,
    pub backends_used: Vec<BackendKind>,
    pub backends_unavailable: Vec<UnavailableBackend>,
    /// `None` for filters-only searches
    pub weights: Option<WeightDecision>,
    pub rerank_applied: bool,
    pub rerank_skipped: bool,
    pub rerank_skip_reason: Option<String>,
    pub cache_hit: bool,
    pub took_ms: u64,
}

/// Fused, filtered candidates plus what produced them.
struct FusedCandidates {
    fused: Vec<FusionScore>,
    decision: WeightDecision,
    backends_used: Vec<BackendKind>,
    backends_unavailable: Vec<UnavailableBackend>,
    metadata: Option<HashMap<String, DocumentMetadata>>,
}

/// Top-level search entry point.
pub struct SearchOrchestrator {
    retriever: CandidateRetriever,
    characterizer: QueryCharacterizer,
    weight_policy: AdaptiveWeightPolicy,
    fusion: FusionEngine,
    rerank: RerankStage,
    rerank_by_default: bool,
    facets: FacetAggregator,
    cache: Arc<ResultCache>,
    metadata: Arc<dyn DocumentMetadataStore>,
    texts: Option<Arc<dyn DocumentTextSource>>,
    snippets: SnippetBuilder,
    retrieval: RetrievalConfig,
    filter_stage: FilterStage,
}

impl SearchOrchestrator {
    pub fn builder() -> SearchOrchestratorBuilder {
        SearchOrchestratorBuilder::default()
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub const fn filter_stage(&self) -> FilterStage {
        self.filter_stage
    }

    /// Run a search.
    #[instrument(level = "info", skip_all, fields(query = %query.text(), limit = query.limit()))]
    pub async fn search(&self, query: Query) -> Result<SearchResponse> {
        let tracker = StageTracker::new();
        self.run(&query, &tracker).await
    }

    /// Run a search that stops as soon as `cancel` resolves.
    ///
    /// In-flight backend calls are dropped and nothing is cached.
    pub async fn search_cancellable<C>(&self, query: Query, cancel: C) -> Result<SearchResponse>
    where
        C: Future<Output = ()>,
    {
        let tracker = StageTracker::new();
        tokio::select! {
            biased;
            () = cancel => {
                let stage = tracker.current();
                warn!(stage = %stage, query = %query.text(), "search cancelled");
                Err(SearchError::Cancelled {
                    stage: stage.to_string(),
                })
            }
            result = self.run(&query, &tracker) => result,
        }
    }

    /// Facet counts for a query without reranking or caching.
    #[instrument(level = "debug", skip_all, fields(query = %text))]
    pub async fn get_facets(&self, text: &str, filters: &SearchFilters) -> Result<Facets> {
        let query = Query::new(text)
            .with_filters(filters.clone())
            .allow_filters_only();
        query.validate()?;

        if query.is_filters_only() {
            let (ids, metadata) = self.filtered_universe(filters);
            return Ok(self.facets.aggregate_metadata(&ids, &metadata));
        }

        let tracker = StageTracker::new();
        let candidates = self.retrieve_and_fuse(&query, &tracker).await?;
        let ids: Vec<String> = candidates.fused.iter().map(|f| f.doc_id.clone()).collect();
        tracker.enter(PipelineStage::Faceting);
        Ok(self.facet_counts(&ids, candidates.metadata.as_ref()))
    }

    async fn run(&self, query: &Query, tracker: &StageTracker) -> Result<SearchResponse> {
        query.validate()?;
        if let Some(w) = query.weights() {
            HybridWeights::explicit(w.keyword, w.dense, w.sparse)?;
        }
        let rerank = query.rerank().unwrap_or(self.rerank_by_default);

        tracker.enter(PipelineStage::CacheCheck);
        let key = CacheKey::derive(query, rerank);
        if let Some(mut cached) = self.cache.get::<SearchResponse>(&key) {
            tracker.enter(PipelineStage::CacheHit);
            cached.cache_hit = true;
            cached.took_ms = tracker.elapsed_ms();
            tracker.enter(PipelineStage::Respond);
            return Ok(cached);
        }
        tracker.enter(PipelineStage::CacheMiss);

        let mut response = if query.is_filters_only() {
            self.filters_only(query, tracker)
        } else {
            self.full_pipeline(query, rerank, tracker).await?
        };

        tracker.enter(PipelineStage::CacheWrite);
        self.cache.put(key, &response);

        response.took_ms = tracker.elapsed_ms();
        tracker.enter(PipelineStage::Respond);
        info!(
            results = response.results.len(),
            total = response.total_matched,
            degraded = !response.backends_unavailable.is_empty(),
            took_ms = response.took_ms,
            "search complete"
        );
        Ok(response)
    }

    async fn full_pipeline(
        &self,
        query: &Query,
        rerank: bool,
        tracker: &StageTracker,
    ) -> Result<SearchResponse> {
        let candidates = self.retrieve_and_fuse(query, tracker).await?;
        let FusedCandidates {
            fused,
            decision,
            backends_used,
            backends_unavailable,
            metadata,
        } = candidates;

        let total_matched = fused.len();
        let matched_ids: Vec<String> = fused.iter().map(|f| f.doc_id.clone()).collect();

        let outcome = if rerank {
            tracker.enter(PipelineStage::Reranking);
            match &self.texts {
                Some(texts) => self.rerank.rerank(query.text(), fused, texts.as_ref()).await,
                None => skip_rerank(fused, "no document text source configured"),
            }
        } else {
            RerankOutcome {
                candidates: fused
                    .into_iter()
                    .map(|fusion| RerankedCandidate {
                        fusion,
                        rerank_score: None,
                    })
                    .collect(),
                applied: false,
                skip_reason: None,
            }
        };
        if let Some(reason) = &outcome.skip_reason {
            debug!(reason = %reason, "rerank skipped");
        }

        tracker.enter(PipelineStage::Faceting);
        let facets = self.facet_counts(&matched_ids, metadata.as_ref());

        let results = outcome
            .candidates
            .into_iter()
            .skip(query.offset())
            .take(query.limit())
            .map(|candidate| self.to_result(query.text(), candidate))
            .collect();

        Ok(SearchResponse {
            results,
            facets,
            total_matched,
            backends_used,
            backends_unavailable,
            weights: Some(decision),
            rerank_applied: outcome.applied,
            rerank_skipped: outcome.skip_reason.is_some(),
            rerank_skip_reason: outcome.skip_reason,
            cache_hit: false,
            took_ms: 0,
        })
    }

    async fn retrieve_and_fuse(
        &self,
        query: &Query,
        tracker: &StageTracker,
    ) -> Result<FusedCandidates> {
        tracker.enter(PipelineStage::Retrieving);
        let per_backend_k = self
            .retrieval
            .per_backend_k_for(query.offset(), query.limit());
        let report = match self.retriever.retrieve(query.text(), per_backend_k).await {
            Ok(report) => report,
            Err(err) => {
                tracker.enter(PipelineStage::Failed);
                error!(error = %err, "search failed");
                return Err(err);
            }
        };

        tracker.enter(PipelineStage::Weighting);
        let available = report.available();
        let backends_unavailable = report.unavailable();
        let features = self.characterizer.characterize(query.text());
        let decision = self
            .weight_policy
            .resolve(query.weights(), &features, &available);
        debug!(
            weights = %decision.weights.canonical_key(),
            rules = ?decision.rules_fired,
            explicit = decision.explicit,
            "weights selected"
        );

        let mut lists = report.into_lists();
        let filters = query.filters();
        let metadata = if filters.is_empty() {
            None
        } else {
            let mut seen = HashSet::new();
            let ids: Vec<String> = lists
                .iter()
                .flat_map(|list| list.ids())
                .filter(|id| seen.insert(*id))
                .map(ToString::to_string)
                .collect();
            Some(self.metadata.get_facet_values(&ids))
        };

        if let (FilterStage::PreFusion, Some(meta)) = (self.filter_stage, &metadata) {
            for list in &mut lists {
                list.retain(|doc| meta.get(&doc.doc_id).is_some_and(|m| filters.matches(m)));
            }
        }

        tracker.enter(PipelineStage::Fusing);
        let mut fused = self.fusion.fuse(&lists, &decision.weights);

        if let (FilterStage::PostFusion, Some(meta)) = (self.filter_stage, &metadata) {
            let before = fused.len();
            fused.retain(|f| meta.get(&f.doc_id).is_some_and(|m| filters.matches(m)));
            debug!(before, after = fused.len(), "post-fusion filter");
        }

        Ok(FusedCandidates {
            fused,
            decision,
            backends_used: available.into_iter().collect(),
            backends_unavailable,
            metadata,
        })
    }

    /// Empty text with filters: every matching document, best quality first.
    fn filters_only(&self, query: &Query, tracker: &StageTracker) -> SearchResponse {
        let (ids, metadata) = self.filtered_universe(query.filters());

        tracker.enter(PipelineStage::Faceting);
        let facets = self.facets.aggregate_metadata(&ids, &metadata);

        let results = ids
            .iter()
            .enumerate()
            .skip(query.offset())
            .take(query.limit())
            .map(|(i, id)| RankedResult {
                doc_id: id.clone(),
                score: metadata.get(id).map_or(0.0, |m| m.quality),
                rerank_score: None,
                fusion_rank: i + 1,
                breakdown: ScoreBreakdown::default(),
                snippet: self.snippet(id, ""),
            })
            .collect();

        SearchResponse {
            results,
            facets,
            total_matched: ids.len(),
            backends_used: Vec::new(),
            backends_unavailable: Vec::new(),
            weights: None,
            rerank_applied: false,
            rerank_skipped: false,
            rerank_skip_reason: None,
            cache_hit: false,
            took_ms: 0,
        }
    }

    /// Matching ids ordered by quality descending, then id.
    fn filtered_universe(
        &self,
        filters: &SearchFilters,
    ) -> (Vec<String>, HashMap<String, DocumentMetadata>) {
        let all = self.metadata.all_ids();
        let metadata = self.metadata.get_facet_values(&all);
        let mut ids = filters.retain_matching(&all, &metadata);
        ids.sort_by(|a, b| {
            let qa = metadata.get(a).map_or(0.0, |m| m.quality);
            let qb = metadata.get(b).map_or(0.0, |m| m.quality);
            qb.total_cmp(&qa).then_with(|| a.cmp(b))
        });
        (ids, metadata)
    }

    fn facet_counts(
        &self,
        ids: &[String],
        prefetched: Option<&HashMap<String, DocumentMetadata>>,
    ) -> Facets {
        match prefetched {
            Some(metadata) => self.facets.aggregate_metadata(ids, metadata),
            None => self.facets.aggregate(ids, self.metadata.as_ref()),
        }
    }

    fn to_result(&self, text: &str, candidate: RerankedCandidate) -> RankedResult {
        let RerankedCandidate {
            fusion,
            rerank_score,
        } = candidate;
        let snippet = self.snippet(&fusion.doc_id, text);
        RankedResult {
            doc_id: fusion.doc_id,
            score: fusion.score,
            rerank_score,
            fusion_rank: fusion.fusion_rank,
            breakdown: ScoreBreakdown {
                ranks: fusion.ranks,
                contributions: fusion.contributions,
            },
            snippet,
        }
    }

    fn snippet(&self, doc_id: &str, text: &str) -> Option<Snippet> {
        self.texts
            .as_ref()
            .and_then(|texts| texts.document_text(doc_id))
            .and_then(|body| self.snippets.build(&body, text))
    }
}

fn skip_rerank(fused: Vec<FusionScore>, reason: &str) -> RerankOutcome {
    RerankOutcome {
        candidates: fused
            .into_iter()
            .map(|fusion| RerankedCandidate {
                fusion,
                rerank_score: None,
            })
            .collect(),
        applied: false,
        skip_reason: Some(reason.to_string()),
    }
}

/// Wires backends, stores and config into a [`SearchOrchestrator`].
#[derive(Default)]
pub struct SearchOrchestratorBuilder {
    config: Config,
    keyword: Option<Arc<dyn KeywordBackend>>,
    dense: Option<(Arc<dyn QueryEmbedder>, Arc<dyn DenseBackend>)>,
    sparse: Option<(Arc<dyn SparseEncoder>, Arc<dyn SparseBackend>)>,
    metadata: Option<Arc<dyn DocumentMetadataStore>>,
    texts: Option<Arc<dyn DocumentTextSource>>,
    reranker: Option<Arc<dyn Reranker>>,
    cache: Option<Arc<ResultCache>>,
    weight_policy: Option<AdaptiveWeightPolicy>,
    characterizer: Option<QueryCharacterizer>,
}

impl SearchOrchestratorBuilder {
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn keyword(mut self, backend: Arc<dyn KeywordBackend>) -> Self {
        self.keyword = Some(backend);
        self
    }

    #[must_use]
    pub fn dense(mut self, embedder: Arc<dyn QueryEmbedder>, index: Arc<dyn DenseBackend>) -> Self {
        self.dense = Some((embedder, index));
        self
    }

    #[must_use]
    pub fn sparse(mut self, encoder: Arc<dyn SparseEncoder>, index: Arc<dyn SparseBackend>) -> Self {
        self.sparse = Some((encoder, index));
        self
    }

    /// One store serving both metadata and text.
    #[must_use]
    pub fn documents<S>(mut self, store: Arc<S>) -> Self
    where
        S: DocumentMetadataStore + DocumentTextSource + 'static,
    {
        self.metadata = Some(store.clone());
        self.texts = Some(store);
        self
    }

    #[must_use]
    pub fn metadata_store(mut self, store: Arc<dyn DocumentMetadataStore>) -> Self {
        self.metadata = Some(store);
        self
    }

    #[must_use]
    pub fn text_source(mut self, texts: Arc<dyn DocumentTextSource>) -> Self {
        self.texts = Some(texts);
        self
    }

    #[must_use]
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Share a cache across orchestrators.
    #[must_use]
    pub fn cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn weight_policy(mut self, policy: AdaptiveWeightPolicy) -> Self {
        self.weight_policy = Some(policy);
        self
    }

    #[must_use]
    pub fn characterizer(mut self, characterizer: QueryCharacterizer) -> Self {
        self.characterizer = Some(characterizer);
        self
    }

    pub fn build(self) -> Result<SearchOrchestrator> {
        let config = self.config;
        config.validate()?;

        let metadata = self
            .metadata
            .ok_or_else(|| SearchError::MissingConfig("document metadata store".to_string()))?;

        let mut retriever = CandidateRetriever::new().with_timeout(config.retrieval.timeout());
        if let Some(keyword) = self.keyword {
            retriever = retriever.with_keyword(keyword);
        }
        if let Some((embedder, index)) = self.dense {
            retriever = retriever.with_dense(embedder, index);
        }
        if let Some((encoder, index)) = self.sparse {
            retriever = retriever.with_sparse(encoder, index);
        }

        let weight_policy = match self.weight_policy {
            Some(policy) => policy,
            None => AdaptiveWeightPolicy::from_config(&config.weights)?,
        };
        let characterizer = self
            .characterizer
            .unwrap_or_else(|| QueryCharacterizer::new(config.weights.short_query_tokens));

        let rerank = RerankStage::new(self.reranker)
            .with_top_n(config.rerank.top_n)
            .with_min_candidates(config.rerank.min_candidates)
            .with_batch_size(config.rerank.batch_size)
            .with_timeout(config.rerank.timeout());

        let cache = self.cache.unwrap_or_else(|| {
            Arc::new(if config.cache.enabled {
                ResultCache::new(config.cache.ttl(), config.cache.max_entries)
            } else {
                ResultCache::disabled()
            })
        });

        debug!(
            rrf_k = config.fusion.rrf_k,
            filter_stage = ?config.fusion.filter_stage,
            reranker = rerank.has_reranker(),
            cache = cache.is_enabled(),
            "search orchestrator built"
        );

        Ok(SearchOrchestrator {
            retriever,
            characterizer,
            weight_policy,
            fusion: FusionEngine::new(config.fusion.rrf_k),
            rerank,
            rerank_by_default: config.rerank.enabled,
            facets: FacetAggregator::new(
                config.facets.definitions(),
                config.facets.max_values_per_facet,
            ),
            cache,
            metadata,
            texts: self.texts,
            snippets: SnippetBuilder::default(),
            retrieval: config.retrieval,
            filter_stage: config.fusion.filter_stage,
        })
    }
}
