use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};
use crate::search::facets::{DEFAULT_QUALITY_EDGES, FacetDefinition};
use crate::search::filters::FilterStage;
use crate::search::weights::{HybridWeights, UnavailablePolicy};

/// Facet names taken by the classification and quality facets.
const RESERVED_FACET_NAMES: [&str; 2] = ["classification", "quality"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub weights: WeightsConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub facets: FacetsConfig,
}

impl Config {
    /// Defaults, then one config file, then `HS_*` environment overrides.
    ///
    /// The file is `explicit_path`, else `$HS_CONFIG`, else
    /// `<config_dir>/hybrid-search/config.toml`. A missing file is fine.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var("HS_CONFIG").ok().map(PathBuf::from));

        let patch = match explicit {
            Some(path) => Self::load_patch(&path)?,
            None => Self::load_global()?,
        };
        if let Some(patch) = patch {
            config.merge_patch(patch);
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Parse a TOML document onto the defaults, without env overrides.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let patch: ConfigPatch =
            toml::from_str(raw).map_err(|err| SearchError::Config(format!("parse config: {err}")))?;
        let mut config = Self::default();
        config.merge_patch(patch);
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|err| SearchError::Config(format!("serialize config: {err}")))
    }

    fn load_global() -> Result<Option<ConfigPatch>> {
        let Some(dir) = dirs::config_dir() else {
            return Ok(None);
        };
        Self::load_patch(&dir.join("hybrid-search/config.toml"))
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| SearchError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw).map_err(|err| {
            SearchError::Config(format!("parse config {}: {err}", path.display()))
        })?;
        Ok(Some(patch))
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(patch) = patch.retrieval {
            self.retrieval.merge(patch);
        }
        if let Some(patch) = patch.fusion {
            self.fusion.merge(patch);
        }
        if let Some(patch) = patch.weights {
            self.weights.merge(patch);
        }
        if let Some(patch) = patch.rerank {
            self.rerank.merge(patch);
        }
        if let Some(patch) = patch.cache {
            self.cache.merge(patch);
        }
        if let Some(patch) = patch.facets {
            self.facets.merge(patch);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(value) = env_usize("HS_RETRIEVAL_PER_BACKEND_K")? {
            self.retrieval.per_backend_k = value;
        }
        if let Some(value) = env_u64("HS_RETRIEVAL_TIMEOUT_MS")? {
            self.retrieval.timeout_ms = value;
        }
        if let Some(value) = env_usize("HS_RETRIEVAL_CANDIDATE_MULTIPLIER")? {
            self.retrieval.candidate_multiplier = value;
        }

        if let Some(value) = env_f64("HS_FUSION_RRF_K")? {
            self.fusion.rrf_k = value;
        }
        if let Some(value) = env_string("HS_FUSION_FILTER_STAGE") {
            self.fusion.filter_stage = parse_filter_stage(&value)?;
        }

        if let Some(value) = env_f64("HS_WEIGHTS_KEYWORD")? {
            self.weights.keyword = value;
        }
        if let Some(value) = env_f64("HS_WEIGHTS_DENSE")? {
            self.weights.dense = value;
        }
        if let Some(value) = env_f64("HS_WEIGHTS_SPARSE")? {
            self.weights.sparse = value;
        }
        if let Some(value) = env_usize("HS_WEIGHTS_SHORT_QUERY_TOKENS")? {
            self.weights.short_query_tokens = value;
        }
        if let Some(value) = env_string("HS_WEIGHTS_UNAVAILABLE_POLICY") {
            self.weights.unavailable_policy = parse_unavailable_policy(&value)?;
        }

        if let Some(value) = env_bool("HS_RERANK_ENABLED") {
            self.rerank.enabled = value;
        }
        if let Some(value) = env_usize("HS_RERANK_TOP_N")? {
            self.rerank.top_n = value;
        }
        if let Some(value) = env_usize("HS_RERANK_MIN_CANDIDATES")? {
            self.rerank.min_candidates = value;
        }
        if let Some(value) = env_usize("HS_RERANK_BATCH_SIZE")? {
            self.rerank.batch_size = value;
        }
        if let Some(value) = env_u64("HS_RERANK_TIMEOUT_MS")? {
            self.rerank.timeout_ms = value;
        }

        if env_bool("HS_CACHE_DISABLED").unwrap_or(false) {
            self.cache.enabled = false;
        }
        if let Some(value) = env_bool("HS_CACHE_ENABLED") {
            self.cache.enabled = value;
        }
        if let Some(value) = env_u64("HS_CACHE_TTL_SECONDS")? {
            self.cache.ttl_seconds = value;
        }
        if let Some(value) = env_usize("HS_CACHE_MAX_ENTRIES")? {
            self.cache.max_entries = value;
        }

        if let Some(values) = env_list("HS_FACETS_TAG_FIELDS") {
            self.facets.tag_fields = values;
        }
        if let Some(values) = env_list("HS_FACETS_QUALITY_BUCKETS") {
            self.facets.quality_buckets = values
                .iter()
                .map(|v| {
                    v.parse::<f64>().map_err(|err| {
                        SearchError::Config(format!("invalid HS_FACETS_QUALITY_BUCKETS entry {v}: {err}"))
                    })
                })
                .collect::<Result<_>>()?;
        }
        if let Some(value) = env_usize("HS_FACETS_MAX_VALUES")? {
            self.facets.max_values_per_facet = value;
        }

        Ok(())
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.fusion.rrf_k.is_finite() && self.fusion.rrf_k > 0.0) {
            return Err(SearchError::Config(format!(
                "fusion.rrf_k must be positive, got {}",
                self.fusion.rrf_k
            )));
        }
        if self.retrieval.timeout_ms == 0 {
            return Err(SearchError::Config(
                "retrieval.timeout_ms must be positive".to_string(),
            ));
        }
        if self.retrieval.per_backend_k == 0 {
            return Err(SearchError::Config(
                "retrieval.per_backend_k must be positive".to_string(),
            ));
        }
        if self.rerank.top_n == 0 {
            return Err(SearchError::Config("rerank.top_n must be positive".to_string()));
        }
        if self.rerank.batch_size == 0 {
            return Err(SearchError::Config(
                "rerank.batch_size must be positive".to_string(),
            ));
        }
        if self.rerank.timeout_ms == 0 {
            return Err(SearchError::Config(
                "rerank.timeout_ms must be positive".to_string(),
            ));
        }
        self.weights.base()?;
        for (key, triple) in &self.weights.fixed_fallback {
            HybridWeights::new(triple[0], triple[1], triple[2]).map_err(|err| {
                SearchError::Config(format!("weights.fixed_fallback.{key}: {err}"))
            })?;
        }
        if self
            .facets
            .quality_buckets
            .windows(2)
            .any(|pair| pair[0] >= pair[1])
            || self
                .facets
                .quality_buckets
                .iter()
                .any(|edge| !(0.0..=1.0).contains(edge))
        {
            return Err(SearchError::Config(
                "facets.quality_buckets must be ascending values in [0, 1]".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        for field in &self.facets.tag_fields {
            if field.trim().is_empty() {
                return Err(SearchError::Config(
                    "facets.tag_fields entries must not be empty".to_string(),
                ));
            }
            if RESERVED_FACET_NAMES.contains(&field.as_str()) {
                return Err(SearchError::Config(format!(
                    "facets.tag_fields: '{field}' is reserved for the built-in facet"
                )));
            }
            if !seen.insert(field.as_str()) {
                return Err(SearchError::Config(format!(
                    "facets.tag_fields: '{field}' is listed twice"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub per_backend_k: usize,
    #[serde(default)]
    pub timeout_ms: u64,
    #[serde(default)]
    pub candidate_multiplier: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            per_backend_k: 100,
            timeout_ms: 2000,
            candidate_multiplier: 3,
        }
    }
}

impl RetrievalConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Candidates requested from each backend for one page.
    pub fn per_backend_k_for(&self, offset: usize, limit: usize) -> usize {
        self.per_backend_k
            .max(offset.saturating_add(limit).saturating_mul(self.candidate_multiplier))
    }

    fn merge(&mut self, patch: RetrievalPatch) {
        if let Some(value) = patch.per_backend_k {
            self.per_backend_k = value;
        }
        if let Some(value) = patch.timeout_ms {
            self.timeout_ms = value;
        }
        if let Some(value) = patch.candidate_multiplier {
            self.candidate_multiplier = value;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    #[serde(default)]
    pub rrf_k: f64,
    #[serde(default)]
    pub filter_stage: FilterStage,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            filter_stage: FilterStage::PostFusion,
        }
    }
}

impl FusionConfig {
    fn merge(&mut self, patch: FusionPatch) {
        if let Some(value) = patch.rrf_k {
            self.rrf_k = value;
        }
        if let Some(value) = patch.filter_stage {
            self.filter_stage = value;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightsConfig {
    #[serde(default)]
    pub keyword: f64,
    #[serde(default)]
    pub dense: f64,
    #[serde(default)]
    pub sparse: f64,
    #[serde(default)]
    pub short_query_tokens: usize,
    #[serde(default)]
    pub unavailable_policy: UnavailablePolicy,
    /// Surviving-backend key (e.g. `keyword+sparse`) to weight triple
    #[serde(default)]
    pub fixed_fallback: BTreeMap<String, [f64; 3]>,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        let base = HybridWeights::default();
        Self {
            keyword: base.keyword,
            dense: base.dense,
            sparse: base.sparse,
            short_query_tokens: 2,
            unavailable_policy: UnavailablePolicy::Proportional,
            fixed_fallback: BTreeMap::new(),
        }
    }
}

impl WeightsConfig {
    /// Validated base weights.
    pub fn base(&self) -> Result<HybridWeights> {
        HybridWeights::new(self.keyword, self.dense, self.sparse)
            .map_err(|err| SearchError::Config(format!("weights: {err}")))
    }

    fn merge(&mut self, patch: WeightsPatch) {
        if let Some(value) = patch.keyword {
            self.keyword = value;
        }
        if let Some(value) = patch.dense {
            self.dense = value;
        }
        if let Some(value) = patch.sparse {
            self.sparse = value;
        }
        if let Some(value) = patch.short_query_tokens {
            self.short_query_tokens = value;
        }
        if let Some(value) = patch.unavailable_policy {
            self.unavailable_policy = value;
        }
        if let Some(table) = patch.fixed_fallback {
            self.fixed_fallback.extend(table);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerankConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub top_n: usize,
    #[serde(default)]
    pub min_candidates: usize,
    #[serde(default)]
    pub batch_size: usize,
    #[serde(default)]
    pub timeout_ms: u64,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            top_n: 100,
            min_candidates: 1,
            batch_size: 32,
            timeout_ms: 5000,
        }
    }
}

impl RerankConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn merge(&mut self, patch: RerankPatch) {
        if let Some(value) = patch.enabled {
            self.enabled = value;
        }
        if let Some(value) = patch.top_n {
            self.top_n = value;
        }
        if let Some(value) = patch.min_candidates {
            self.min_candidates = value;
        }
        if let Some(value) = patch.batch_size {
            self.batch_size = value;
        }
        if let Some(value) = patch.timeout_ms {
            self.timeout_ms = value;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub ttl_seconds: u64,
    #[serde(default)]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 300,
            max_entries: 10_000,
        }
    }
}

impl CacheConfig {
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    fn merge(&mut self, patch: CachePatch) {
        if let Some(value) = patch.enabled {
            self.enabled = value;
        }
        if let Some(value) = patch.ttl_seconds {
            self.ttl_seconds = value;
        }
        if let Some(value) = patch.max_entries {
            self.max_entries = value;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetsConfig {
    /// Tag fields counted as facets, in addition to classification and quality
    #[serde(default)]
    pub tag_fields: Vec<String>,
    #[serde(default)]
    pub quality_buckets: Vec<f64>,
    #[serde(default)]
    pub max_values_per_facet: usize,
}

impl Default for FacetsConfig {
    fn default() -> Self {
        Self {
            tag_fields: Vec::new(),
            quality_buckets: DEFAULT_QUALITY_EDGES.to_vec(),
            max_values_per_facet: 50,
        }
    }
}

impl FacetsConfig {
    /// Tag facets in configured order, then classification, then quality.
    pub fn definitions(&self) -> Vec<FacetDefinition> {
        self.tag_fields
            .iter()
            .map(|field| FacetDefinition::Tags {
                field: field.clone(),
            })
            .chain([
                FacetDefinition::Classification,
                FacetDefinition::QualityBucket {
                    edges: self.quality_buckets.clone(),
                },
            ])
            .collect()
    }

    fn merge(&mut self, patch: FacetsPatch) {
        if let Some(value) = patch.tag_fields {
            self.tag_fields = value;
        }
        if let Some(value) = patch.quality_buckets {
            self.quality_buckets = value;
        }
        if let Some(value) = patch.max_values_per_facet {
            self.max_values_per_facet = value;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigPatch {
    pub retrieval: Option<RetrievalPatch>,
    pub fusion: Option<FusionPatch>,
    pub weights: Option<WeightsPatch>,
    pub rerank: Option<RerankPatch>,
    pub cache: Option<CachePatch>,
    pub facets: Option<FacetsPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RetrievalPatch {
    pub per_backend_k: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub candidate_multiplier: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FusionPatch {
    pub rrf_k: Option<f64>,
    pub filter_stage: Option<FilterStage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct WeightsPatch {
    pub keyword: Option<f64>,
    pub dense: Option<f64>,
    pub sparse: Option<f64>,
    pub short_query_tokens: Option<usize>,
    pub unavailable_policy: Option<UnavailablePolicy>,
    pub fixed_fallback: Option<BTreeMap<String, [f64; 3]>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RerankPatch {
    pub enabled: Option<bool>,
    pub top_n: Option<usize>,
    pub min_candidates: Option<usize>,
    pub batch_size: Option<usize>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CachePatch {
    pub enabled: Option<bool>,
    pub ttl_seconds: Option<u64>,
    pub max_entries: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FacetsPatch {
    pub tag_fields: Option<Vec<String>>,
    pub quality_buckets: Option<Vec<f64>>,
    pub max_values_per_facet: Option<usize>,
}

fn parse_filter_stage(value: &str) -> Result<FilterStage> {
    match value.to_lowercase().replace('-', "_").as_str() {
        "pre_fusion" | "pre" => Ok(FilterStage::PreFusion),
        "post_fusion" | "post" => Ok(FilterStage::PostFusion),
        _ => Err(SearchError::Config(format!(
            "invalid filter stage {value} (expected pre_fusion|post_fusion)"
        ))),
    }
}

fn parse_unavailable_policy(value: &str) -> Result<UnavailablePolicy> {
    match value.to_lowercase().as_str() {
        "proportional" => Ok(UnavailablePolicy::Proportional),
        "fixed" => Ok(UnavailablePolicy::Fixed),
        _ => Err(SearchError::Config(format!(
            "invalid unavailable policy {value} (expected proportional|fixed)"
        ))),
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|value| {
        matches!(
            value.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_usize(key: &str) -> Result<Option<usize>> {
    match std::env::var(key) {
        Ok(value) => value.parse::<usize>().map(Some).map_err(|err| {
            SearchError::Config(format!("invalid {key} value {value}: {err}"))
        }),
        Err(_) => Ok(None),
    }
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(value) => value.parse::<u64>().map(Some).map_err(|err| {
            SearchError::Config(format!("invalid {key} value {value}: {err}"))
        }),
        Err(_) => Ok(None),
    }
}

fn env_f64(key: &str) -> Result<Option<f64>> {
    match std::env::var(key) {
        Ok(value) => value.parse::<f64>().map(Some).map_err(|err| {
            SearchError::Config(format!("invalid {key} value {value}: {err}"))
        }),
        Err(_) => Ok(None),
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(ToString::to_string)
            .collect()
    })
}
