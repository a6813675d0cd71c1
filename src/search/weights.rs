//! Fusion weights and the adaptive weight policy
//!
//! [`HybridWeights`] is always non-negative and sums to 1.0. The adaptive
//! policy starts from base weights, runs an ordered table of
//! [`WeightRule`]s over the query's [`QueryFeatures`], then zeroes the
//! weight of every backend that failed retrieval and renormalizes.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::WeightsConfig;
use crate::error::{Result, SearchError};
use crate::search::backend::BackendKind;
use crate::search::characterize::QueryFeatures;

/// Weight triple `(keyword, dense, sparse)` summing to 1.0.
///
/// Deserialization goes through [`HybridWeights::new`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWeights")]
pub struct HybridWeights {
    pub keyword: f64,
    pub dense: f64,
    pub sparse: f64,
}

#[derive(Deserialize)]
struct RawWeights {
    keyword: f64,
    dense: f64,
    sparse: f64,
}

impl TryFrom<RawWeights> for HybridWeights {
    type Error = SearchError;

    fn try_from(raw: RawWeights) -> Result<Self> {
        Self::new(raw.keyword, raw.dense, raw.sparse)
    }
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            keyword: 0.3,
            dense: 0.4,
            sparse: 0.3,
        }
    }
}

impl HybridWeights {
    /// Validate and renormalize. Rejects negative, non-finite and all-zero
    /// triples.
    pub fn new(keyword: f64, dense: f64, sparse: f64) -> Result<Self> {
        let raw = [keyword, dense, sparse];
        if let Some(bad) = raw.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(SearchError::InvalidWeights(format!(
                "weight {bad} must be finite and non-negative"
            )));
        }
        let sum: f64 = raw.iter().sum();
        if sum <= 0.0 {
            return Err(SearchError::InvalidWeights("weights must not all be zero".into()));
        }
        // already-normalized triples are kept bit-for-bit
        if (sum - 1.0).abs() <= 4.0 * f64::EPSILON {
            return Ok(Self::from_array(raw));
        }
        Ok(Self::from_array(raw.map(|w| w / sum)))
    }

    /// Caller-supplied override.
    pub fn explicit(keyword: f64, dense: f64, sparse: f64) -> Result<Self> {
        Self::new(keyword, dense, sparse)
    }

    /// Parse `keyword,dense,sparse`, e.g. `0.3,0.4,0.3`.
    pub fn parse(spec: &str) -> Result<Self> {
        let parts: Vec<f64> = spec
            .split(',')
            .map(|p| {
                p.trim().parse::<f64>().map_err(|_| {
                    SearchError::InvalidWeights(format!("'{}' is not a number", p.trim()))
                })
            })
            .collect::<Result<_>>()?;
        match parts.as_slice() {
            [k, d, s] => Self::new(*k, *d, *s),
            _ => Err(SearchError::InvalidWeights(format!(
                "expected 3 comma-separated weights, got {}",
                parts.len()
            ))),
        }
    }

    const fn from_array([keyword, dense, sparse]: [f64; 3]) -> Self {
        Self {
            keyword,
            dense,
            sparse,
        }
    }

    pub const fn as_array(&self) -> [f64; 3] {
        [self.keyword, self.dense, self.sparse]
    }

    pub const fn get(&self, backend: BackendKind) -> f64 {
        match backend {
            BackendKind::Keyword => self.keyword,
            BackendKind::Dense => self.dense,
            BackendKind::Sparse => self.sparse,
        }
    }

    pub fn sum(&self) -> f64 {
        self.keyword + self.dense + self.sparse
    }

    /// Zero unavailable backends and rescale the rest proportionally.
    ///
    /// When nothing available carries weight, the available backends share
    /// it equally. An empty `available` set leaves the weights untouched.
    pub fn restricted_to(&self, available: &BTreeSet<BackendKind>) -> Self {
        restrict(self.as_array(), available)
    }

    /// Stable text form used in cache keys.
    pub fn canonical_key(&self) -> String {
        format!("{:.12},{:.12},{:.12}", self.keyword, self.dense, self.sparse)
    }
}

fn index(backend: BackendKind) -> usize {
    match backend {
        BackendKind::Keyword => 0,
        BackendKind::Dense => 1,
        BackendKind::Sparse => 2,
    }
}

fn restrict(mut raw: [f64; 3], available: &BTreeSet<BackendKind>) -> HybridWeights {
    if !available.is_empty() {
        for backend in BackendKind::ALL {
            if !available.contains(&backend) {
                raw[index(backend)] = 0.0;
            }
        }
    }
    let sum: f64 = raw.iter().sum();
    if (sum - 1.0).abs() <= 4.0 * f64::EPSILON {
        return HybridWeights::from_array(raw);
    }
    if sum > 0.0 && sum.is_finite() {
        return HybridWeights::from_array(raw.map(|w| w / sum));
    }
    let share_among: Vec<BackendKind> = if available.is_empty() {
        BackendKind::ALL.to_vec()
    } else {
        available.iter().copied().collect()
    };
    let share = 1.0 / share_among.len() as f64;
    let mut equal = [0.0; 3];
    for backend in share_among {
        equal[index(backend)] = share;
    }
    HybridWeights::from_array(equal)
}

/// What happens to the weights of backends that failed retrieval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailablePolicy {
    /// Zero failed backends, scale the survivors proportionally
    #[default]
    Proportional,
    /// Use a configured triple for the surviving set, proportional if none
    Fixed,
}

/// Key of a fixed fallback entry: surviving backends joined with `+` in
/// canonical order, e.g. `keyword+sparse`.
pub fn fallback_key(available: &BTreeSet<BackendKind>) -> String {
    available
        .iter()
        .map(BackendKind::as_str)
        .collect::<Vec<_>>()
        .join("+")
}

/// Historical success rate per backend, each in [0.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackendStats {
    pub keyword: f64,
    pub dense: f64,
    pub sparse: f64,
}

impl Default for BackendStats {
    fn default() -> Self {
        Self {
            keyword: 1.0,
            dense: 1.0,
            sparse: 1.0,
        }
    }
}

impl BackendStats {
    fn factors(&self) -> [f64; 3] {
        [self.keyword, self.dense, self.sparse].map(|r| {
            if r.is_finite() {
                r.clamp(0.0, 1.0)
            } else {
                1.0
            }
        })
    }
}

/// One row of the adjustment table.
#[derive(Debug, Clone, Copy)]
pub struct WeightRule {
    pub name: &'static str,
    pub applies: fn(&QueryFeatures) -> bool,
    /// Added to `(keyword, dense, sparse)`; results floor at 0
    pub adjustment: [f64; 3],
}

impl WeightRule {
    /// Short (at or below the token threshold) or exact-match queries lean lexical.
    pub const SHORT_OR_SPECIFIC: Self = Self {
        name: "short_or_specific",
        applies: |f| f.is_short || f.is_specific(),
        adjustment: [0.2, -0.1, -0.1],
    };

    /// Longer interrogative queries lean semantic.
    pub const NATURAL_QUESTION: Self = Self {
        name: "natural_question",
        applies: QueryFeatures::is_natural_question,
        adjustment: [-0.15, 0.15, 0.0],
    };

    pub const DEFAULT_TABLE: [Self; 2] = [Self::SHORT_OR_SPECIFIC, Self::NATURAL_QUESTION];
}

/// How the weights for one request were chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightDecision {
    pub weights: HybridWeights,
    /// True when the caller supplied the weights
    pub explicit: bool,
    /// Names of adjustment rules that fired, in order
    pub rules_fired: Vec<String>,
    /// Backends whose weight was forced to zero
    pub zeroed: Vec<BackendKind>,
}

/// Maps query features and backend availability to a [`HybridWeights`].
#[derive(Debug, Clone)]
pub struct AdaptiveWeightPolicy {
    base: HybridWeights,
    rules: Vec<WeightRule>,
    unavailable_policy: UnavailablePolicy,
    fixed_fallback: BTreeMap<String, [f64; 3]>,
    stats: Option<BackendStats>,
}

impl Default for AdaptiveWeightPolicy {
    fn default() -> Self {
        Self::new(HybridWeights::default())
    }
}

impl AdaptiveWeightPolicy {
    pub fn new(base: HybridWeights) -> Self {
        Self {
            base,
            rules: WeightRule::DEFAULT_TABLE.to_vec(),
            unavailable_policy: UnavailablePolicy::Proportional,
            fixed_fallback: BTreeMap::new(),
            stats: None,
        }
    }

    pub fn from_config(config: &WeightsConfig) -> Result<Self> {
        let base = HybridWeights::new(config.keyword, config.dense, config.sparse)
            .map_err(|e| SearchError::Config(format!("weights: {e}")))?;
        Ok(Self::new(base)
            .with_unavailable_policy(config.unavailable_policy, config.fixed_fallback.clone()))
    }

    #[must_use]
    pub fn with_unavailable_policy(
        mut self,
        policy: UnavailablePolicy,
        fixed_fallback: BTreeMap<String, [f64; 3]>,
    ) -> Self {
        self.unavailable_policy = policy;
        self.fixed_fallback = fixed_fallback;
        self
    }

    /// Scale base weights by historical success rates before rules apply.
    #[must_use]
    pub const fn with_stats(mut self, stats: BackendStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Append a rule after the built-in table.
    #[must_use]
    pub fn with_rule(mut self, rule: WeightRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub const fn base(&self) -> &HybridWeights {
        &self.base
    }

    pub fn rules(&self) -> &[WeightRule] {
        &self.rules
    }

    /// Adaptive selection for a query.
    pub fn select_weights(
        &self,
        features: &QueryFeatures,
        available: &BTreeSet<BackendKind>,
    ) -> WeightDecision {
        let mut raw = self.base.as_array();
        if let Some(stats) = &self.stats {
            for (w, factor) in raw.iter_mut().zip(stats.factors()) {
                *w *= factor;
            }
        }

        let mut rules_fired = Vec::new();
        for rule in &self.rules {
            if (rule.applies)(features) {
                for (w, delta) in raw.iter_mut().zip(rule.adjustment) {
                    *w = (*w + delta).max(0.0);
                }
                rules_fired.push(rule.name.to_string());
            }
        }

        let zeroed = zeroed(available);
        let weights = match self.unavailable_policy {
            UnavailablePolicy::Fixed if !zeroed.is_empty() => self
                .fixed_fallback
                .get(&fallback_key(available))
                .map_or_else(|| restrict(raw, available), |t| restrict(*t, available)),
            _ => restrict(raw, available),
        };

        WeightDecision {
            weights,
            explicit: false,
            rules_fired,
            zeroed,
        }
    }

    /// Explicit weights when given, adaptive otherwise. Explicit weights
    /// still lose unavailable backends.
    pub fn resolve(
        &self,
        explicit: Option<&HybridWeights>,
        features: &QueryFeatures,
        available: &BTreeSet<BackendKind>,
    ) -> WeightDecision {
        match explicit {
            Some(weights) => WeightDecision {
                weights: weights.restricted_to(available),
                explicit: true,
                rules_fired: Vec::new(),
                zeroed: zeroed(available),
            },
            None => self.select_weights(features, available),
        }
    }
}

fn zeroed(available: &BTreeSet<BackendKind>) -> Vec<BackendKind> {
    if available.is_empty() {
        return Vec::new();
    }
    BackendKind::ALL
        .into_iter()
        .filter(|b| !available.contains(b))
        .collect()
}
