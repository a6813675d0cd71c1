//! Retrieval backend interfaces
//!
//! Every retrieval strategy (keyword, dense, sparse) hands back a
//! [`RankedList`]: candidates in descending relevance, with rank equal to
//! the 1-indexed position. Raw scores keep whatever scale the backend uses;
//! fusion only ever looks at ranks.

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

/// Which retrieval strategy produced a candidate.
///
/// Declaration order is the canonical processing order (keyword, dense,
/// sparse); fusion sums contributions in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Lexical BM25-style matching
    Keyword,
    /// Cosine similarity over dense embeddings
    Dense,
    /// Dot product over learned sparse term weights
    Sparse,
}

impl BackendKind {
    /// All backends in canonical order.
    pub const ALL: [Self; 3] = [Self::Keyword, Self::Dense, Self::Sparse];

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "keyword" | "lexical" | "bm25" => Some(Self::Keyword),
            "dense" | "semantic" | "vector" => Some(Self::Dense),
            "sparse" | "splade" => Some(Self::Sparse),
            _ => None,
        }
    }

    /// Convert to string
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Dense => "dense",
            Self::Sparse => "sparse",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single candidate returned by one backend call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateDoc {
    /// Document identifier
    pub doc_id: String,
    /// Raw backend score (backend-specific scale)
    pub score: f32,
    /// Backend that produced this candidate
    pub backend: BackendKind,
}

/// Ordered candidates from one backend for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedList {
    backend: BackendKind,
    docs: Vec<CandidateDoc>,
}

impl RankedList {
    /// Empty list for a backend.
    pub const fn empty(backend: BackendKind) -> Self {
        Self {
            backend,
            docs: Vec::new(),
        }
    }

    /// Build from `(doc_id, score)` pairs already in ranked order.
    ///
    /// A document repeated further down the list keeps only its best rank.
    pub fn from_scored<I, S>(backend: BackendKind, scored: I) -> Self
    where
        I: IntoIterator<Item = (S, f32)>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let docs = scored
            .into_iter()
            .map(|(doc_id, score)| CandidateDoc {
                doc_id: doc_id.into(),
                score,
                backend,
            })
            .filter(|doc| seen.insert(doc.doc_id.clone()))
            .collect();
        Self { backend, docs }
    }

    /// Build from bare ids in ranked order. Scores are the reciprocal rank.
    pub fn from_ids<I, S>(backend: BackendKind, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_scored(
            backend,
            ids.into_iter()
                .enumerate()
                .map(|(i, id)| (id, 1.0 / (i + 1) as f32)),
        )
    }

    pub const fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn docs(&self) -> &[CandidateDoc] {
        &self.docs
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Iterate `(rank, candidate)` with 1-indexed ranks.
    pub fn ranked(&self) -> impl Iterator<Item = (usize, &CandidateDoc)> {
        self.docs.iter().enumerate().map(|(i, doc)| (i + 1, doc))
    }

    /// 1-indexed rank of a document, if present.
    pub fn rank_of(&self, doc_id: &str) -> Option<usize> {
        self.docs
            .iter()
            .position(|doc| doc.doc_id == doc_id)
            .map(|i| i + 1)
    }

    /// Keep only the top `k` candidates.
    pub fn truncate(&mut self, k: usize) {
        self.docs.truncate(k);
    }

    /// Drop candidates failing the predicate; survivors are re-ranked by
    /// their new positions.
    pub fn retain(&mut self, keep: impl FnMut(&CandidateDoc) -> bool) {
        self.docs.retain(keep);
    }

    /// Document ids in rank order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.docs.iter().map(|doc| doc.doc_id.as_str())
    }
}

/// Sparse query/document vector: `(term_id, weight)` pairs sorted by term id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    entries: Vec<(u32, f32)>,
}

impl SparseVector {
    /// Build from arbitrary pairs. Duplicate term ids are summed and
    /// zero weights are dropped.
    pub fn new(mut entries: Vec<(u32, f32)>) -> Self {
        entries.sort_by_key(|(term, _)| *term);
        let mut merged: Vec<(u32, f32)> = Vec::with_capacity(entries.len());
        for (term, weight) in entries {
            match merged.last_mut() {
                Some((last, acc)) if *last == term => *acc += weight,
                _ => merged.push((term, weight)),
            }
        }
        merged.retain(|(_, w)| *w != 0.0);
        Self { entries: merged }
    }

    pub fn entries(&self) -> &[(u32, f32)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Dot product via a merge walk over both sorted term lists.
    pub fn dot(&self, other: &Self) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.entries.len() && j < other.entries.len() {
            let (ta, wa) = self.entries[i];
            let (tb, wb) = other.entries[j];
            match ta.cmp(&tb) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += wa * wb;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// Runs index work on the blocking pool, keeping the calling task free
/// so its timeout can still fire.
pub(crate) async fn search_blocking<T, F>(backend: BackendKind, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|join| SearchError::BackendUnavailable {
            backend,
            reason: format!("search task failed: {join}"),
        })?
}

/// Lexical retrieval over a full-text index.
#[async_trait]
pub trait KeywordBackend: Send + Sync {
    async fn search(&self, text: &str, k: usize) -> Result<RankedList>;
}

/// Nearest-neighbor retrieval over pre-computed document embeddings.
#[async_trait]
pub trait DenseBackend: Send + Sync {
    async fn search(&self, embedding: &[f32], k: usize) -> Result<RankedList>;
}

/// Learned sparse retrieval.
#[async_trait]
pub trait SparseBackend: Send + Sync {
    async fn search(&self, vector: &SparseVector, k: usize) -> Result<RankedList>;
}

/// Produces the dense query embedding handed to a [`DenseBackend`].
#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// Produces the sparse query vector handed to a [`SparseBackend`].
#[async_trait]
pub trait SparseEncoder: Send + Sync {
    async fn encode_query(&self, text: &str) -> Result<SparseVector>;
}
