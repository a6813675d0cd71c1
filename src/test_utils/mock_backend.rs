//! Scripted retrieval backends and rerankers for tests.
//!
//! A [`MockBackend`] implements all three backend traits plus both query
//! encoders, so one instance can stand in for an encoder and its index.
//! Call counts let tests assert that a cached response skipped retrieval.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, SearchError};
use crate::search::backend::{
    BackendKind, DenseBackend, KeywordBackend, QueryEmbedder, RankedList, SparseBackend,
    SparseEncoder, SparseVector,
};
use crate::search::rerank::{RerankDocument, Reranker};

/// What a [`MockBackend`] does when searched.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Return these ids in rank order
    Return(Vec<String>),
    /// Fail with a backend error carrying this reason
    Fail(String),
    /// Sleep, then return these ids
    Delay(Duration, Vec<String>),
}

/// Backend double with a fixed behavior.
#[derive(Debug)]
pub struct MockBackend {
    kind: BackendKind,
    behavior: MockBehavior,
    calls: AtomicUsize,
}

impl MockBackend {
    pub fn new(kind: BackendKind, behavior: MockBehavior) -> Self {
        Self {
            kind,
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn returning(kind: BackendKind, ids: &[&str]) -> Self {
        Self::new(
            kind,
            MockBehavior::Return(ids.iter().map(|id| (*id).to_string()).collect()),
        )
    }

    pub fn failing(kind: BackendKind, reason: &str) -> Self {
        Self::new(kind, MockBehavior::Fail(reason.to_string()))
    }

    /// Never answers within any sane timeout.
    pub fn hanging(kind: BackendKind) -> Self {
        Self::new(kind, MockBehavior::Delay(Duration::from_secs(3600), Vec::new()))
    }

    pub const fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Number of searches served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn respond(&self, k: usize) -> Result<RankedList> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let ids = match &self.behavior {
            MockBehavior::Return(ids) => ids.clone(),
            MockBehavior::Fail(reason) => {
                return Err(SearchError::BackendUnavailable {
                    backend: self.kind,
                    reason: reason.clone(),
                });
            }
            MockBehavior::Delay(delay, ids) => {
                tokio::time::sleep(*delay).await;
                ids.clone()
            }
        };
        let mut list = RankedList::from_ids(self.kind, ids);
        list.truncate(k);
        Ok(list)
    }
}

#[async_trait]
impl KeywordBackend for MockBackend {
    async fn search(&self, _text: &str, k: usize) -> Result<RankedList> {
        self.respond(k).await
    }
}

#[async_trait]
impl DenseBackend for MockBackend {
    async fn search(&self, _embedding: &[f32], k: usize) -> Result<RankedList> {
        self.respond(k).await
    }
}

#[async_trait]
impl SparseBackend for MockBackend {
    async fn search(&self, _vector: &SparseVector, k: usize) -> Result<RankedList> {
        self.respond(k).await
    }
}

#[async_trait]
impl QueryEmbedder for MockBackend {
    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0])
    }
}

#[async_trait]
impl SparseEncoder for MockBackend {
    async fn encode_query(&self, _text: &str) -> Result<SparseVector> {
        Ok(SparseVector::new(vec![(0, 1.0)]))
    }
}

/// Reranker returning fixed scores per document id (0.0 when unknown).
#[derive(Debug, Default)]
pub struct MockReranker {
    scores: HashMap<String, f32>,
    fail_with: Option<String>,
    calls: AtomicUsize,
    max_batch: AtomicUsize,
    scored: AtomicUsize,
}

impl MockReranker {
    pub fn with_scores(scores: &[(&str, f32)]) -> Self {
        Self {
            scores: scores
                .iter()
                .map(|(id, score)| ((*id).to_string(), *score))
                .collect(),
            ..Self::default()
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            fail_with: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// Number of batches scored.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Largest batch seen.
    pub fn max_batch(&self) -> usize {
        self.max_batch.load(Ordering::SeqCst)
    }

    /// Total documents scored across batches.
    pub fn scored(&self) -> usize {
        self.scored.load(Ordering::SeqCst)
    }
}

impl Reranker for MockReranker {
    fn id(&self) -> &str {
        "mock"
    }

    fn score(&self, _query: &str, _text: &str) -> Result<f32> {
        match &self.fail_with {
            Some(reason) => Err(SearchError::RerankerUnavailable(reason.clone())),
            None => Ok(0.0),
        }
    }

    fn score_batch(&self, _query: &str, docs: &[RerankDocument]) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.max_batch.fetch_max(docs.len(), Ordering::SeqCst);
        self.scored.fetch_add(docs.len(), Ordering::SeqCst);
        if let Some(reason) = &self.fail_with {
            return Err(SearchError::RerankerUnavailable(reason.clone()));
        }
        Ok(docs
            .iter()
            .map(|doc| self.scores.get(&doc.doc_id).copied().unwrap_or(0.0))
            .collect())
    }
}
