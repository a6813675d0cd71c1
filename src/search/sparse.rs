//! Sparse term-weight encoding and the in-memory sparse index
//!
//! Terms are hashed into a fixed id space. Query weights are log-scaled
//! term frequencies; document weights are additionally scaled by inverse
//! document frequency computed when the index is built. Scoring is a dot
//! product accumulated over posting lists.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::search::backend::{
    BackendKind, RankedList, SparseBackend, SparseEncoder, SparseVector, search_blocking,
};
use crate::search::documents::DocumentStore;
use crate::search::embeddings::{fnv1a_hash, tokenize};

/// Size of the hashed term id space.
pub const DEFAULT_TERM_SPACE: u32 = 1 << 20;

/// Log-scaled hashed term frequencies.
#[derive(Debug, Clone, Copy)]
pub struct TermWeightEncoder {
    term_space: u32,
}

impl Default for TermWeightEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_TERM_SPACE)
    }
}

impl TermWeightEncoder {
    pub const fn new(term_space: u32) -> Self {
        Self {
            term_space: if term_space == 0 { 1 } else { term_space },
        }
    }

    pub fn term_id(&self, term: &str) -> u32 {
        (fnv1a_hash(term.as_bytes()) % u64::from(self.term_space)) as u32
    }

    /// `1 + ln(tf)` per distinct term.
    pub fn encode(&self, text: &str) -> SparseVector {
        let mut tf: HashMap<u32, u32> = HashMap::new();
        for token in tokenize(text) {
            *tf.entry(self.term_id(&token)).or_default() += 1;
        }
        SparseVector::new(
            tf.into_iter()
                .map(|(term, count)| (term, 1.0 + (count as f32).ln()))
                .collect(),
        )
    }
}

#[async_trait]
impl SparseEncoder for TermWeightEncoder {
    async fn encode_query(&self, text: &str) -> Result<SparseVector> {
        Ok(self.encode(text))
    }
}

/// Inverted index over sparse document vectors.
#[derive(Debug, Clone, Default)]
pub struct SparseIndex {
    doc_ids: Arc<Vec<String>>,
    postings: Arc<HashMap<u32, Vec<(usize, f32)>>>,
}

impl SparseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode every document, weighting terms by `ln(1 + N / df)`.
    pub fn build(store: &DocumentStore, encoder: &TermWeightEncoder) -> Self {
        let vectors: Vec<(String, SparseVector)> = store
            .documents()
            .into_iter()
            .map(|doc| (doc.id.clone(), encoder.encode(&doc.full_text())))
            .collect();

        let mut df: HashMap<u32, usize> = HashMap::new();
        for (_, vector) in &vectors {
            for (term, _) in vector.entries() {
                *df.entry(*term).or_default() += 1;
            }
        }

        let n = vectors.len() as f32;
        let mut index = Self::new();
        for (doc_id, vector) in vectors {
            let weighted = vector
                .entries()
                .iter()
                .map(|(term, w)| {
                    let df = df.get(term).copied().unwrap_or(1) as f32;
                    (*term, w * (1.0 + n / df).ln())
                })
                .collect();
            index.insert(doc_id, &SparseVector::new(weighted));
        }
        index
    }

    /// Add a document vector. Ids are assumed unique.
    pub fn insert(&mut self, doc_id: impl Into<String>, vector: &SparseVector) {
        let slot = self.doc_ids.len();
        Arc::make_mut(&mut self.doc_ids).push(doc_id.into());
        let postings = Arc::make_mut(&mut self.postings);
        for (term, weight) in vector.entries() {
            postings.entry(*term).or_default().push((slot, *weight));
        }
    }

    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    /// Top documents by dot product; zero scores are dropped.
    pub fn top_k(&self, query: &SparseVector, k: usize) -> Vec<(String, f32)> {
        let mut acc: HashMap<usize, f32> = HashMap::new();
        for (term, qw) in query.entries() {
            if let Some(posting) = self.postings.get(term) {
                for (slot, dw) in posting {
                    *acc.entry(*slot).or_default() += qw * dw;
                }
            }
        }

        let mut scored: Vec<(String, f32)> = acc
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .map(|(slot, score)| (self.doc_ids[slot].clone(), score))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }
}

#[async_trait]
impl SparseBackend for SparseIndex {
    async fn search(&self, vector: &SparseVector, k: usize) -> Result<RankedList> {
        let index = self.clone();
        let vector = vector.clone();
        search_blocking(BackendKind::Sparse, move || {
            Ok(RankedList::from_scored(
                BackendKind::Sparse,
                index.top_k(&vector, k),
            ))
        })
        .await
    }
}
