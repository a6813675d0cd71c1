//! Hash embeddings and the in-memory dense index
//!
//! FNV-1a feature hashing over unigrams and bigrams, L2 normalized.
//! No model dependencies, fully deterministic. [`HashEmbedder`] produces
//! query embeddings; [`VectorIndex`] answers nearest-neighbor queries by
//! cosine similarity (dot product of normalized vectors).

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Result, SearchError};
use crate::search::backend::{
    BackendKind, DenseBackend, QueryEmbedder, RankedList, search_blocking,
};
use crate::search::documents::DocumentStore;

/// Default embedding dimension.
pub const DEFAULT_DIMS: usize = 256;

/// Hash embedder using FNV-1a
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    dim: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dim: DEFAULT_DIMS }
    }
}

impl HashEmbedder {
    /// Create embedder with specified dimension
    pub const fn new(dim: usize) -> Self {
        Self { dim }
    }

    /// Embedding dimension
    pub const fn dims(&self) -> usize {
        self.dim
    }

    /// Embed text into vector
    pub fn embed(&self, text: &str) -> Vec<f32> {
        if self.dim == 0 {
            return Vec::new();
        }

        let tokens = tokenize(text);
        let mut embedding = vec![0.0; self.dim];

        if tokens.is_empty() {
            return embedding;
        }

        for token in &tokens {
            accumulate_embedding(&mut embedding, token, 1.0);
        }

        for window in tokens.windows(2) {
            let bigram = format!("{} {}", window[0], window[1]);
            accumulate_embedding(&mut embedding, &bigram, 0.5);
        }

        l2_normalize(&mut embedding);
        embedding
    }
}

#[async_trait]
impl QueryEmbedder for HashEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if self.dim == 0 {
            return Err(SearchError::BackendUnavailable {
                backend: BackendKind::Dense,
                reason: "embedder has zero dimensions".into(),
            });
        }
        Ok(self.embed(text))
    }
}

/// In-memory vector index. Clones share the embedding table.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    embeddings: Arc<HashMap<String, Vec<f32>>>,
    dims: usize,
}

impl VectorIndex {
    /// Create a new empty vector index
    pub fn new(dims: usize) -> Self {
        Self {
            embeddings: Arc::new(HashMap::new()),
            dims,
        }
    }

    /// Embed every document in the store.
    pub fn build(store: &DocumentStore, embedder: &HashEmbedder) -> Self {
        let mut index = Self::new(embedder.dims());
        for doc in store.documents() {
            index.insert(doc.id.clone(), embedder.embed(&doc.full_text()));
        }
        index
    }

    pub const fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    /// Insert or replace an embedding. Returns false on dimension mismatch.
    pub fn insert(&mut self, doc_id: impl Into<String>, embedding: Vec<f32>) -> bool {
        if embedding.len() != self.dims {
            return false;
        }
        Arc::make_mut(&mut self.embeddings).insert(doc_id.into(), embedding);
        true
    }

    /// Cosine similarity search (expects embeddings to be L2 normalized).
    ///
    /// Documents with no positive similarity are not returned.
    pub fn top_k(&self, query_embedding: &[f32], limit: usize) -> Vec<(String, f32)> {
        let mut scores: Vec<(String, f32)> = self
            .embeddings
            .iter()
            .map(|(id, emb)| (id.clone(), dot_product(query_embedding, emb)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scores.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scores.truncate(limit);
        scores
    }
}

#[async_trait]
impl DenseBackend for VectorIndex {
    async fn search(&self, embedding: &[f32], k: usize) -> Result<RankedList> {
        if embedding.len() != self.dims {
            return Err(SearchError::BackendUnavailable {
                backend: BackendKind::Dense,
                reason: format!(
                    "query embedding has {} dimensions, index expects {}",
                    embedding.len(),
                    self.dims
                ),
            });
        }
        let index = self.clone();
        let embedding = embedding.to_vec();
        search_blocking(BackendKind::Dense, move || {
            Ok(RankedList::from_scored(
                BackendKind::Dense,
                index.top_k(&embedding, k),
            ))
        })
        .await
    }
}

/// Lowercased alphanumeric tokens of at least two characters.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    lowered
        .split(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#'))
        .filter(|token| token.len() >= 2)
        .map(ToString::to_string)
        .collect()
}

fn accumulate_embedding(embedding: &mut [f32], token: &str, weight: f32) {
    let token_hash = fnv1a_hash(token.as_bytes());

    for i in 0..embedding.len() {
        let dim_hash = fnv1a_hash_with_salt(token_hash, i as u64);
        let sign = if dim_hash & 1 == 0 { weight } else { -weight };
        let dim = ((dim_hash >> 1) as usize) % embedding.len();
        embedding[dim] += sign;
    }
}

fn fnv1a_hash_with_salt(seed: u64, salt: u64) -> u64 {
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&seed.to_le_bytes());
    bytes[8..].copy_from_slice(&salt.to_le_bytes());
    fnv1a_hash(&bytes)
}

pub(crate) fn fnv1a_hash(data: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for byte in data {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn l2_normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vec.iter_mut() {
            *value /= norm;
        }
    }
}

fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
