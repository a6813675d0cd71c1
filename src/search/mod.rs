//! Hybrid search: keyword + dense + sparse retrieval, weighted RRF fusion,
//! optional reranking, facets and a response cache.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                 Query (normalized, validated)                  │
//! └────────────────────────────────────────────────────────────────┘
//!                                │  cache hit ──► response
//!                                ▼
//! ┌──────────────────┐  ┌──────────────────┐  ┌──────────────────┐
//! │    Bm25Index     │  │   VectorIndex    │  │   SparseIndex    │
//! │  (Tantivy BM25)  │  │ (hash embedding) │  │  (term weights)  │
//! └──────────────────┘  └──────────────────┘  └──────────────────┘
//!          └──────── CandidateRetriever (concurrent, timed) ───┘
//!                                │
//!              QueryCharacterizer → AdaptiveWeightPolicy
//!                                │
//!                                ▼
//!                ┌───────────────────────────────┐
//!                │  Weighted RRF (fusion.rs)     │
//!                └───────────────────────────────┘
//!                                │
//!                 filters → [RerankStage] → FacetAggregator
//!                                │
//!                                ▼
//!                  SearchResponse (+ ResultCache)
//! ```

pub mod backend;
pub mod cache;
pub mod characterize;
pub mod documents;
pub mod embeddings;
pub mod facets;
pub mod filters;
pub mod fusion;
pub mod orchestrator;
pub mod query;
pub mod rerank;
pub mod retriever;
pub mod snippet;
pub mod sparse;
pub mod tantivy;
pub mod weights;

// Re-export main types
pub use backend::{
    BackendKind, CandidateDoc, DenseBackend, KeywordBackend, QueryEmbedder, RankedList,
    SparseBackend, SparseEncoder, SparseVector,
};
pub use cache::{CacheKey, CacheStats, ResultCache};
pub use characterize::{QueryCharacterizer, QueryFeatures};
pub use documents::{
    Document, DocumentMetadata, DocumentMetadataStore, DocumentStore, DocumentTextSource,
};
pub use embeddings::{HashEmbedder, VectorIndex};
pub use facets::{FacetAggregator, FacetDefinition, FacetValue, Facets};
pub use filters::{DateRange, FilterStage, SearchFilters};
pub use fusion::{FusionEngine, FusionScore};
pub use orchestrator::{
    PipelineStage, RankedResult, ScoreBreakdown, SearchOrchestrator, SearchOrchestratorBuilder,
    SearchResponse,
};
pub use query::Query;
pub use rerank::{RerankOutcome, RerankStage, Reranker, TermOverlapReranker};
pub use retriever::{CandidateRetriever, RetrievalReport, UnavailableBackend};
pub use snippet::{Snippet, SnippetBuilder};
pub use sparse::{SparseIndex, TermWeightEncoder};
pub use self::tantivy::Bm25Index;
pub use weights::{AdaptiveWeightPolicy, HybridWeights, UnavailablePolicy, WeightDecision};
