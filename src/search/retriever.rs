//! Concurrent candidate retrieval
//!
//! The three backend calls run concurrently, each under its own timeout.
//! Query encoding (embedding, sparse encoding) happens inside the timed
//! call, so a slow encoder counts against its backend. A failed or timed
//! out backend degrades the request; only when every backend fails does
//! retrieval return [`SearchError::RetrievalUnavailable`].
//!
//! Dropping the future returned by [`CandidateRetriever::retrieve`] drops
//! all in-flight backend calls.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use crate::error::{Result, SearchError};
use crate::search::backend::{
    BackendKind, DenseBackend, KeywordBackend, QueryEmbedder, RankedList, SparseBackend,
    SparseEncoder,
};

/// Default per-backend timeout.
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of one backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalOutcome {
    Ok(RankedList),
    TimedOut,
    Failed(String),
}

/// One backend's outcome plus its latency.
#[derive(Debug, Clone)]
pub struct BackendOutcome {
    pub backend: BackendKind,
    pub outcome: RetrievalOutcome,
    pub elapsed: Duration,
}

impl BackendOutcome {
    pub const fn is_ok(&self) -> bool {
        matches!(self.outcome, RetrievalOutcome::Ok(_))
    }

    /// Failure description, `None` on success.
    pub fn failure_reason(&self, timeout: Duration) -> Option<String> {
        match &self.outcome {
            RetrievalOutcome::Ok(_) => None,
            RetrievalOutcome::TimedOut => Some(
                SearchError::BackendTimeout {
                    backend: self.backend,
                    timeout,
                }
                .to_string(),
            ),
            RetrievalOutcome::Failed(reason) => Some(reason.clone()),
        }
    }
}

/// A backend left out of fusion, as reported in responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableBackend {
    pub backend: BackendKind,
    pub reason: String,
}

/// Outcomes of all three backends, in canonical order.
#[derive(Debug, Clone)]
pub struct RetrievalReport {
    outcomes: Vec<BackendOutcome>,
    timeout: Duration,
}

impl RetrievalReport {
    pub fn outcomes(&self) -> &[BackendOutcome] {
        &self.outcomes
    }

    /// Backends that returned a list (possibly empty).
    pub fn available(&self) -> BTreeSet<BackendKind> {
        self.outcomes
            .iter()
            .filter(|o| o.is_ok())
            .map(|o| o.backend)
            .collect()
    }

    pub fn unavailable(&self) -> Vec<UnavailableBackend> {
        self.outcomes
            .iter()
            .filter_map(|o| {
                o.failure_reason(self.timeout).map(|reason| UnavailableBackend {
                    backend: o.backend,
                    reason,
                })
            })
            .collect()
    }

    pub fn all_failed(&self) -> bool {
        self.outcomes.iter().all(|o| !o.is_ok())
    }

    /// Ranked lists from successful backends.
    pub fn lists(&self) -> Vec<RankedList> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.outcome {
                RetrievalOutcome::Ok(list) => Some(list.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn into_lists(self) -> Vec<RankedList> {
        self.outcomes
            .into_iter()
            .filter_map(|o| match o.outcome {
                RetrievalOutcome::Ok(list) => Some(list),
                _ => None,
            })
            .collect()
    }
}

/// Dense retrieval: query embedder plus nearest-neighbor index.
#[derive(Clone)]
pub struct DenseRetrieval {
    pub embedder: Arc<dyn QueryEmbedder>,
    pub index: Arc<dyn DenseBackend>,
}

/// Sparse retrieval: query encoder plus sparse index.
#[derive(Clone)]
pub struct SparseRetrieval {
    pub encoder: Arc<dyn SparseEncoder>,
    pub index: Arc<dyn SparseBackend>,
}

/// Fans a query out to the keyword, dense and sparse backends.
#[derive(Clone)]
pub struct CandidateRetriever {
    keyword: Option<Arc<dyn KeywordBackend>>,
    dense: Option<DenseRetrieval>,
    sparse: Option<SparseRetrieval>,
    timeout: Duration,
}

impl Default for CandidateRetriever {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateRetriever {
    /// No backends; every call fails until some are attached.
    pub const fn new() -> Self {
        Self {
            keyword: None,
            dense: None,
            sparse: None,
            timeout: DEFAULT_BACKEND_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_keyword(mut self, backend: Arc<dyn KeywordBackend>) -> Self {
        self.keyword = Some(backend);
        self
    }

    #[must_use]
    pub fn with_dense(
        mut self,
        embedder: Arc<dyn QueryEmbedder>,
        index: Arc<dyn DenseBackend>,
    ) -> Self {
        self.dense = Some(DenseRetrieval { embedder, index });
        self
    }

    #[must_use]
    pub fn with_sparse(
        mut self,
        encoder: Arc<dyn SparseEncoder>,
        index: Arc<dyn SparseBackend>,
    ) -> Self {
        self.sparse = Some(SparseRetrieval { encoder, index });
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Query all backends concurrently and wait for each to finish or
    /// time out.
    #[instrument(level = "debug", skip(self), fields(timeout_ms = self.timeout.as_millis() as u64))]
    pub async fn retrieve(&self, text: &str, per_backend_k: usize) -> Result<RetrievalReport> {
        let (keyword, dense, sparse) = tokio::join!(
            self.timed(
                BackendKind::Keyword,
                per_backend_k,
                keyword_search(self.keyword.as_deref(), text, per_backend_k),
            ),
            self.timed(
                BackendKind::Dense,
                per_backend_k,
                dense_search(self.dense.as_ref(), text, per_backend_k),
            ),
            self.timed(
                BackendKind::Sparse,
                per_backend_k,
                sparse_search(self.sparse.as_ref(), text, per_backend_k),
            ),
        );

        let report = RetrievalReport {
            outcomes: vec![keyword, dense, sparse],
            timeout: self.timeout,
        };

        if report.all_failed() {
            let failures: Vec<String> = report
                .unavailable()
                .into_iter()
                .map(|u| format!("{}: {}", u.backend, u.reason))
                .collect();
            error!(failures = ?failures, "all retrieval backends failed");
            return Err(SearchError::RetrievalUnavailable { failures });
        }

        let candidates: usize = report.lists().iter().map(RankedList::len).sum();
        debug!(
            available = report.available().len(),
            candidates,
            "retrieval complete"
        );
        Ok(report)
    }

    async fn timed<F>(&self, backend: BackendKind, k: usize, call: F) -> BackendOutcome
    where
        F: Future<Output = Result<RankedList>>,
    {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(mut list)) if list.backend() == backend => {
                list.truncate(k);
                RetrievalOutcome::Ok(list)
            }
            Ok(Ok(list)) => {
                let reason = format!("returned a {} list", list.backend());
                warn!(%backend, %reason, "backend returned mislabelled results");
                RetrievalOutcome::Failed(reason)
            }
            Ok(Err(err)) => {
                warn!(%backend, error = %err, "backend failed");
                RetrievalOutcome::Failed(err.to_string())
            }
            Err(_) => {
                warn!(%backend, timeout_ms = self.timeout.as_millis() as u64, "backend timed out");
                RetrievalOutcome::TimedOut
            }
        };
        BackendOutcome {
            backend,
            outcome,
            elapsed: started.elapsed(),
        }
    }
}

fn not_configured(backend: BackendKind) -> SearchError {
    SearchError::BackendUnavailable {
        backend,
        reason: "not configured".into(),
    }
}

async fn keyword_search(
    backend: Option<&dyn KeywordBackend>,
    text: &str,
    k: usize,
) -> Result<RankedList> {
    let backend = backend.ok_or_else(|| not_configured(BackendKind::Keyword))?;
    backend.search(text, k).await
}

async fn dense_search(dense: Option<&DenseRetrieval>, text: &str, k: usize) -> Result<RankedList> {
    let dense = dense.ok_or_else(|| not_configured(BackendKind::Dense))?;
    let embedding = dense.embedder.embed_query(text).await?;
    dense.index.search(&embedding, k).await
}

async fn sparse_search(
    sparse: Option<&SparseRetrieval>,
    text: &str,
    k: usize,
) -> Result<RankedList> {
    let sparse = sparse.ok_or_else(|| not_configured(BackendKind::Sparse))?;
    let vector = sparse.encoder.encode_query(text).await?;
    sparse.index.search(&vector, k).await
}
