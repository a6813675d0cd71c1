//! Error handling for hybrid search.
//!
//! This module provides:
//! - [`SearchError`]: The main error enum for all engine operations
//! - [`ErrorCode`]: Standardized error codes for machine parsing
//! - [`StructuredError`]: Serializable error with suggestion and context
//!
//! Only [`SearchError::is_user_facing`] errors ever leave the orchestrator.
//! Per-backend, reranker and cache failures are recovered locally and show
//! up as response metadata instead.

mod codes;

use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::search::backend::BackendKind;

pub use codes::ErrorCode;

/// Main error type for hybrid search operations.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid weights: {0}")]
    InvalidWeights(String),

    #[error("{backend} backend timed out after {}ms", .timeout.as_millis())]
    BackendTimeout {
        backend: BackendKind,
        timeout: Duration,
    },

    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable { backend: BackendKind, reason: String },

    #[error("Search temporarily unavailable: all retrieval backends failed ({})", .failures.join("; "))]
    RetrievalUnavailable { failures: Vec<String> },

    #[error("Reranker unavailable: {0}")]
    RerankerUnavailable(String),

    #[error("Result cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Search cancelled during {stage}")]
    Cancelled { stage: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Missing required config: {0}")]
    MissingConfig(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Search index error: {0}")]
    Index(#[from] tantivy::TantivyError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SearchError {
    /// Get the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidQuery(_) => ErrorCode::InvalidQuery,
            Self::InvalidFilter(_) => ErrorCode::InvalidFilter,
            Self::InvalidWeights(_) => ErrorCode::InvalidWeights,
            Self::BackendTimeout { .. } => ErrorCode::BackendTimeout,
            Self::BackendUnavailable { .. } => ErrorCode::BackendUnavailable,
            Self::RetrievalUnavailable { .. } => ErrorCode::RetrievalUnavailable,
            Self::RerankerUnavailable(_) => ErrorCode::RerankerUnavailable,
            Self::CacheUnavailable(_) => ErrorCode::CacheUnavailable,
            Self::Cancelled { .. } => ErrorCode::Cancelled,
            Self::Config(_) => ErrorCode::ConfigInvalid,
            Self::MissingConfig(_) => ErrorCode::ConfigMissing,
            Self::Index(_) => ErrorCode::IndexError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) | Self::InvalidDocument(_) => ErrorCode::SerializationError,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Whether this error propagates to the caller of a search.
    ///
    /// Everything else degrades into response metadata.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::InvalidQuery(_)
                | Self::InvalidFilter(_)
                | Self::InvalidWeights(_)
                | Self::RetrievalUnavailable { .. }
                | Self::Cancelled { .. }
        )
    }

    /// Get context information for this error as JSON.
    #[must_use]
    pub fn context(&self) -> Option<Value> {
        match self {
            Self::BackendTimeout { backend, timeout } => Some(serde_json::json!({
                "backend": backend,
                "timeout_ms": u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })),
            Self::BackendUnavailable { backend, reason } => {
                Some(serde_json::json!({ "backend": backend, "reason": reason }))
            }
            Self::RetrievalUnavailable { failures } => {
                Some(serde_json::json!({ "failures": failures }))
            }
            Self::Cancelled { stage } => Some(serde_json::json!({ "stage": stage })),
            Self::MissingConfig(key) => Some(serde_json::json!({ "config_key": key })),
            _ => None,
        }
    }

    /// Convert this error to a structured error.
    #[must_use]
    pub fn to_structured(&self) -> StructuredError {
        StructuredError::from_search_error(self)
    }
}

/// A structured error with machine-readable code, suggestion, and context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// The error code (e.g., "INVALID_FILTER")
    pub code: ErrorCode,

    /// The numeric error code (e.g., 102)
    pub numeric_code: u16,

    /// Human-readable error message
    pub message: String,

    /// Actionable suggestion for recovery
    pub suggestion: String,

    /// Additional context for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,

    /// Whether this error is potentially recoverable by the caller
    pub recoverable: bool,

    /// Error category (e.g., "validation", "retrieval")
    pub category: String,
}

impl StructuredError {
    /// Create a new structured error.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            numeric_code: code.numeric(),
            suggestion: code.suggestion().to_string(),
            context: None,
            recoverable: code.is_recoverable(),
            category: code.category().to_string(),
            code,
            message: message.into(),
        }
    }

    /// Create a structured error from a [`SearchError`].
    #[must_use]
    pub fn from_search_error(err: &SearchError) -> Self {
        let mut structured = Self::new(err.code(), err.to_string());
        structured.context = err.context();
        structured
    }

    /// Add context to this error.
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl From<&SearchError> for StructuredError {
    fn from(err: &SearchError) -> Self {
        Self::from_search_error(err)
    }
}

/// Result type alias using [`SearchError`].
pub type Result<T> = std::result::Result<T, SearchError>;
