//! Standardized error codes for machine-parseable output.
//!
//! Error codes follow a numeric taxonomy:
//! - 1xx: Query and filter validation errors
//! - 2xx: Retrieval backend errors
//! - 3xx: Config errors
//! - 4xx: Pipeline errors (rerank, cache, cancellation)
//! - 6xx: Storage and serialization errors
//! - 9xx: Internal errors

use serde::{Deserialize, Serialize};

/// Standardized error codes for JSON output.
///
/// Each variant maps to a numeric code (e.g., `InvalidFilter` -> E102).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================
    // Validation errors (1xx)
    // ========================================
    /// E101: Query text is empty or limit is zero
    InvalidQuery,
    /// E102: Filter values are malformed or out of range
    InvalidFilter,
    /// E103: Explicit weights are negative, non-finite or all zero
    InvalidWeights,

    // ========================================
    // Retrieval errors (2xx)
    // ========================================
    /// E201: A single backend exceeded its timeout
    BackendTimeout,
    /// E202: A single backend returned an error
    BackendUnavailable,
    /// E203: Every backend failed; the search cannot proceed
    RetrievalUnavailable,

    // ========================================
    // Config errors (3xx)
    // ========================================
    /// E301: Config file has invalid syntax or values
    ConfigInvalid,
    /// E302: Config directory could not be located
    ConfigMissing,

    // ========================================
    // Pipeline errors (4xx)
    // ========================================
    /// E401: Reranker could not score the candidates
    RerankerUnavailable,
    /// E402: Result cache could not be read or written
    CacheUnavailable,
    /// E403: Caller cancelled the request
    Cancelled,

    // ========================================
    // Storage errors (6xx)
    // ========================================
    /// E601: Full-text index operation failed
    IndexError,
    /// E602: Serialization/deserialization failed
    SerializationError,
    /// E603: IO operation failed
    IoError,

    // ========================================
    // Internal errors (9xx)
    // ========================================
    /// E901: Unexpected internal error
    InternalError,
}

impl ErrorCode {
    /// Get the numeric error code (e.g., `InvalidFilter` -> 102).
    #[must_use]
    pub const fn numeric(&self) -> u16 {
        match self {
            Self::InvalidQuery => 101,
            Self::InvalidFilter => 102,
            Self::InvalidWeights => 103,

            Self::BackendTimeout => 201,
            Self::BackendUnavailable => 202,
            Self::RetrievalUnavailable => 203,

            Self::ConfigInvalid => 301,
            Self::ConfigMissing => 302,

            Self::RerankerUnavailable => 401,
            Self::CacheUnavailable => 402,
            Self::Cancelled => 403,

            Self::IndexError => 601,
            Self::SerializationError => 602,
            Self::IoError => 603,

            Self::InternalError => 901,
        }
    }

    /// Get the error code as a formatted string (e.g., "E102").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("E{}", self.numeric())
    }

    /// Get the default suggestion for this error code.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::InvalidQuery => "Provide non-empty query text and a limit greater than zero",
            Self::InvalidFilter => "Check filter values: quality must be within 0.0-1.0 and the date range start must not be after its end",
            Self::InvalidWeights => "Weights must be finite, non-negative and not all zero (e.g. --weights 0.3,0.4,0.3)",

            Self::BackendTimeout => "The backend was slow to respond. Raise retrieval.timeout_ms if this persists",
            Self::BackendUnavailable => "Check that the backend index is loaded and reachable",
            Self::RetrievalUnavailable => "Search is temporarily unavailable. Retry shortly",

            Self::ConfigInvalid => "Run `hs config` to see current values. Check TOML syntax in the config file",
            Self::ConfigMissing => "Pass --config <path> or set HS_CONFIG",

            Self::RerankerUnavailable => "Results fall back to fused order. Check reranker model availability",
            Self::CacheUnavailable => "The cache is bypassed. No action required",
            Self::Cancelled => "The request was cancelled before completion",

            Self::IndexError => "Rebuild the full-text index from the corpus",
            Self::SerializationError => "The data format may be corrupted. Check input data for validity",
            Self::IoError => "File operation failed. Check path exists and permissions are correct",

            Self::InternalError => "An unexpected error occurred. Please report this issue with full error output",
        }
    }

    /// Check if this error is potentially recoverable by the caller.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InternalError | Self::IndexError)
    }

    /// Category name used in structured output.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self.numeric() / 100 {
            1 => "validation",
            2 => "retrieval",
            3 => "config",
            4 => "pipeline",
            6 => "storage",
            _ => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code_string())
    }
}
