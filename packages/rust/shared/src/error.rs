//! Error types for FreshDocs.
//!
//! Library crates use [`FreshDocsError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all FreshDocs operations.
#[derive(Debug, thiserror::Error)]
pub enum FreshDocsError {
    /// Network/HTTP failure after the fetch strategies were exhausted.
    #[error("fetch failed: {reason}")]
    Fetch { reason: String },

    /// Extracted text was shorter than the configured minimum.
    #[error("insufficient content: extracted {length} characters, need at least {minimum}")]
    InsufficientContent { length: usize, minimum: usize },

    /// Embedding provider failure or unrecognized response shape.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Text-generation provider failure, unrecognized response or empty output.
    #[error("generation error: {0}")]
    Generation(String),

    /// No topic, course or active mapping for the requested id.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad catalog entry, invalid URL, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A freshness sweep was triggered while another one was still running.
    #[error("a sweep is already running")]
    SweepInProgress,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FreshDocsError>;

impl FreshDocsError {
    /// Create a fetch error from any displayable reason.
    pub fn fetch(reason: impl Into<String>) -> Self {
        Self::Fetch {
            reason: reason.into(),
        }
    }

    /// Create a not-found error describing the missing entity.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the fetcher may retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::InsufficientContent { .. })
    }
}
