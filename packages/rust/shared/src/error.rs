//! Error types for centipede.
//!
//! Library crates use [`CentipedeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all centipede operations.
#[derive(Debug, thiserror::Error)]
pub enum CentipedeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport failure or timeout while fetching a URL.
    #[error("network error: {0}")]
    Network(String),

    /// Expected document structure was absent.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Valid outcome that must be neither memoized nor treated as a failure.
    #[error("not cacheable yet: {reason}")]
    DoNotCache { reason: String },

    /// A compute task did not finish before the batch deadline.
    #[error("batch deadline of {deadline_ms}ms passed before {key} resolved")]
    BatchTimeout { key: String, deadline_ms: u128 },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Encoding or decoding of a cached value failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (oversized key, malformed template, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Registry lookup for a feed id that was never registered.
    #[error("unknown feed: {0}")]
    UnknownFeed(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CentipedeError>;

impl CentipedeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Signal that a computed item must be skipped for now.
    pub fn do_not_cache(reason: impl Into<String>) -> Self {
        Self::DoNotCache {
            reason: reason.into(),
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

    /// Whether this is the `DoNotCache` control signal rather than a failure.
    pub fn is_do_not_cache(&self) -> bool {
        matches!(self, Self::DoNotCache { .. })
    }
}
