//! Error types for the distiller.
//!
//! Library crates use [`DistillerError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all distiller operations.
#[derive(Debug, thiserror::Error)]
pub enum DistillerError {
    /// Configuration loading or validation error (missing credentials, bad TOML).
    #[error("config error: {message}")]
    Config { message: String },

    /// Input validation error (empty record set, bad separator).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Network/HTTP error talking to a model backend.
    #[error("network error: {0}")]
    Network(String),

    /// The model returned something that could not be parsed as expected
    /// (invalid JSON after fence unwrapping, or a missing required field).
    #[error("malformed model response: {message}")]
    MalformedResponse { message: String },

    /// Provider-side error (non-2xx status, refusal, empty completion).
    #[error("backend error: {0}")]
    Backend(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DistillerError>;

impl DistillerError {
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

    /// Create a malformed-response error from any displayable message.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse {
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
}
