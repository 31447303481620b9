//! Error types for doccrew.
//!
//! Library crates use [`DoccrewError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all doccrew operations.
#[derive(Debug, thiserror::Error)]
pub enum DoccrewError {
    /// Configuration loading or validation error (missing env var, bad TOML).
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during discovery or a tree listing.
    #[error("network error: {0}")]
    Network(String),

    /// The hosting provider refused the call because of rate limiting.
    #[error("rate limited by {provider}{}", .reset.as_ref().map(|r| format!(" (resets at {r})")).unwrap_or_default())]
    RateLimited {
        provider: String,
        reset: Option<String>,
    },

    /// Malformed provider response or markup conversion failure.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (bad seed URL, unsupported indent, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// JSON (de)serialization of the document store.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Failure at the external agent-runner boundary.
    #[error("agent runner error: {0}")]
    Agent(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DoccrewError>;

impl DoccrewError {
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
}
