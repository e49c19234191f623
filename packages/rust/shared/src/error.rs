//! Error types for NeoLabs.
//!
//! Library crates use [`NeoLabsError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all ingestion operations.
#[derive(Debug, thiserror::Error)]
pub enum NeoLabsError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while fetching pages, feeds, or provider APIs.
    #[error("network error: {0}")]
    Network(String),

    /// HTML, feed, or JSON parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// LLM provider error (request, API, or response shape).
    #[error("llm error: {0}")]
    Llm(String),

    /// Deep-research provider error.
    #[error("research error: {0}")]
    Research(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input, unsupported value, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, NeoLabsError>;

impl NeoLabsError {
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

    /// Whether a retry could plausibly succeed (network-level failures only).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = NeoLabsError::config("missing database path");
        assert_eq!(err.to_string(), "config error: missing database path");

        let err = NeoLabsError::validation("unknown profile 'daily'");
        assert!(err.to_string().contains("unknown profile"));
    }

    #[test]
    fn only_network_errors_are_transient() {
        assert!(NeoLabsError::Network("timeout".into()).is_transient());
        assert!(!NeoLabsError::parse("bad json").is_transient());
        assert!(!NeoLabsError::Storage("locked".into()).is_transient());
    }
}
