//! Error types for Cellbox.

use thiserror::Error;

/// Result type alias using Cellbox's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Cellbox.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error(
        "Upload matched {count} files but the limit is {limit}. \
         Raise `max_files` (0 disables the check) or narrow the include pattern."
    )]
    TooManyFiles { count: usize, limit: usize },

    // =========================================================================
    // Backend Errors
    // =========================================================================
    #[error("Sandbox {op} failed for `{target}`: {message}")]
    Backend {
        op: &'static str,
        target: String,
        message: String,
    },

    #[error("File not found in sandbox: {0}")]
    NotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    // =========================================================================
    // Invocation Log Errors
    // =========================================================================
    #[error("Malformed invocation log: {0}")]
    LogFormat(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a backend operation error carrying the operation name and target.
    pub fn backend(op: &'static str, target: impl Into<String>, message: impl ToString) -> Self {
        Self::Backend {
            op,
            target: target.into(),
            message: message.to_string(),
        }
    }

    /// Create a not-found error for the given path.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an invocation log format error.
    pub fn log_format(msg: impl Into<String>) -> Self {
        Self::LogFormat(msg.into())
    }

    /// Whether this error is the distinguishable "file not found" condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
