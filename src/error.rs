//! Error types for Svar.

use thiserror::Error;

/// Library-level error type for Svar operations.
#[derive(Error, Debug)]
pub enum SvarError {
    #[error("Index not ready: no transcripts have been ingested yet")]
    IndexNotReady,

    #[error("{service} service unavailable: {message}")]
    ServiceUnavailable { service: String, message: String },

    #[error("{service} service rejected the request: {message}")]
    ServiceRejected { service: String, message: String },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Answer synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl SvarError {
    pub(crate) fn unavailable(service: &str, message: impl Into<String>) -> Self {
        SvarError::ServiceUnavailable {
            service: service.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn rejected(service: &str, message: impl Into<String>) -> Self {
        SvarError::ServiceRejected {
            service: service.to_string(),
            message: message.into(),
        }
    }

    /// Whether a retry could succeed (connection errors, timeouts, 429/5xx).
    pub fn is_transient(&self) -> bool {
        matches!(self, SvarError::ServiceUnavailable { .. })
    }

    /// Whether the persistence layer itself failed.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, SvarError::Store(_) | SvarError::Database(_))
    }
}

/// Result type alias for Svar operations.
pub type Result<T> = std::result::Result<T, SvarError>;
