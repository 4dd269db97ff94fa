//! Error types for the chattracks library.
//!
//! Parsing-layer failures (malformed message bodies, unknown reaction codes,
//! disallowed ORDER BY values) are absorbed locally with documented fallback
//! values and never appear here. Storage-layer failures always propagate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the chattracks library.
#[derive(Error, Debug)]
pub enum ChatTracksError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Source export database missing or unreadable
    #[error("Source database unavailable: {0}")]
    SourceUnavailable(PathBuf),

    /// Write to the prepared or FTS store failed
    #[error("Storage write failed: {0}")]
    StorageWrite(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration or ingest parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error with context
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Result with ChatTracksError
pub type Result<T> = std::result::Result<T, ChatTracksError>;

impl From<anyhow::Error> for ChatTracksError {
    fn from(err: anyhow::Error) -> Self {
        ChatTracksError::Other(err.to_string())
    }
}
