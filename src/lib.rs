//! chattracks - Messaging Export Ingestion and Media-Link Extraction
//!
//! A Rust library for incrementally ingesting a messaging-app SQLite export,
//! parsing semi-structured message bodies (including a binary rich-text
//! encoding), extracting and classifying media URLs, and maintaining a
//! normalized, searchable prepared store with a full-text index on top.
//!
//! # Features
//!
//! - Batched, resumable ingestion with persisted checkpoints
//! - Best-effort decode of the proprietary rich-text body format
//! - URL extraction and domain classification (Spotify, YouTube, ...)
//! - Deterministic SHA-256 content fingerprints for deduplication
//! - Parameterized query construction with an ORDER BY allowlist
//! - Derived FTS5 search index over prepared messages

/// Message body parsing (binary rich-text decode)
pub mod body;
/// Bounded LRU cache for decoded message bodies
pub mod cache;
/// Configuration management
pub mod config;
/// Error types
pub mod error;
/// URL/reaction extraction and content fingerprinting
pub mod extract;
/// Full-text search index over prepared messages
pub mod fts;
/// Contact handle normalization
pub mod handles;
/// Batched, checkpointed ingestion engine
pub mod ingest;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Prepared-store storage layer
pub mod prepared;
/// Parameterized SQL construction
pub mod queries;
/// Database schema definitions
pub mod schema;
/// Input validation for ingest parameters
pub mod validation;

// Re-export key components for easier access
pub use cache::MessageBodyCache;
pub use error::{ChatTracksError, Result};
pub use extract::UrlExtractor;
pub use ingest::{ingest_prepared_store, IngestOptions};
pub use models::{EnrichedFields, IngestSummary, ParsedBody, UrlBuckets};
pub use prepared::PreparedStore;
