//! Data models for ingestion and storage
//!
//! This module contains all data structures used throughout the library,
//! including parse results, prepared-store rows, and ingest summaries.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured result of decoding a binary rich-text message body.
///
/// The default value (all fields empty) doubles as the universal failure
/// result: decode errors never cross the parser boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedBody {
    /// Primary string payload, if recoverable
    pub text: Option<String>,
    /// Internal type tags mapped to best-effort decoded values
    pub components: BTreeMap<String, Value>,
    /// Recoverable dictionary-valued payloads from the stream
    pub metadata: BTreeMap<String, Value>,
}

/// A single extracted URL with its domain classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlMatch {
    /// The URL as matched (trailing punctuation trimmed)
    pub url: String,
    /// Domain classification tag ("spotify", "youtube", "other", ...)
    pub kind: String,
}

/// Coarse three-bucket view of the URLs found in a message.
///
/// All three buckets are always present, even when empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlBuckets {
    /// Spotify track/album/playlist links
    pub spotify: Vec<String>,
    /// YouTube links
    pub youtube: Vec<String>,
    /// Everything else
    pub other: Vec<String>,
}

/// Fully enriched per-message parse result produced by the extractor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedFields {
    /// Resolved display text (empty string means "no text, no hash")
    pub final_text: String,
    /// Content fingerprint; None iff `final_text` is empty
    pub content_hash: Option<String>,
    /// True if any Spotify URL was found
    pub has_spotify: bool,
    /// First Spotify URL found, if any
    pub spotify_url: Option<String>,
    /// Bucketed URLs
    pub urls: UrlBuckets,
    /// Structured body decode result (always present, possibly empty)
    pub parsed_body: ParsedBody,
}

/// A row of the prepared `messages` table
#[derive(Debug, Clone)]
pub struct PreparedMessage {
    /// Source rowid, immutable primary key
    pub message_id: i64,
    /// Chat the message belongs to
    pub chat_id: Option<i64>,
    /// Resolved display text
    pub final_text: String,
    /// 64-hex-char fingerprint; None iff `final_text` is empty
    pub content_hash: Option<String>,
    /// True if any Spotify URL was found
    pub has_spotify: bool,
    /// First Spotify URL found, if any
    pub spotify_url: Option<String>,
    /// Bucketed URLs
    pub urls: UrlBuckets,
    /// Structured body decode result
    pub parsed_body: ParsedBody,
    /// UTC timestamp resolved from the source epoch
    pub date_utc: Option<NaiveDateTime>,
    /// Normalized sender identifier
    pub sender_contact: Option<String>,
    /// True if sent by the export owner
    pub is_from_me: bool,
    /// Source handle rowid of the sender
    pub handle_id: Option<i64>,
}

/// A row of the prepared `contacts` table
#[derive(Debug, Clone)]
pub struct PreparedContact {
    /// Source handle rowid
    pub handle_id: i64,
    /// Identifier variants for fuzzy lookup, raw value first
    pub variants: Vec<String>,
}

/// A raw message row as read from the source export
#[derive(Debug, Clone)]
pub struct SourceMessageRow {
    /// Source rowid
    pub rowid: i64,
    /// Plain text body, if any
    pub text: Option<String>,
    /// Proprietary rich-text blob, if any
    pub attributed_body: Option<Vec<u8>>,
    /// Raw source-epoch timestamp
    pub date: Option<i64>,
    /// True if sent by the export owner
    pub is_from_me: bool,
    /// Foreign key into the handle table
    pub handle_id: Option<i64>,
    /// Reaction type code; 0 for normal messages
    pub associated_message_type: i64,
    /// Chat id from the chat_message join, if any
    pub chat_id: Option<i64>,
}

/// A message row with a usable body, as returned by the body read query
#[derive(Debug, Clone)]
pub struct MessageBodyRow {
    /// Source rowid
    pub message_id: i64,
    /// Plain text body, if any
    pub text: Option<String>,
    /// Proprietary rich-text blob, if any
    pub attributed_body: Option<Vec<u8>>,
    /// UTC timestamp resolved in SQL
    pub date_utc: Option<String>,
    /// Raw sender identifier from the handle table
    pub sender_contact: Option<String>,
    /// Chat the message belongs to
    pub chat_id: i64,
}

/// A raw handle row as read from the source export
#[derive(Debug, Clone)]
pub struct SourceHandleRow {
    /// Source rowid
    pub rowid: i64,
    /// Raw phone/email identifier
    pub id: Option<String>,
    /// Optional raw identifier variant
    pub uncanonicalized_id: Option<String>,
}

/// Result record returned by a full ingestion run
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    /// Path of the prepared store that was written
    pub prepared_db_path: PathBuf,
    /// Messages newly ingested by this run (not a running total)
    pub messages_processed: usize,
    /// Contacts newly ingested by this run
    pub contacts_processed: usize,
    /// Final message checkpoint after the run
    pub last_message_rowid: i64,
    /// Final contact checkpoint after the run
    pub last_contact_rowid: i64,
}

/// A search hit returned from the FTS store
#[derive(Debug, Clone, Serialize)]
pub struct FtsHit {
    /// Prepared message id
    pub message_id: i64,
    /// Chat the message belongs to
    pub chat_id: Option<i64>,
    /// Message date as stored in the index
    pub date: Option<String>,
    /// Text extracted from the rich-text body
    pub extracted_text: Option<String>,
    /// Original plain text
    pub original_text: Option<String>,
}

/// Status summary of an FTS store
#[derive(Debug, Clone, Serialize)]
pub struct FtsStatus {
    /// Total messages present in the metadata table
    pub total_messages_indexed: i64,
    /// Source database the index was built from, if recorded
    pub source_db_path: Option<String>,
    /// Date of the newest indexed message, if recorded
    pub last_indexed_date: Option<String>,
    /// Last time the status row was touched, if recorded
    pub last_updated: Option<String>,
}

/// Per-chat aggregate used by the chat statistics query
#[derive(Debug, Clone, Serialize)]
pub struct ChatStats {
    /// Chat id
    pub chat_id: i64,
    /// Number of messages in the chat
    pub message_count: i64,
    /// Number of distinct members in the chat
    pub member_count: i64,
    /// Resolved date of the newest message
    pub last_message_date: Option<String>,
}
