//! Database schema definitions
//!
//! This module provides constants for table and column names used with
//! rusqlite, covering the read-only source export schema, the prepared
//! store owned by the ingestion engine, and the derived FTS store.

/// Source export `message` table (read-only)
pub mod source_message {
    /// Table name
    pub const TABLE: &str = "message";
    /// Stable integer primary key assigned by the source system
    pub const ROWID: &str = "ROWID";
    /// Plain text body (nullable)
    pub const TEXT: &str = "text";
    /// Proprietary rich-text blob (nullable)
    pub const ATTRIBUTED_BODY: &str = "attributedBody";
    /// Source-epoch timestamp
    pub const DATE: &str = "date";
    /// Flag indicating the message was sent by the export owner
    pub const IS_FROM_ME: &str = "is_from_me";
    /// Foreign key into the handle table
    pub const HANDLE_ID: &str = "handle_id";
    /// Reaction/tapback type code; 0 for normal messages
    pub const ASSOCIATED_MESSAGE_TYPE: &str = "associated_message_type";
}

/// Source export `handle` table (read-only)
pub mod source_handle {
    /// Table name
    pub const TABLE: &str = "handle";
    /// Stable integer primary key
    pub const ROWID: &str = "ROWID";
    /// Raw phone/email identifier
    pub const ID: &str = "id";
    /// Optional raw identifier variant
    pub const UNCANONICALIZED_ID: &str = "uncanonicalized_id";
}

/// Source export join tables (read-only)
pub mod source_joins {
    /// Chat to message join table
    pub const CHAT_MESSAGE: &str = "chat_message_join";
    /// Chat to handle join table
    pub const CHAT_HANDLE: &str = "chat_handle_join";
    /// Chat side of either join
    pub const CHAT_ID: &str = "chat_id";
    /// Message side of the chat_message join
    pub const MESSAGE_ID: &str = "message_id";
    /// Handle side of the chat_handle join
    pub const HANDLE_ID: &str = "handle_id";
}

/// Prepared `messages` table (owned by the ingestion engine)
pub mod messages {
    /// Table name
    pub const TABLE: &str = "messages";
    /// Primary key, equal to the source rowid
    pub const MESSAGE_ID: &str = "message_id";
    /// Chat the message belongs to
    pub const CHAT_ID: &str = "chat_id";
    /// Resolved display text
    pub const FINAL_TEXT: &str = "final_text";
    /// 64-hex-char content fingerprint; null iff final_text is empty
    pub const CONTENT_HASH: &str = "content_hash";
    /// 0/1 flag for Spotify links
    pub const HAS_SPOTIFY: &str = "has_spotify";
    /// First Spotify URL found, if any
    pub const SPOTIFY_URL: &str = "spotify_url";
    /// JSON mapping of link kind to ordered URL list
    pub const URLS: &str = "urls";
    /// JSON structured decode result
    pub const PARSED_BODY: &str = "parsed_body";
    /// UTC timestamp resolved from the source epoch
    pub const DATE_UTC: &str = "date_utc";
    /// Normalized sender contact identifier
    pub const SENDER_CONTACT: &str = "sender_contact";
    /// 0/1 flag for messages sent by the export owner
    pub const IS_FROM_ME: &str = "is_from_me";
    /// Source handle rowid of the sender
    pub const HANDLE_ID: &str = "handle_id";
}

/// Prepared `contacts` table (owned by the ingestion engine)
pub mod contacts {
    /// Table name
    pub const TABLE: &str = "contacts";
    /// Primary key, equal to the source handle rowid
    pub const HANDLE_ID: &str = "handle_id";
    /// JSON list of identifier variants, raw value first
    pub const VARIANTS: &str = "variants";
}

/// Prepared `meta` key/value table
pub mod meta {
    /// Table name
    pub const TABLE: &str = "meta";
    /// Key column
    pub const KEY: &str = "key";
    /// Value column
    pub const VALUE: &str = "value";

    /// Checkpoint: highest ingested message rowid
    pub const LAST_MESSAGE_ROWID: &str = "last_processed_message_rowid";
    /// Checkpoint: highest ingested handle rowid
    pub const LAST_CONTACT_ROWID: &str = "last_processed_contact_rowid";
    /// Schema version tag
    pub const DB_VERSION: &str = "db_version";
}

/// FTS store tables (owned by the FTS indexer)
pub mod fts {
    /// Full-text virtual table
    pub const TEXT_TABLE: &str = "message_text_fts";
    /// Per-message metadata table
    pub const METADATA_TABLE: &str = "message_metadata";
    /// One-logical-row index status table
    pub const STATUS_TABLE: &str = "fts_index_status";
}
