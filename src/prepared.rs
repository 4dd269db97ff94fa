//! Prepared-store storage layer.
//!
//! The prepared store is a SQLite file owned by the ingestion engine:
//! enriched messages, normalized contacts, and a key/value meta table
//! holding the schema version and the ingestion checkpoints. WAL journaling
//! lets the API layer read concurrently with the single writer.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::error::{ChatTracksError, Result};
use crate::models::{PreparedContact, PreparedMessage, UrlBuckets};
use crate::queries::build_placeholders;
use crate::schema::{contacts, messages, meta};

/// Schema version written to the meta table. Bump on any change to the
/// message schema or the fingerprint definition.
pub const DB_VERSION: &str = "1";

/// File name of the prepared store inside the caller's base directory.
pub const PREPARED_DB_FILE: &str = "prepared.db";

/// Handle to the prepared store.
pub struct PreparedStore {
    conn: Connection,
    path: PathBuf,
}

impl PreparedStore {
    /// Open (creating if needed) the prepared store under `base_dir`.
    pub fn open(base_dir: &Path) -> Result<Self> {
        fs::create_dir_all(base_dir)?;
        let path = base_dir.join(PREPARED_DB_FILE);

        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let store = Self { conn, path };
        store.init_schema()?;
        Ok(store)
    }

    /// Path of the underlying database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS messages (
                message_id INTEGER PRIMARY KEY,
                chat_id INTEGER,
                final_text TEXT NOT NULL,
                content_hash TEXT,
                has_spotify INTEGER NOT NULL DEFAULT 0,
                spotify_url TEXT,
                urls TEXT NOT NULL,
                parsed_body TEXT NOT NULL,
                date_utc TEXT,
                sender_contact TEXT,
                is_from_me INTEGER NOT NULL DEFAULT 0,
                handle_id INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_messages_chat_date
                ON messages(chat_id, date_utc);
            CREATE INDEX IF NOT EXISTS idx_messages_has_spotify
                ON messages(has_spotify);
            CREATE TABLE IF NOT EXISTS contacts (
                handle_id INTEGER PRIMARY KEY,
                variants TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;

        // First open stamps the schema version; rebuilds rewrite it.
        let version: Option<String> = self.get_meta(meta::DB_VERSION)?;
        if version.is_none() {
            self.set_meta(meta::DB_VERSION, DB_VERSION)?;
        }
        Ok(())
    }

    /// Truncate all derived data and reset checkpoints to zero.
    pub fn reset_for_rebuild(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(&format!("DELETE FROM {}", messages::TABLE), [])?;
        tx.execute(&format!("DELETE FROM {}", contacts::TABLE), [])?;
        tx.execute(&format!("DELETE FROM {}", meta::TABLE), [])?;
        tx.execute(
            &format!(
                "INSERT INTO {} ({}, {}) VALUES (?, ?)",
                meta::TABLE,
                meta::KEY,
                meta::VALUE
            ),
            params![meta::DB_VERSION, DB_VERSION],
        )?;
        tx.commit()
            .map_err(|e| ChatTracksError::StorageWrite(e.to_string()))?;
        debug!("prepared store reset for rebuild");
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE {} = ?",
                    meta::VALUE,
                    meta::TABLE,
                    meta::KEY
                ),
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO {} ({}, {}) VALUES (?, ?) \
                 ON CONFLICT({}) DO UPDATE SET {} = excluded.{}",
                meta::TABLE,
                meta::KEY,
                meta::VALUE,
                meta::KEY,
                meta::VALUE,
                meta::VALUE
            ),
            params![key, value],
        )?;
        Ok(())
    }

    fn get_meta_i64(&self, key: &str) -> Result<i64> {
        Ok(self
            .get_meta(key)?
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or(0))
    }

    /// Checkpoint: highest message rowid already ingested.
    pub fn get_last_processed_rowid(&self) -> Result<i64> {
        self.get_meta_i64(meta::LAST_MESSAGE_ROWID)
    }

    /// Checkpoint: highest handle rowid already ingested.
    pub fn get_last_contact_rowid(&self) -> Result<i64> {
        self.get_meta_i64(meta::LAST_CONTACT_ROWID)
    }

    /// Schema version tag stored in the meta table.
    pub fn db_version(&self) -> Result<Option<String>> {
        self.get_meta(meta::DB_VERSION)
    }

    /// Write one enriched message batch and advance the message checkpoint
    /// in the same transaction. A failure leaves the checkpoint at its
    /// pre-batch value.
    pub fn write_message_batch(
        &mut self,
        batch: &[PreparedMessage],
        checkpoint: i64,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&format!(
                "INSERT OR REPLACE INTO {} ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                messages::TABLE,
                messages::MESSAGE_ID,
                messages::CHAT_ID,
                messages::FINAL_TEXT,
                messages::CONTENT_HASH,
                messages::HAS_SPOTIFY,
                messages::SPOTIFY_URL,
                messages::URLS,
                messages::PARSED_BODY,
                messages::DATE_UTC,
                messages::SENDER_CONTACT,
                messages::IS_FROM_ME,
                messages::HANDLE_ID,
            ))?;
            for message in batch {
                stmt.execute(params![
                    message.message_id,
                    message.chat_id,
                    message.final_text,
                    message.content_hash,
                    message.has_spotify,
                    message.spotify_url,
                    serde_json::to_string(&message.urls)?,
                    serde_json::to_string(&message.parsed_body)?,
                    message.date_utc,
                    message.sender_contact,
                    message.is_from_me,
                    message.handle_id,
                ])?;
            }
        }
        tx.execute(
            &format!(
                "INSERT INTO {} ({}, {}) VALUES (?, ?) \
                 ON CONFLICT({}) DO UPDATE SET {} = excluded.{}",
                meta::TABLE,
                meta::KEY,
                meta::VALUE,
                meta::KEY,
                meta::VALUE,
                meta::VALUE
            ),
            params![meta::LAST_MESSAGE_ROWID, checkpoint.to_string()],
        )?;
        tx.commit()
            .map_err(|e| ChatTracksError::StorageWrite(e.to_string()))
    }

    /// Write one contact batch and advance the contact checkpoint in the
    /// same transaction.
    pub fn write_contact_batch(
        &mut self,
        batch: &[PreparedContact],
        checkpoint: i64,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&format!(
                "INSERT OR REPLACE INTO {} ({}, {}) VALUES (?, ?)",
                contacts::TABLE,
                contacts::HANDLE_ID,
                contacts::VARIANTS,
            ))?;
            for contact in batch {
                stmt.execute(params![
                    contact.handle_id,
                    serde_json::to_string(&contact.variants)?
                ])?;
            }
        }
        tx.execute(
            &format!(
                "INSERT INTO {} ({}, {}) VALUES (?, ?) \
                 ON CONFLICT({}) DO UPDATE SET {} = excluded.{}",
                meta::TABLE,
                meta::KEY,
                meta::VALUE,
                meta::KEY,
                meta::VALUE,
                meta::VALUE
            ),
            params![meta::LAST_CONTACT_ROWID, checkpoint.to_string()],
        )?;
        tx.commit()
            .map_err(|e| ChatTracksError::StorageWrite(e.to_string()))
    }

    /// Total prepared message rows.
    pub fn message_count(&self) -> Result<i64> {
        Ok(self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", messages::TABLE),
            [],
            |row| row.get(0),
        )?)
    }

    /// Total prepared contact rows.
    pub fn contact_count(&self) -> Result<i64> {
        Ok(self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", contacts::TABLE),
            [],
            |row| row.get(0),
        )?)
    }

    /// Fetch a single prepared message by id.
    pub fn get_message(&self, message_id: i64) -> Result<Option<PreparedMessage>> {
        let message = self
            .conn
            .query_row(
                &format!(
                    "SELECT * FROM {} WHERE {} = ?",
                    messages::TABLE,
                    messages::MESSAGE_ID
                ),
                params![message_id],
                map_prepared_message,
            )
            .optional()?;
        Ok(message)
    }

    /// Fetch a single prepared contact by handle id.
    pub fn get_contact(&self, handle_id: i64) -> Result<Option<PreparedContact>> {
        let contact = self
            .conn
            .query_row(
                &format!(
                    "SELECT * FROM {} WHERE {} = ?",
                    contacts::TABLE,
                    contacts::HANDLE_ID
                ),
                params![handle_id],
                map_prepared_contact,
            )
            .optional()?;
        Ok(contact)
    }

    /// Read interface for the API layer: messages in a date range, optionally
    /// restricted to a chat set and a link kind ("spotify", "youtube",
    /// "other"). All values are bound parameters; the kind filter runs over
    /// the decoded buckets.
    pub fn get_messages(
        &self,
        chat_ids: Option<&[i64]>,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
        link_kind: Option<&str>,
    ) -> Result<Vec<PreparedMessage>> {
        let mut sql = format!("SELECT * FROM {} WHERE 1=1", messages::TABLE);
        let mut bound: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(chat_ids) = chat_ids {
            sql.push_str(&format!(
                " AND {} IN ({})",
                messages::CHAT_ID,
                build_placeholders(chat_ids.len())
            ));
            for chat_id in chat_ids {
                bound.push(Box::new(*chat_id));
            }
        }
        if let Some(start) = start {
            sql.push_str(&format!(" AND {} >= ?", messages::DATE_UTC));
            bound.push(Box::new(start));
        }
        if let Some(end) = end {
            sql.push_str(&format!(" AND {} <= ?", messages::DATE_UTC));
            bound.push(Box::new(end));
        }
        sql.push_str(&format!(" ORDER BY {} DESC", messages::DATE_UTC));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(bound.iter()), |row| {
            map_prepared_message(row)
        })?;

        let mut results = Vec::new();
        for row in rows {
            let message = row?;
            let keep = match link_kind {
                Some("spotify") => !message.urls.spotify.is_empty(),
                Some("youtube") => !message.urls.youtube.is_empty(),
                Some("other") => !message.urls.other.is_empty(),
                Some(_) => false,
                None => true,
            };
            if keep {
                results.push(message);
            }
        }
        Ok(results)
    }
}

/// Map a database row to a `PreparedMessage`.
fn map_prepared_message(row: &Row) -> rusqlite::Result<PreparedMessage> {
    let urls_json: String = row.get(messages::URLS)?;
    let parsed_json: String = row.get(messages::PARSED_BODY)?;
    Ok(PreparedMessage {
        message_id: row.get(messages::MESSAGE_ID)?,
        chat_id: row.get(messages::CHAT_ID)?,
        final_text: row.get(messages::FINAL_TEXT)?,
        content_hash: row.get(messages::CONTENT_HASH)?,
        has_spotify: row.get(messages::HAS_SPOTIFY)?,
        spotify_url: row.get(messages::SPOTIFY_URL)?,
        urls: serde_json::from_str(&urls_json).unwrap_or_else(|_| UrlBuckets::default()),
        parsed_body: serde_json::from_str(&parsed_json).unwrap_or_default(),
        date_utc: row.get(messages::DATE_UTC)?,
        sender_contact: row.get(messages::SENDER_CONTACT)?,
        is_from_me: row.get(messages::IS_FROM_ME)?,
        handle_id: row.get(messages::HANDLE_ID)?,
    })
}

/// Map a database row to a `PreparedContact`.
fn map_prepared_contact(row: &Row) -> rusqlite::Result<PreparedContact> {
    let variants_json: String = row.get(contacts::VARIANTS)?;
    Ok(PreparedContact {
        handle_id: row.get(contacts::HANDLE_ID)?,
        variants: serde_json::from_str(&variants_json).unwrap_or_default(),
    })
}
