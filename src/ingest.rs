//! Batched, checkpointed ingestion from a source export into the prepared
//! store.
//!
//! The engine is single-writer and batch-sequential: each batch is read
//! from the source past the persisted checkpoint, enriched row by row, and
//! committed together with the advanced checkpoint in one transaction.
//! A crash between batches loses at most the uncommitted batch; a restart
//! resumes exactly at the checkpoint. Re-running with no new source rows is
//! a no-op.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime};
use rusqlite::{params, Connection, OpenFlags};
use tracing::{debug, info};

use crate::cache::MessageBodyCache;
use crate::error::{ChatTracksError, Result};
use crate::extract::UrlExtractor;
use crate::handles::{normalize_handle, normalize_handle_variants};
use crate::logging::OperationTimer;
use crate::metrics::MetricsCollector;
use crate::models::{
    ChatStats, IngestSummary, MessageBodyRow, PreparedContact, PreparedMessage, SourceHandleRow,
    SourceMessageRow,
};
use crate::prepared::PreparedStore;
use crate::queries::{
    build_placeholders, chat_stats_query, handles_after_rowid_query, messages_after_rowid_query,
    messages_with_body_query,
};
use crate::schema::source_handle;
use crate::validation::InputValidator;

/// Seconds between the Unix epoch and the source's 2001-01-01 epoch.
const APPLE_EPOCH_OFFSET: i64 = 978_307_200;

/// Decoded bodies kept hot during one ingestion run.
const BODY_CACHE_CAPACITY: usize = 4096;

/// Tuning knobs for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Message rows fetched and committed per batch
    pub batch_size: usize,
    /// Handle rows fetched and committed per batch
    pub contact_batch_size: usize,
    /// Drop all derived data and re-ingest from scratch
    pub force_rebuild: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: 5000,
            contact_batch_size: 1000,
            force_rebuild: false,
        }
    }
}

/// Read-only view over the source export database.
pub struct SourceStore {
    conn: Connection,
}

impl SourceStore {
    /// Open the source export read-only. A missing or unreadable file is a
    /// fatal `SourceUnavailable` error.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ChatTracksError::SourceUnavailable(path.to_path_buf()));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|_| ChatTracksError::SourceUnavailable(path.to_path_buf()))?;
        Ok(Self { conn })
    }

    /// Fetch up to `limit` message rows with rowid past the checkpoint.
    pub fn messages_after(&self, checkpoint: i64, limit: usize) -> Result<Vec<SourceMessageRow>> {
        let mut stmt = self.conn.prepare(&messages_after_rowid_query())?;
        let rows = stmt.query_map(params![checkpoint, limit as i64], |row| {
            Ok(SourceMessageRow {
                rowid: row.get(0)?,
                text: row.get(1)?,
                attributed_body: row.get(2)?,
                date: row.get(3)?,
                is_from_me: row.get::<_, Option<bool>>(4)?.unwrap_or(false),
                handle_id: row.get(5)?,
                associated_message_type: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
                chat_id: row.get(7)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Fetch up to `limit` handle rows with rowid past the checkpoint.
    pub fn handles_after(&self, checkpoint: i64, limit: usize) -> Result<Vec<SourceHandleRow>> {
        let mut stmt = self.conn.prepare(&handles_after_rowid_query())?;
        let rows = stmt.query_map(params![checkpoint, limit as i64], |row| {
            Ok(SourceHandleRow {
                rowid: row.get(0)?,
                id: row.get(1)?,
                uncanonicalized_id: row.get(2)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Messages with a usable body in a set of chats, inside an inclusive
    /// UTC date range, newest first. Reaction rows are excluded.
    pub fn messages_with_body(
        &self,
        chat_ids: &[i64],
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<MessageBodyRow>> {
        let sql = messages_with_body_query(&build_placeholders(chat_ids.len()));
        let mut bound: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        for chat_id in chat_ids {
            bound.push(Box::new(*chat_id));
        }
        // the date_utc expression yields "YYYY-MM-DD HH:MM:SS" strings
        bound.push(Box::new(start.format("%Y-%m-%d %H:%M:%S").to_string()));
        bound.push(Box::new(end.format("%Y-%m-%d %H:%M:%S").to_string()));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(bound.iter()), |row| {
            Ok(MessageBodyRow {
                message_id: row.get(0)?,
                text: row.get(1)?,
                attributed_body: row.get(2)?,
                date_utc: row.get(3)?,
                sender_contact: row.get(4)?,
                chat_id: row.get(5)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Per-chat aggregates (message count, member count, newest message
    /// date) for a set of chats. `order_by` outside the allowlist falls back
    /// to the default ordering.
    pub fn chat_stats(
        &self,
        chat_ids: &[i64],
        order_by: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<ChatStats>> {
        let sql = chat_stats_query(&build_placeholders(chat_ids.len()), order_by, limit);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(chat_ids.iter()), |row| {
            Ok(ChatStats {
                chat_id: row.get(0)?,
                message_count: row.get(1)?,
                member_count: row.get(2)?,
                last_message_date: row.get(3)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Resolve a handle rowid to its raw identifier.
    fn handle_identifier(&self, handle_id: i64) -> Result<Option<String>> {
        use rusqlite::OptionalExtension;
        let id = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE {} = ?",
                    source_handle::ID,
                    source_handle::TABLE,
                    source_handle::ROWID
                ),
                params![handle_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }
}

/// Convert a raw source-epoch timestamp to UTC.
///
/// Values above 10^11 are nanosecond-scale; everything else is seconds.
#[must_use]
pub fn resolve_source_date(raw: Option<i64>) -> Option<NaiveDateTime> {
    let raw = raw?;
    let seconds = if raw > 100_000_000_000 {
        raw / 1_000_000_000
    } else {
        raw
    };
    DateTime::from_timestamp(seconds + APPLE_EPOCH_OFFSET, 0).map(|dt| dt.naive_utc())
}

/// Run one full ingestion pass: contacts first, then messages, both in
/// checkpointed batches. Returns counts for this run only.
pub fn ingest_prepared_store(
    source_db_path: &Path,
    base_dir: &Path,
    options: &IngestOptions,
) -> Result<IngestSummary> {
    InputValidator::validate_batch_size(options.batch_size)?;
    InputValidator::validate_batch_size(options.contact_batch_size)?;
    InputValidator::validate_base_dir(base_dir)?;

    let timer = OperationTimer::new("ingest_prepared_store");
    let source = SourceStore::open(source_db_path)?;
    let mut store = PreparedStore::open(base_dir)?;
    let metrics = MetricsCollector::default();

    if options.force_rebuild {
        info!("force rebuild requested; clearing prepared store");
        store.reset_for_rebuild()?;
    }

    let extractor = UrlExtractor::new()?;
    let mut cache = MessageBodyCache::new(BODY_CACHE_CAPACITY);

    let contacts_processed = ingest_contacts(&source, &mut store, options, &metrics)?;
    let messages_processed =
        ingest_messages(&source, &mut store, options, &extractor, &mut cache, &metrics)?;

    let (hits, misses) = cache.stats();
    metrics.record_body_cache(hits, misses);

    let summary = IngestSummary {
        prepared_db_path: PathBuf::from(store.path()),
        messages_processed,
        contacts_processed,
        last_message_rowid: store.get_last_processed_rowid()?,
        last_contact_rowid: store.get_last_contact_rowid()?,
    };
    info!(
        messages = summary.messages_processed,
        contacts = summary.contacts_processed,
        checkpoint = summary.last_message_rowid,
        "ingestion run complete"
    );
    timer.finish();
    Ok(summary)
}

fn ingest_contacts(
    source: &SourceStore,
    store: &mut PreparedStore,
    options: &IngestOptions,
    metrics: &MetricsCollector,
) -> Result<usize> {
    let mut processed = 0usize;
    loop {
        let checkpoint = store.get_last_contact_rowid()?;
        let rows = source.handles_after(checkpoint, options.contact_batch_size)?;
        if rows.is_empty() {
            break;
        }

        let batch_max = rows.last().map_or(checkpoint, |row| row.rowid);
        let batch: Vec<PreparedContact> = rows
            .into_iter()
            .map(|row| {
                let raw = row.id.or(row.uncanonicalized_id);
                PreparedContact {
                    handle_id: row.rowid,
                    variants: normalize_handle_variants(raw.as_deref()),
                }
            })
            .collect();

        let count = batch.len();
        store.write_contact_batch(&batch, batch_max)?;
        metrics.record_contacts_ingested(count);
        processed += count;
        debug!(count, checkpoint = batch_max, "contact batch committed");
    }
    Ok(processed)
}

fn ingest_messages(
    source: &SourceStore,
    store: &mut PreparedStore,
    options: &IngestOptions,
    extractor: &UrlExtractor,
    cache: &mut MessageBodyCache,
    metrics: &MetricsCollector,
) -> Result<usize> {
    let mut processed = 0usize;
    loop {
        let checkpoint = store.get_last_processed_rowid()?;
        let rows = source.messages_after(checkpoint, options.batch_size)?;
        if rows.is_empty() {
            break;
        }

        let batch_max = rows.last().map_or(checkpoint, |row| row.rowid);
        let mut batch = Vec::with_capacity(rows.len());
        for row in rows {
            batch.push(enrich_row(source, extractor, cache, row)?);
        }

        let count = batch.len();
        store.write_message_batch(&batch, batch_max)?;
        metrics.record_messages_ingested(count);
        metrics.record_batch_committed();
        processed += count;
        debug!(count, checkpoint = batch_max, "message batch committed");
    }
    Ok(processed)
}

/// Enrich one source row. Body decode failures are absorbed by the parser's
/// default-value contract; only storage lookups can fail here.
fn enrich_row(
    source: &SourceStore,
    extractor: &UrlExtractor,
    cache: &mut MessageBodyCache,
    row: SourceMessageRow,
) -> Result<PreparedMessage> {
    let sender_contact = match row.handle_id {
        Some(handle_id) => {
            let raw = source.handle_identifier(handle_id)?;
            normalize_handle(raw.as_deref())
        }
        None => None,
    };

    let date_utc = resolve_source_date(row.date);
    let date_str = date_utc.map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string());

    let enriched = extractor.parse_message_fields(
        cache,
        row.rowid,
        row.text.as_deref(),
        row.attributed_body.as_deref(),
        sender_contact.as_deref(),
        date_str.as_deref(),
    );

    Ok(PreparedMessage {
        message_id: row.rowid,
        chat_id: row.chat_id,
        final_text: enriched.final_text,
        content_hash: enriched.content_hash,
        has_spotify: enriched.has_spotify,
        spotify_url: enriched.spotify_url,
        urls: enriched.urls,
        parsed_body: enriched.parsed_body,
        date_utc,
        sender_contact,
        is_from_me: row.is_from_me,
        handle_id: row.handle_id,
    })
}
