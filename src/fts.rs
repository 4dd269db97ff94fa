//! Full-text search index over prepared messages.
//!
//! The FTS store is a sibling SQLite file (`<source-stem>.fts.db`) holding
//! an fts5 virtual table plus per-message metadata and a one-row-per-source
//! status table. Probing a store that does not exist yields empty results,
//! never an error, so callers can test for optional indexes without
//! special-casing.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};

use crate::error::{ChatTracksError, Result};
use crate::metrics::MetricsCollector;
use crate::models::{FtsHit, FtsStatus};
use crate::prepared::PreparedStore;
use crate::queries::build_placeholders;
use crate::schema::fts;

const FTS_SCHEMA_SQL: &str = "
CREATE VIRTUAL TABLE IF NOT EXISTS message_text_fts USING fts5(
  message_id UNINDEXED,
  chat_id UNINDEXED,
  date UNINDEXED,
  extracted_text,
  original_text
);

CREATE TABLE IF NOT EXISTS message_metadata (
  message_id INTEGER NOT NULL UNIQUE,
  chat_id INTEGER,
  date TEXT,
  is_from_me INTEGER NOT NULL DEFAULT 0,
  handle_id INTEGER,
  has_attributed_body INTEGER NOT NULL DEFAULT 0,
  last_updated TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS fts_index_status (
  source_db_path TEXT PRIMARY KEY,
  last_indexed_date TEXT,
  total_messages_indexed INTEGER NOT NULL DEFAULT 0,
  last_updated TEXT NOT NULL
);
";

/// Derive the FTS store path: sibling file with a `.fts.db` suffix.
#[must_use]
pub fn fts_db_path(source_path: &Path) -> PathBuf {
    let stem = source_path
        .file_stem()
        .map_or_else(|| "index".to_string(), |s| s.to_string_lossy().into_owned());
    source_path.with_file_name(format!("{stem}.fts.db"))
}

/// Idempotently create the FTS store schema.
///
/// Calling twice on the same path is a no-op success.
pub fn create_fts_database(path: &Path) -> Result<bool> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.execute_batch(FTS_SCHEMA_SQL)
        .map_err(|e| ChatTracksError::StorageWrite(e.to_string()))?;
    debug!(path = %path.display(), "fts store ready");
    Ok(true)
}

fn open_existing(path: &Path) -> Option<Connection> {
    if !path.is_file() {
        return None;
    }
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .ok()
}

/// Message ids already present in the metadata table.
///
/// Returns an empty set when the database or table does not exist.
#[must_use]
pub fn get_indexed_message_ids(path: &Path) -> HashSet<i64> {
    let Some(conn) = open_existing(path) else {
        return HashSet::new();
    };
    let Ok(mut stmt) = conn.prepare(&format!(
        "SELECT message_id FROM {}",
        fts::METADATA_TABLE
    )) else {
        return HashSet::new();
    };
    let Ok(rows) = stmt.query_map([], |row| row.get::<_, i64>(0)) else {
        return HashSet::new();
    };
    rows.filter_map(std::result::Result::ok).collect()
}

/// Index prepared rows not yet present in the FTS metadata, then upsert the
/// per-source status row. Returns the number of rows newly indexed.
pub fn index_prepared_messages(
    fts_path: &Path,
    store: &PreparedStore,
    source_db_path: &Path,
) -> Result<usize> {
    create_fts_database(fts_path)?;
    let already_indexed = get_indexed_message_ids(fts_path);

    let candidates = store.get_messages(None, None, None, None)?;
    let pending: Vec<_> = candidates
        .into_iter()
        .filter(|message| !already_indexed.contains(&message.message_id))
        .collect();
    if pending.is_empty() {
        return Ok(0);
    }

    let mut conn = Connection::open(fts_path)?;
    let now = Utc::now().naive_utc().format("%Y-%m-%d %H:%M:%S").to_string();
    let tx = conn.transaction()?;
    {
        let mut fts_stmt = tx.prepare_cached(&format!(
            "INSERT INTO {} (message_id, chat_id, date, extracted_text, original_text) \
             VALUES (?, ?, ?, ?, ?)",
            fts::TEXT_TABLE
        ))?;
        let mut meta_stmt = tx.prepare_cached(&format!(
            "INSERT OR REPLACE INTO {} \
             (message_id, chat_id, date, is_from_me, handle_id, has_attributed_body, last_updated) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            fts::METADATA_TABLE
        ))?;
        for message in &pending {
            let date = message
                .date_utc
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string());
            let extracted = message.parsed_body.text.clone();
            fts_stmt.execute(params![
                message.message_id,
                message.chat_id,
                date,
                extracted,
                message.final_text,
            ])?;
            meta_stmt.execute(params![
                message.message_id,
                message.chat_id,
                date,
                message.is_from_me,
                message.handle_id,
                i64::from(message.parsed_body != crate::models::ParsedBody::default()),
                now,
            ])?;
        }
    }

    let last_indexed_date: Option<String> = pending
        .iter()
        .filter_map(|message| message.date_utc)
        .max()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string());
    let total: i64 = tx.query_row(
        &format!("SELECT COUNT(*) FROM {}", fts::METADATA_TABLE),
        [],
        |row| row.get(0),
    )?;
    tx.execute(
        &format!(
            "INSERT INTO {} (source_db_path, last_indexed_date, total_messages_indexed, last_updated) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(source_db_path) DO UPDATE SET \
               last_indexed_date = excluded.last_indexed_date, \
               total_messages_indexed = excluded.total_messages_indexed, \
               last_updated = excluded.last_updated",
            fts::STATUS_TABLE
        ),
        params![
            source_db_path.to_string_lossy(),
            last_indexed_date,
            total,
            now
        ],
    )?;
    tx.commit()
        .map_err(|e| ChatTracksError::StorageWrite(e.to_string()))?;

    MetricsCollector::default().record_messages_indexed(pending.len());
    info!(indexed = pending.len(), "fts index updated");
    Ok(pending.len())
}

/// Reduce a raw search term to a safe fts5 prefix-match expression.
///
/// Quotes, SQL keywords, and fts operators are stripped rather than quoted:
/// fts5 raises syntax errors on stray punctuation and the search contract is
/// that adversarial input matches nothing instead of erroring. Tokens are
/// lowercased so the operator keywords (`AND`, `OR`, `NOT`, `NEAR`), which
/// fts5 only recognizes in uppercase, become plain terms; the default
/// tokenizer case-folds, so matching is unaffected.
fn build_fts_match_expr(term: &str) -> Option<String> {
    let tokens: Vec<String> = term
        .split_whitespace()
        .map(|token| {
            token
                .chars()
                .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|token| !token.is_empty())
        .map(|token| format!("{token}*"))
        .collect();

    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" AND "))
    }
}

/// Full-text search over extracted and original text.
///
/// The term is always a bound parameter. An optional `chat_ids` set
/// restricts results; an optional `limit` caps them. A missing database
/// yields an empty result set.
pub fn search_fts(
    path: &Path,
    term: &str,
    chat_ids: Option<&[i64]>,
    limit: Option<usize>,
) -> Result<Vec<FtsHit>> {
    let Some(conn) = open_existing(path) else {
        return Ok(Vec::new());
    };
    let Some(match_expr) = build_fts_match_expr(term) else {
        return Ok(Vec::new());
    };

    let mut sql = format!(
        "SELECT message_id, chat_id, date, extracted_text, original_text \
         FROM {} WHERE {} MATCH ?",
        fts::TEXT_TABLE,
        fts::TEXT_TABLE
    );
    let mut bound: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(match_expr)];

    if let Some(chat_ids) = chat_ids {
        sql.push_str(&format!(
            " AND chat_id IN ({})",
            build_placeholders(chat_ids.len())
        ));
        for chat_id in chat_ids {
            bound.push(Box::new(*chat_id));
        }
    }
    sql.push_str(" ORDER BY date DESC");
    if let Some(limit) = limit {
        sql.push_str(" LIMIT ?");
        bound.push(Box::new(limit as i64));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(bound.iter()), |row| {
        Ok(FtsHit {
            message_id: row.get(0)?,
            chat_id: row.get(1)?,
            date: row.get(2)?,
            extracted_text: row.get(3)?,
            original_text: row.get(4)?,
        })
    })?;

    MetricsCollector::default().record_search();
    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Status summary, or `None` when the store does not exist.
pub fn get_fts_status(path: &Path) -> Result<Option<FtsStatus>> {
    let Some(conn) = open_existing(path) else {
        return Ok(None);
    };

    let total: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM {}", fts::METADATA_TABLE),
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    let status_row = conn
        .query_row(
            &format!(
                "SELECT source_db_path, last_indexed_date, last_updated \
                 FROM {} ORDER BY last_updated DESC LIMIT 1",
                fts::STATUS_TABLE
            ),
            [],
            |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()
        .unwrap_or(None);

    let (source_db_path, last_indexed_date, last_updated) =
        status_row.unwrap_or((None, None, None));

    Ok(Some(FtsStatus {
        total_messages_indexed: total,
        source_db_path,
        last_indexed_date,
        last_updated,
    }))
}

/// True when the store exists and holds at least one indexed message.
#[must_use]
pub fn is_fts_available(path: &Path) -> bool {
    match get_fts_status(path) {
        Ok(Some(status)) => status.total_messages_indexed > 0,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_sibling_fts_path() {
        let path = fts_db_path(Path::new("/tmp/exports/chat.db"));
        assert_eq!(path, Path::new("/tmp/exports/chat.fts.db"));
    }

    #[test]
    fn match_expr_strips_operators() {
        assert_eq!(
            build_fts_match_expr("hello world").as_deref(),
            Some("hello* AND world*")
        );
        assert_eq!(
            build_fts_match_expr("'; DROP TABLE message_metadata;--").as_deref(),
            Some("drop* AND table* AND message_metadata*")
        );
        assert_eq!(build_fts_match_expr("'\"("), None);
        assert_eq!(build_fts_match_expr("   "), None);
    }

    #[test]
    fn match_expr_neutralizes_fts_keywords() {
        // uppercase NOT/NEAR/AND/OR would be fts5 syntax errors as bare terms
        assert_eq!(build_fts_match_expr("NOT").as_deref(), Some("not*"));
        assert_eq!(
            build_fts_match_expr("hello NOT").as_deref(),
            Some("hello* AND not*")
        );
        assert_eq!(
            build_fts_match_expr("NEAR( AND OR NOT").as_deref(),
            Some("near* AND and* AND or* AND not*")
        );
    }
}
