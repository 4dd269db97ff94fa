//! Integration tests for the checkpointed ingestion engine

use std::path::Path;

use chattracks::ingest::{ingest_prepared_store, IngestOptions, SourceStore};
use chattracks::prepared::{PreparedStore, DB_VERSION};
use chattracks::ChatTracksError;
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use tempfile::TempDir;

/// Seconds between the Unix epoch and the source 2001-01-01 epoch.
const APPLE_EPOCH_OFFSET: i64 = 978_307_200;

fn create_source_db(path: &Path) -> Connection {
    let conn = Connection::open(path).expect("Failed to create source db");
    conn.execute_batch(
        "CREATE TABLE message (
            ROWID INTEGER PRIMARY KEY,
            text TEXT,
            attributedBody BLOB,
            date INTEGER,
            is_from_me INTEGER DEFAULT 0,
            handle_id INTEGER,
            associated_message_type INTEGER DEFAULT 0
        );
        CREATE TABLE handle (
            ROWID INTEGER PRIMARY KEY,
            id TEXT,
            uncanonicalized_id TEXT
        );
        CREATE TABLE chat (ROWID INTEGER PRIMARY KEY, chat_identifier TEXT);
        CREATE TABLE chat_message_join (chat_id INTEGER, message_id INTEGER);
        CREATE TABLE chat_handle_join (chat_id INTEGER, handle_id INTEGER);",
    )
    .expect("Failed to create source schema");
    conn
}

fn source_date(unix_seconds: i64) -> i64 {
    unix_seconds - APPLE_EPOCH_OFFSET
}

fn insert_message(conn: &Connection, rowid: i64, text: Option<&str>, handle_id: Option<i64>) {
    conn.execute(
        "INSERT INTO message (ROWID, text, date, handle_id) VALUES (?, ?, ?, ?)",
        params![rowid, text, source_date(1_704_067_200 + rowid), handle_id],
    )
    .expect("Failed to insert message");
    conn.execute(
        "INSERT INTO chat_message_join (chat_id, message_id) VALUES (1, ?)",
        params![rowid],
    )
    .expect("Failed to insert join row");
}

fn insert_handle(conn: &Connection, rowid: i64, id: &str) {
    conn.execute(
        "INSERT INTO handle (ROWID, id) VALUES (?, ?)",
        params![rowid, id],
    )
    .expect("Failed to insert handle");
}

#[test]
fn test_end_to_end_single_message() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let source_path = dir.path().join("chat.db");
    let base_dir = dir.path().join("prepared");

    let conn = create_source_db(&source_path);
    insert_handle(&conn, 1, "+15555555555");
    insert_message(
        &conn,
        1,
        Some("hello https://open.spotify.com/track/123"),
        Some(1),
    );
    drop(conn);

    let summary =
        ingest_prepared_store(&source_path, &base_dir, &IngestOptions::default())
            .expect("Ingestion failed");

    assert_eq!(summary.messages_processed, 1);
    assert_eq!(summary.contacts_processed, 1);
    assert_eq!(summary.last_message_rowid, 1);

    let store = PreparedStore::open(&base_dir).expect("Failed to open prepared store");
    assert_eq!(store.get_last_processed_rowid().unwrap(), 1);

    let message = store
        .get_message(1)
        .expect("Read failed")
        .expect("Message missing");
    assert!(message.has_spotify);
    assert_eq!(
        message.spotify_url.as_deref(),
        Some("https://open.spotify.com/track/123")
    );
    let hash = message.content_hash.expect("Hash missing");
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(message.sender_contact.as_deref(), Some("5555555555"));
    assert!(!message.is_from_me);
    assert_eq!(message.handle_id, Some(1));

    let contact = store
        .get_contact(1)
        .expect("Read failed")
        .expect("Contact missing");
    assert_eq!(contact.variants[0], "+15555555555");
}

#[test]
fn test_rerun_with_no_new_rows_is_noop() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let source_path = dir.path().join("chat.db");
    let base_dir = dir.path().join("prepared");

    let conn = create_source_db(&source_path);
    insert_handle(&conn, 1, "+15555555555");
    insert_message(&conn, 1, Some("first"), Some(1));
    insert_message(&conn, 2, Some("second"), Some(1));
    drop(conn);

    let first = ingest_prepared_store(&source_path, &base_dir, &IngestOptions::default())
        .expect("Ingestion failed");
    assert_eq!(first.messages_processed, 2);

    let second = ingest_prepared_store(&source_path, &base_dir, &IngestOptions::default())
        .expect("Re-run failed");
    assert_eq!(second.messages_processed, 0);
    assert_eq!(second.contacts_processed, 0);
    assert_eq!(second.last_message_rowid, first.last_message_rowid);
}

#[test]
fn test_incremental_matches_full_ingestion() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let source_path = dir.path().join("chat.db");
    let full_dir = dir.path().join("full");
    let incr_dir = dir.path().join("incremental");

    let conn = create_source_db(&source_path);
    insert_handle(&conn, 1, "+15551230001");
    for rowid in 1..=3 {
        insert_message(&conn, rowid, Some(&format!("msg {rowid}")), Some(1));
    }

    // first incremental pass over the initial rows
    let options = IngestOptions {
        batch_size: 2,
        ..IngestOptions::default()
    };
    let pass_one = ingest_prepared_store(&source_path, &incr_dir, &options)
        .expect("Incremental pass 1 failed");
    assert_eq!(pass_one.messages_processed, 3);

    // more rows arrive, then the remainder is ingested incrementally
    insert_message(&conn, 4, Some("msg 4 https://youtu.be/x"), Some(1));
    insert_message(&conn, 5, None, None);
    drop(conn);

    let pass_two = ingest_prepared_store(&source_path, &incr_dir, &options)
        .expect("Incremental pass 2 failed");
    assert_eq!(pass_two.messages_processed, 2);

    // a single full pass over the same final source
    let full = ingest_prepared_store(&source_path, &full_dir, &options)
        .expect("Full ingestion failed");
    assert_eq!(full.messages_processed, 5);
    assert_eq!(full.last_message_rowid, pass_two.last_message_rowid);

    let full_store = PreparedStore::open(&full_dir).expect("open failed");
    let incr_store = PreparedStore::open(&incr_dir).expect("open failed");
    assert_eq!(
        full_store.message_count().unwrap(),
        incr_store.message_count().unwrap()
    );
    for rowid in 1..=5 {
        let a = full_store.get_message(rowid).unwrap().expect("row missing");
        let b = incr_store.get_message(rowid).unwrap().expect("row missing");
        assert_eq!(a.final_text, b.final_text);
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.date_utc, b.date_utc);
        assert_eq!(a.sender_contact, b.sender_contact);
    }
}

#[test]
fn test_force_rebuild_resets_state() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let source_path = dir.path().join("chat.db");
    let base_dir = dir.path().join("prepared");

    let conn = create_source_db(&source_path);
    insert_handle(&conn, 1, "+15551230001");
    insert_message(&conn, 1, Some("one"), Some(1));
    insert_message(&conn, 2, Some("two"), Some(1));
    drop(conn);

    ingest_prepared_store(&source_path, &base_dir, &IngestOptions::default())
        .expect("Ingestion failed");

    let rebuild_options = IngestOptions {
        force_rebuild: true,
        ..IngestOptions::default()
    };
    let rebuilt = ingest_prepared_store(&source_path, &base_dir, &rebuild_options)
        .expect("Rebuild failed");

    // a rebuild re-ingests everything from scratch
    assert_eq!(rebuilt.messages_processed, 2);
    assert_eq!(rebuilt.last_message_rowid, 2);

    let store = PreparedStore::open(&base_dir).expect("open failed");
    assert_eq!(store.message_count().unwrap(), 2);
    assert_eq!(store.db_version().unwrap().as_deref(), Some(DB_VERSION));
}

#[test]
fn test_malformed_body_never_aborts_batch() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let source_path = dir.path().join("chat.db");
    let base_dir = dir.path().join("prepared");

    let conn = create_source_db(&source_path);
    conn.execute(
        "INSERT INTO message (ROWID, text, attributedBody, date) VALUES (1, NULL, ?, ?)",
        params![vec![0xdeu8, 0xad, 0xbe, 0xef], source_date(1_704_067_201)],
    )
    .expect("insert failed");
    conn.execute(
        "INSERT INTO chat_message_join (chat_id, message_id) VALUES (1, 1)",
        [],
    )
    .expect("insert failed");
    drop(conn);

    let summary =
        ingest_prepared_store(&source_path, &base_dir, &IngestOptions::default())
            .expect("Ingestion failed");
    assert_eq!(summary.messages_processed, 1);

    let store = PreparedStore::open(&base_dir).expect("open failed");
    let message = store.get_message(1).unwrap().expect("row missing");
    assert_eq!(message.final_text, "");
    assert_eq!(message.content_hash, None);
}

#[test]
fn test_messages_with_body_excludes_reactions() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let source_path = dir.path().join("chat.db");

    let conn = create_source_db(&source_path);
    insert_handle(&conn, 1, "+15551230001");
    insert_message(&conn, 1, Some("first"), Some(1));
    insert_message(&conn, 2, Some("second"), Some(1));
    // a reaction row and a bodyless row in the same chat
    conn.execute(
        "INSERT INTO message (ROWID, text, date, handle_id, associated_message_type) \
         VALUES (3, 'Loved a message', ?, 1, 2000)",
        params![source_date(1_704_067_203)],
    )
    .expect("insert failed");
    conn.execute(
        "INSERT INTO message (ROWID, text, attributedBody, date) VALUES (4, NULL, NULL, ?)",
        params![source_date(1_704_067_204)],
    )
    .expect("insert failed");
    for message_id in [3, 4] {
        conn.execute(
            "INSERT INTO chat_message_join (chat_id, message_id) VALUES (1, ?)",
            params![message_id],
        )
        .expect("insert failed");
    }
    // a message in another chat
    insert_message(&conn, 5, Some("elsewhere"), Some(1));
    conn.execute(
        "UPDATE chat_message_join SET chat_id = 2 WHERE message_id = 5",
        [],
    )
    .expect("update failed");
    drop(conn);

    let source = SourceStore::open(&source_path).expect("Failed to open source");
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();

    let rows = source
        .messages_with_body(&[1], start, end)
        .expect("Body query failed");
    // newest first; the reaction, bodyless, and other-chat rows are excluded
    let ids: Vec<i64> = rows.iter().map(|row| row.message_id).collect();
    assert_eq!(ids, vec![2, 1]);
    assert_eq!(rows[0].text.as_deref(), Some("second"));
    assert_eq!(rows[0].sender_contact.as_deref(), Some("+15551230001"));
    assert_eq!(rows[0].chat_id, 1);
    assert!(rows[0].date_utc.as_deref().unwrap().starts_with("2024-01-01"));

    // a range that precedes every row matches nothing
    let early_end = NaiveDate::from_ymd_opt(2020, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    assert!(source
        .messages_with_body(&[1], early_end, early_end)
        .unwrap()
        .is_empty());
}

#[test]
fn test_chat_stats_aggregates_and_sanitizes_order_by() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let source_path = dir.path().join("chat.db");

    let conn = create_source_db(&source_path);
    insert_handle(&conn, 1, "+15551230001");
    insert_handle(&conn, 2, "+15551230002");
    // chat 1 has two messages and two members, chat 2 has one of each
    insert_message(&conn, 1, Some("a"), Some(1));
    insert_message(&conn, 2, Some("b"), Some(2));
    conn.execute(
        "UPDATE chat_message_join SET chat_id = 2 WHERE message_id = 2",
        [],
    )
    .expect("update failed");
    conn.execute(
        "INSERT INTO message (ROWID, text, date, handle_id) VALUES (3, 'c', ?, 2)",
        params![source_date(1_704_067_203)],
    )
    .expect("insert failed");
    conn.execute(
        "INSERT INTO chat_message_join (chat_id, message_id) VALUES (1, 3)",
        [],
    )
    .expect("insert failed");
    for (chat_id, handle_id) in [(1, 1), (1, 2), (2, 2)] {
        conn.execute(
            "INSERT INTO chat_handle_join (chat_id, handle_id) VALUES (?, ?)",
            params![chat_id, handle_id],
        )
        .expect("insert failed");
    }
    drop(conn);

    let source = SourceStore::open(&source_path).expect("Failed to open source");
    let stats = source
        .chat_stats(&[1, 2], None, None)
        .expect("Stats query failed");
    assert_eq!(stats.len(), 2);
    // default ordering is message_count DESC
    assert_eq!(stats[0].chat_id, 1);
    assert_eq!(stats[0].message_count, 2);
    assert_eq!(stats[0].member_count, 2);
    assert_eq!(stats[1].chat_id, 2);
    assert_eq!(stats[1].message_count, 1);
    assert_eq!(stats[1].member_count, 1);
    assert!(stats[0].last_message_date.is_some());

    // an injection attempt in order_by falls back to the default ordering
    let hostile = source
        .chat_stats(&[1, 2], Some("1; DROP TABLE message;--"), Some(1))
        .expect("Sanitized query failed");
    assert_eq!(hostile.len(), 1);
    assert_eq!(hostile[0].chat_id, 1);

    // the message table survived
    let reopened = SourceStore::open(&source_path).expect("Failed to reopen source");
    assert_eq!(reopened.messages_after(0, 10).unwrap().len(), 3);
}

#[test]
fn test_missing_source_is_fatal() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let result = ingest_prepared_store(
        &dir.path().join("nope.db"),
        &dir.path().join("prepared"),
        &IngestOptions::default(),
    );
    assert!(matches!(
        result,
        Err(ChatTracksError::SourceUnavailable(_))
    ));
}

#[test]
fn test_zero_batch_size_is_rejected() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let source_path = dir.path().join("chat.db");
    drop(create_source_db(&source_path));

    let options = IngestOptions {
        batch_size: 0,
        ..IngestOptions::default()
    };
    assert!(
        ingest_prepared_store(&source_path, &dir.path().join("prepared"), &options).is_err()
    );
}
