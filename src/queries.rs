//! Parameterized SQL construction for the source and prepared stores.
//!
//! Every dynamic fragment is either a bound-parameter placeholder list or a
//! value checked against a closed allowlist. Untrusted input is never
//! interpolated into SQL text.

use crate::schema::{source_handle, source_joins, source_message};

/// Allowed `ORDER BY` clauses for the chat statistics query.
/// Matching is exact and case-sensitive; anything else falls back to the
/// default ordering.
pub const CHAT_STATS_ORDER_ALLOWLIST: &[&str] = &[
    "message_count DESC",
    "message_count ASC",
    "member_count DESC",
    "member_count ASC",
    "last_message_date DESC",
    "last_message_date ASC",
];

/// Default ordering for the chat statistics query.
pub const CHAT_STATS_DEFAULT_ORDER: &str = "message_count DESC";

/// Seconds between the Unix epoch and the source's 2001-01-01 epoch.
const APPLE_EPOCH_OFFSET: i64 = 978_307_200;

/// SQL expression resolving the raw source date column to a UTC datetime.
///
/// Modern exports store nanoseconds since 2001-01-01; older ones store
/// seconds. Values above 10^11 cannot be second-scale, so they are divided
/// down first.
fn resolved_date_expr(column: &str) -> String {
    format!(
        "datetime(CASE WHEN {column} > 100000000000 THEN {column} / 1000000000 \
         ELSE {column} END + {APPLE_EPOCH_OFFSET}, 'unixepoch')"
    )
}

/// Build a comma-joined positional placeholder list.
///
/// Returns the literal `NULL` for a non-positive count so a surrounding
/// `IN (...)` clause matches nothing instead of being a syntax error.
#[must_use]
pub fn build_placeholders(count: usize) -> String {
    if count == 0 {
        return "NULL".to_string();
    }
    vec!["?"; count].join(",")
}

/// Query for messages with a usable body in a set of chats.
///
/// Selects message id, text, attributed body, resolved UTC timestamp,
/// sender contact, and chat id; skips rows where both body columns are
/// null; excludes reactions (nonzero `associated_message_type`); orders by
/// source date descending. Binds, in order: the chat ids for
/// `placeholders`, then an inclusive `[start, end]` UTC date range.
#[must_use]
pub fn messages_with_body_query(placeholders: &str) -> String {
    let date_col = format!("m.{}", source_message::DATE);
    let date_expr = resolved_date_expr(&date_col);
    format!(
        "SELECT m.{rowid} AS message_id, \
                m.{text}, \
                m.{body} AS attributed_body, \
                {date_expr} AS date_utc, \
                h.{handle_identifier} AS sender_contact, \
                cmj.{chat_id} \
         FROM {message_table} m \
         JOIN {chat_message_join} cmj ON cmj.{join_message_id} = m.{rowid} \
         LEFT JOIN {handle_table} h ON h.{handle_rowid} = m.{sender_handle} \
         WHERE cmj.{chat_id} IN ({placeholders}) \
           AND (m.{text} IS NOT NULL OR m.{body} IS NOT NULL) \
           AND m.{reaction_type} = 0 \
           AND {date_expr} BETWEEN ? AND ? \
         ORDER BY {date_col} DESC",
        rowid = source_message::ROWID,
        text = source_message::TEXT,
        body = source_message::ATTRIBUTED_BODY,
        handle_identifier = source_handle::ID,
        chat_id = source_joins::CHAT_ID,
        message_table = source_message::TABLE,
        chat_message_join = source_joins::CHAT_MESSAGE,
        join_message_id = source_joins::MESSAGE_ID,
        handle_table = source_handle::TABLE,
        handle_rowid = source_handle::ROWID,
        sender_handle = source_message::HANDLE_ID,
        reaction_type = source_message::ASSOCIATED_MESSAGE_TYPE,
    )
}

/// Per-chat aggregate query: message count, member count, newest message
/// date, grouped by chat, excluding empty chats.
///
/// `order_by` must match the allowlist exactly or the default ordering is
/// used; `limit` is coerced to an integer before interpolation and omitted
/// when `None`.
#[must_use]
pub fn chat_stats_query(placeholders: &str, order_by: Option<&str>, limit: Option<i64>) -> String {
    let order_by = order_by
        .filter(|candidate| CHAT_STATS_ORDER_ALLOWLIST.contains(candidate))
        .unwrap_or(CHAT_STATS_DEFAULT_ORDER);

    let date_expr = resolved_date_expr(&format!("MAX(m.{})", source_message::DATE));
    let mut sql = format!(
        "SELECT cmj.{chat_id}, \
                COUNT(m.{rowid}) AS message_count, \
                (SELECT COUNT(*) FROM {chat_handle_join} chj \
                  WHERE chj.{chat_id} = cmj.{chat_id}) AS member_count, \
                {date_expr} AS last_message_date \
         FROM {chat_message_join} cmj \
         JOIN {message_table} m ON m.{rowid} = cmj.{join_message_id} \
         WHERE cmj.{chat_id} IN ({placeholders}) \
         GROUP BY cmj.{chat_id} \
         HAVING message_count > 0 \
         ORDER BY {order_by}",
        chat_id = source_joins::CHAT_ID,
        rowid = source_message::ROWID,
        chat_handle_join = source_joins::CHAT_HANDLE,
        chat_message_join = source_joins::CHAT_MESSAGE,
        message_table = source_message::TABLE,
        join_message_id = source_joins::MESSAGE_ID,
    );
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    sql
}

/// Cursor query for the ingestion engine: message rows past a checkpoint,
/// ascending, with the chat id resolved through the join table. Binds the
/// checkpoint rowid and the batch size.
#[must_use]
pub fn messages_after_rowid_query() -> String {
    format!(
        "SELECT m.{rowid}, \
                m.{text}, \
                m.{body}, \
                m.{date}, \
                m.{is_from_me}, \
                m.{sender_handle}, \
                m.{reaction_type}, \
                (SELECT cmj.{chat_id} FROM {chat_message_join} cmj \
                  WHERE cmj.{join_message_id} = m.{rowid} LIMIT 1) AS chat_id \
         FROM {message_table} m \
         WHERE m.{rowid} > ? \
         ORDER BY m.{rowid} ASC \
         LIMIT ?",
        rowid = source_message::ROWID,
        text = source_message::TEXT,
        body = source_message::ATTRIBUTED_BODY,
        date = source_message::DATE,
        is_from_me = source_message::IS_FROM_ME,
        sender_handle = source_message::HANDLE_ID,
        reaction_type = source_message::ASSOCIATED_MESSAGE_TYPE,
        chat_id = source_joins::CHAT_ID,
        chat_message_join = source_joins::CHAT_MESSAGE,
        join_message_id = source_joins::MESSAGE_ID,
        message_table = source_message::TABLE,
    )
}

/// Cursor query for contact ingestion: handle rows past a checkpoint.
/// Binds the checkpoint rowid and the batch size.
#[must_use]
pub fn handles_after_rowid_query() -> String {
    format!(
        "SELECT {rowid}, {id}, {uncanonicalized} \
         FROM {handle_table} \
         WHERE {rowid} > ? \
         ORDER BY {rowid} ASC \
         LIMIT ?",
        rowid = source_handle::ROWID,
        id = source_handle::ID,
        uncanonicalized = source_handle::UNCANONICALIZED_ID,
        handle_table = source_handle::TABLE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_for_zero_is_null_literal() {
        assert_eq!(build_placeholders(0), "NULL");
    }

    #[test]
    fn placeholders_are_comma_joined() {
        assert_eq!(build_placeholders(1), "?");
        assert_eq!(build_placeholders(3), "?,?,?");
    }

    #[test]
    fn order_by_outside_allowlist_falls_back() {
        let sql = chat_stats_query("?", Some("'; DROP TABLE message;--"), None);
        assert!(sql.contains(&format!("ORDER BY {CHAT_STATS_DEFAULT_ORDER}")));
        assert!(!sql.contains("DROP TABLE"));

        // case-sensitive exact match only
        let sql = chat_stats_query("?", Some("message_count desc"), None);
        assert!(sql.contains(&format!("ORDER BY {CHAT_STATS_DEFAULT_ORDER}")));
    }

    #[test]
    fn order_by_in_allowlist_is_used() {
        let sql = chat_stats_query("?", Some("last_message_date ASC"), None);
        assert!(sql.contains("ORDER BY last_message_date ASC"));
    }

    #[test]
    fn limit_is_integer_interpolated() {
        let sql = chat_stats_query("?", None, Some(25));
        assert!(sql.ends_with("LIMIT 25"));
        let sql = chat_stats_query("?", None, None);
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn message_query_excludes_reactions() {
        let sql = messages_with_body_query("?,?");
        assert!(sql.contains("associated_message_type = 0"));
        assert!(sql.contains("IN (?,?)"));
        assert!(sql.contains("ORDER BY m.date DESC"));
    }
}
