//! Delivery log queries: batch append plus bounded reads.
//!
//! The batch insert is schema-drift tolerant. Deployments that roll the
//! binary forward before the database (or restore an old backup) may lack
//! recently added columns; rather than failing the whole batch, the insert
//! retries once with the offending column stripped.

use courier_core::ids::AccountId;
use courier_core::webhook::{DeliveryDirection, DeliveryRecord, DeliveryStatus};
use rusqlite::{Connection, Row, params};
use tracing::warn;

use crate::errors::Result;

/// Columns written by the full-schema insert, in bind order.
const FULL_COLUMNS: &[&str] = &[
    "account_id",
    "direction",
    "status",
    "recipient",
    "message",
    "error_message",
    "media_url",
    "created_at",
];

/// A delivery log row as read back from the store.
#[derive(Clone, Debug)]
pub struct DeliveryLogRow {
    /// Rowid.
    pub id: i64,
    /// The record.
    pub record: DeliveryRecord,
}

/// Queries over the `delivery_logs` table.
pub struct DeliveryLogRepo;

impl DeliveryLogRepo {
    /// Append a batch of records in one transaction.
    ///
    /// On a "no such column" failure the named column is dropped from the
    /// column list and the batch retried once.
    pub fn insert_batch(conn: &Connection, records: &[DeliveryRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        match Self::insert_batch_with_columns(conn, records, FULL_COLUMNS) {
            Ok(()) => Ok(()),
            Err(err) => match missing_column(&err) {
                Some(column) => {
                    warn!(column = %column, "delivery log column missing, retrying batch without it");
                    let reduced: Vec<&str> = FULL_COLUMNS
                        .iter()
                        .copied()
                        .filter(|c| *c != column)
                        .collect();
                    Self::insert_batch_with_columns(conn, records, &reduced)
                }
                None => Err(err),
            },
        }
    }

    fn insert_batch_with_columns(
        conn: &Connection,
        records: &[DeliveryRecord],
        columns: &[&str],
    ) -> Result<()> {
        let placeholders: Vec<String> =
            (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO delivery_logs ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );

        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for record in records {
                let values: Vec<Box<dyn rusqlite::ToSql>> = columns
                    .iter()
                    .map(|column| bind_value(record, column))
                    .collect();
                let refs: Vec<&dyn rusqlite::ToSql> =
                    values.iter().map(AsRef::as_ref).collect();
                let _ = stmt.execute(refs.as_slice())?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Most recent rows for an account, newest first.
    pub fn list_recent(
        conn: &Connection,
        account_id: &AccountId,
        limit: i64,
    ) -> Result<Vec<DeliveryLogRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, account_id, direction, status, recipient, message, error_message, media_url, created_at
             FROM delivery_logs WHERE account_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![account_id.as_str(), limit], map_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Total rows for an account.
    pub fn count_for_account(conn: &Connection, account_id: &AccountId) -> Result<i64> {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM delivery_logs WHERE account_id = ?1",
            params![account_id.as_str()],
            |row| row.get(0),
        )?)
    }
}

fn bind_value(record: &DeliveryRecord, column: &str) -> Box<dyn rusqlite::ToSql> {
    match column {
        "account_id" => Box::new(record.account_id.as_str().to_string()),
        "direction" => Box::new(record.direction.as_str()),
        "status" => Box::new(record.status.as_str()),
        "recipient" => Box::new(record.recipient.clone()),
        "message" => Box::new(record.message.clone()),
        "error_message" => Box::new(record.error_message.clone()),
        "media_url" => Box::new(record.media_url.clone()),
        "created_at" => Box::new(record.created_at.clone()),
        other => {
            warn!(column = %other, "unknown delivery log column requested, binding NULL");
            Box::new(None::<String>)
        }
    }
}

/// Extract the column name from a "no such column" / "has no column named"
/// sqlite error, if that is what this error is.
fn missing_column(err: &crate::StoreError) -> Option<String> {
    let crate::StoreError::Sqlite(sqlite) = err else {
        return None;
    };
    let text = sqlite.to_string();
    text.split_once("no such column: ")
        .or_else(|| text.split_once("has no column named "))
        .map(|(_, column)| column.trim().to_string())
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<DeliveryLogRow> {
    let direction_raw: String = row.get(2)?;
    let status_raw: String = row.get(3)?;
    let direction = match direction_raw.as_str() {
        "incoming" => DeliveryDirection::Incoming,
        "outgoing" => DeliveryDirection::Outgoing,
        "webhook_incoming" => DeliveryDirection::WebhookIncoming,
        _ => DeliveryDirection::Webhook,
    };
    let status = if status_raw == "success" {
        DeliveryStatus::Success
    } else {
        DeliveryStatus::Failed
    };
    Ok(DeliveryLogRow {
        id: row.get(0)?,
        record: DeliveryRecord {
            account_id: AccountId::from_string(row.get::<_, String>(1)?),
            direction,
            status,
            recipient: row.get(4)?,
            message: row.get(5)?,
            error_message: row.get(6)?,
            media_url: row.get(7)?,
            created_at: row.get(8)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionConfig, ConnectionPool, new_in_memory};
    use crate::migrations::run_migrations;

    fn setup() -> ConnectionPool {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            run_migrations(&conn).unwrap();
        }
        pool
    }

    fn record(account: &str, n: usize) -> DeliveryRecord {
        DeliveryRecord::success(
            AccountId::from(account),
            DeliveryDirection::Outgoing,
            Some(format!("91555000{n}@c.us")),
            Some(format!("msg {n}")),
        )
    }

    #[test]
    fn batch_insert_and_read_back() {
        let pool = setup();
        let conn = pool.get().unwrap();
        let batch: Vec<_> = (0..3).map(|n| record("acct_1", n)).collect();
        DeliveryLogRepo::insert_batch(&conn, &batch).unwrap();

        assert_eq!(
            DeliveryLogRepo::count_for_account(&conn, &AccountId::from("acct_1")).unwrap(),
            3
        );
        let rows = DeliveryLogRepo::list_recent(&conn, &AccountId::from("acct_1"), 10).unwrap();
        assert_eq!(rows.len(), 3);
        // Newest first.
        assert_eq!(rows[0].record.message.as_deref(), Some("msg 2"));
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let pool = setup();
        let conn = pool.get().unwrap();
        DeliveryLogRepo::insert_batch(&conn, &[]).unwrap();
        assert_eq!(
            DeliveryLogRepo::count_for_account(&conn, &AccountId::from("acct_1")).unwrap(),
            0
        );
    }

    #[test]
    fn media_url_round_trips() {
        let pool = setup();
        let conn = pool.get().unwrap();
        let rec = record("acct_1", 0).with_media_url(Some("https://cdn.example.com/a.jpg".into()));
        DeliveryLogRepo::insert_batch(&conn, &[rec]).unwrap();
        let rows = DeliveryLogRepo::list_recent(&conn, &AccountId::from("acct_1"), 1).unwrap();
        assert_eq!(
            rows[0].record.media_url.as_deref(),
            Some("https://cdn.example.com/a.jpg")
        );
    }

    #[test]
    fn drifted_schema_still_accepts_batch() {
        // Simulate a database that predates the media_url column: v1 schema
        // without the v2 ALTER TABLE.
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        conn.execute_batch(
            "CREATE TABLE delivery_logs (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id    TEXT NOT NULL,
                direction     TEXT NOT NULL,
                status        TEXT NOT NULL,
                recipient     TEXT,
                message       TEXT,
                error_message TEXT,
                created_at    TEXT NOT NULL
            );",
        )
        .unwrap();

        let rec = record("acct_1", 0).with_media_url(Some("https://cdn.example.com/a.jpg".into()));
        DeliveryLogRepo::insert_batch(&conn, &[rec]).unwrap();
        assert_eq!(
            DeliveryLogRepo::count_for_account(&conn, &AccountId::from("acct_1")).unwrap(),
            1
        );
    }

    #[test]
    fn missing_column_parser_reads_sqlite_messages() {
        let err = crate::StoreError::Internal("nope".into());
        assert!(missing_column(&err).is_none());
    }

    #[test]
    fn failed_record_round_trips_error_detail() {
        let pool = setup();
        let conn = pool.get().unwrap();
        let rec = DeliveryRecord::failure(
            AccountId::from("acct_1"),
            DeliveryDirection::Webhook,
            Some("https://example.com/hook".into()),
            None,
            "connect timeout",
        );
        DeliveryLogRepo::insert_batch(&conn, &[rec]).unwrap();
        let rows = DeliveryLogRepo::list_recent(&conn, &AccountId::from("acct_1"), 1).unwrap();
        assert_eq!(rows[0].record.status, DeliveryStatus::Failed);
        assert_eq!(rows[0].record.error_message.as_deref(), Some("connect timeout"));
    }
}
