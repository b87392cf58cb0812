//! Versioned schema migrations.
//!
//! Applied sequentially, tracked via `PRAGMA user_version`. Each entry runs
//! in its own transaction; a half-applied migration never bumps the
//! version.

use rusqlite::Connection;
use tracing::info;

use crate::errors::Result;

/// Ordered migration scripts. Index + 1 is the resulting `user_version`.
const MIGRATIONS: &[&str] = &[
    // v1 — initial schema
    "CREATE TABLE IF NOT EXISTS accounts (
        id            TEXT PRIMARY KEY,
        name          TEXT NOT NULL,
        description   TEXT,
        status        TEXT NOT NULL DEFAULT 'initializing',
        phone_number  TEXT,
        qr_payload    TEXT,
        error_message TEXT,
        created_at    TEXT NOT NULL,
        updated_at    TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS webhooks (
        id         TEXT PRIMARY KEY,
        account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        url        TEXT NOT NULL,
        secret     TEXT,
        is_active  INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_webhooks_account ON webhooks(account_id);
    CREATE TABLE IF NOT EXISTS delivery_logs (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        account_id    TEXT NOT NULL,
        direction     TEXT NOT NULL,
        status        TEXT NOT NULL,
        recipient     TEXT,
        message       TEXT,
        error_message TEXT,
        created_at    TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_delivery_logs_account
        ON delivery_logs(account_id, created_at);",
    // v2 — media URLs on delivery logs
    "ALTER TABLE delivery_logs ADD COLUMN media_url TEXT;",
];

/// Apply all pending migrations.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    for (idx, script) in MIGRATIONS.iter().enumerate() {
        let version = (idx + 1) as i64;
        if version <= current {
            continue;
        }
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(script)?;
        let _ = tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
        info!(version, "applied migration");
    }
    Ok(())
}

/// Current schema version.
pub fn schema_version(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}
