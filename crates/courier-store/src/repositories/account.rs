//! Account table queries.

use courier_core::account::{Account, AccountStatus};
use courier_core::ids::AccountId;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::warn;

use crate::errors::Result;

/// Per-lifecycle-event column update. `None` fields are written as NULL —
/// the caller supplies the full session state, which keeps the write
/// idempotent under duplicate events.
#[derive(Debug, Default)]
pub struct SessionStateUpdate<'a> {
    /// New status.
    pub status: AccountStatus,
    /// Routing number (set at `ready`).
    pub phone_number: Option<&'a str>,
    /// QR payload (cleared at `ready`).
    pub qr_payload: Option<&'a str>,
    /// Lifecycle error detail.
    pub error_message: Option<&'a str>,
}

/// Queries over the `accounts` table.
pub struct AccountRepo;

impl AccountRepo {
    /// Insert a freshly created account.
    pub fn insert(conn: &Connection, account: &Account) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO accounts (id, name, description, status, phone_number, qr_payload, error_message, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                account.id.as_str(),
                account.name,
                account.description,
                account.status.as_str(),
                account.phone_number,
                account.qr_payload,
                account.error_message,
                account.created_at,
                account.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Fetch one account by id.
    pub fn get_by_id(conn: &Connection, id: &AccountId) -> Result<Option<Account>> {
        let account = conn
            .query_row(
                "SELECT id, name, description, status, phone_number, qr_payload, error_message, created_at, updated_at
                 FROM accounts WHERE id = ?1",
                params![id.as_str()],
                map_account,
            )
            .optional()?;
        Ok(account)
    }

    /// List all accounts, oldest first.
    pub fn list(conn: &Connection) -> Result<Vec<Account>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, description, status, phone_number, qr_payload, error_message, created_at, updated_at
             FROM accounts ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([], map_account)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Write the full session state for an account. Returns `false` when no
    /// row matched (account deleted concurrently).
    pub fn update_session_state(
        conn: &Connection,
        id: &AccountId,
        update: &SessionStateUpdate<'_>,
    ) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE accounts
             SET status = ?1, phone_number = ?2, qr_payload = ?3, error_message = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                update.status.as_str(),
                update.phone_number,
                update.qr_payload,
                update.error_message,
                now,
                id.as_str(),
            ],
        )?;
        Ok(changed > 0)
    }

    /// Delete an account row (webhooks cascade).
    pub fn delete(conn: &Connection, id: &AccountId) -> Result<bool> {
        let changed = conn.execute("DELETE FROM accounts WHERE id = ?1", params![id.as_str()])?;
        Ok(changed > 0)
    }
}

fn map_account(row: &Row<'_>) -> rusqlite::Result<Account> {
    let status_raw: String = row.get(3)?;
    let status = AccountStatus::parse(&status_raw).unwrap_or_else(|| {
        warn!(status = %status_raw, "unknown account status in store, treating as disconnected");
        AccountStatus::Disconnected
    });
    Ok(Account {
        id: AccountId::from_string(row.get::<_, String>(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        status,
        phone_number: row.get(4)?,
        qr_payload: row.get(5)?,
        error_message: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionConfig, new_in_memory};
    use crate::migrations::run_migrations;

    fn setup() -> crate::connection::ConnectionPool {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            run_migrations(&conn).unwrap();
        }
        pool
    }

    #[test]
    fn insert_and_get_round_trip() {
        let pool = setup();
        let conn = pool.get().unwrap();
        let account = Account::new("support", Some("front desk".into()));
        AccountRepo::insert(&conn, &account).unwrap();

        let loaded = AccountRepo::get_by_id(&conn, &account.id).unwrap().unwrap();
        assert_eq!(loaded.name, "support");
        assert_eq!(loaded.status, AccountStatus::Initializing);
        assert_eq!(loaded.description.as_deref(), Some("front desk"));
    }

    #[test]
    fn get_missing_returns_none() {
        let pool = setup();
        let conn = pool.get().unwrap();
        let missing = AccountRepo::get_by_id(&conn, &AccountId::from("acct_missing")).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn update_session_state_overwrites_all_columns() {
        let pool = setup();
        let conn = pool.get().unwrap();
        let account = Account::new("a", None);
        AccountRepo::insert(&conn, &account).unwrap();

        // qr_ready with a payload
        let updated = AccountRepo::update_session_state(
            &conn,
            &account.id,
            &SessionStateUpdate {
                status: AccountStatus::QrReady,
                qr_payload: Some("QRDATA"),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(updated);
        let loaded = AccountRepo::get_by_id(&conn, &account.id).unwrap().unwrap();
        assert_eq!(loaded.status, AccountStatus::QrReady);
        assert_eq!(loaded.qr_payload.as_deref(), Some("QRDATA"));

        // ready clears the QR and sets the phone number
        let _ = AccountRepo::update_session_state(
            &conn,
            &account.id,
            &SessionStateUpdate {
                status: AccountStatus::Ready,
                phone_number: Some("15551234"),
                ..Default::default()
            },
        )
        .unwrap();
        let loaded = AccountRepo::get_by_id(&conn, &account.id).unwrap().unwrap();
        assert_eq!(loaded.status, AccountStatus::Ready);
        assert!(loaded.qr_payload.is_none());
        assert_eq!(loaded.phone_number.as_deref(), Some("15551234"));
    }

    #[test]
    fn update_missing_returns_false() {
        let pool = setup();
        let conn = pool.get().unwrap();
        let updated = AccountRepo::update_session_state(
            &conn,
            &AccountId::from("acct_missing"),
            &SessionStateUpdate::default(),
        )
        .unwrap();
        assert!(!updated);
    }

    #[test]
    fn list_orders_by_creation() {
        let pool = setup();
        let conn = pool.get().unwrap();
        let first = Account::new("first", None);
        let second = Account::new("second", None);
        AccountRepo::insert(&conn, &first).unwrap();
        AccountRepo::insert(&conn, &second).unwrap();

        let all = AccountRepo::list(&conn).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "first");
    }

    #[test]
    fn delete_removes_row() {
        let pool = setup();
        let conn = pool.get().unwrap();
        let account = Account::new("gone", None);
        AccountRepo::insert(&conn, &account).unwrap();
        assert!(AccountRepo::delete(&conn, &account.id).unwrap());
        assert!(!AccountRepo::delete(&conn, &account.id).unwrap());
        assert!(AccountRepo::get_by_id(&conn, &account.id).unwrap().is_none());
    }

    #[test]
    fn unknown_status_degrades_to_disconnected() {
        let pool = setup();
        let conn = pool.get().unwrap();
        let account = Account::new("odd", None);
        AccountRepo::insert(&conn, &account).unwrap();
        let _ = conn
            .execute(
                "UPDATE accounts SET status = 'hibernating' WHERE id = ?1",
                params![account.id.as_str()],
            )
            .unwrap();
        let loaded = AccountRepo::get_by_id(&conn, &account.id).unwrap().unwrap();
        assert_eq!(loaded.status, AccountStatus::Disconnected);
    }
}
