//! Connection pool construction and `SQLite` pragmas.

use std::path::Path;
use std::time::Duration;

use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::errors::Result;

/// Pooled connection type used throughout the crate.
pub type ConnectionPool = r2d2::Pool<SqliteConnectionManager>;
/// A single checked-out connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pool sizing and timeout knobs.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Maximum pooled connections.
    pub max_size: u32,
    /// How long a checkout may wait before erroring.
    pub connection_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_size: 8,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

fn init_pragmas(conn: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    // journal_mode returns a row, so pragma_update rather than a batch.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", 5000)
}

/// Open (or create) a database file and build a pool around it.
pub fn open_pool(path: &Path, config: &ConnectionConfig) -> Result<ConnectionPool> {
    let manager = SqliteConnectionManager::file(path).with_init(init_pragmas);
    let pool = r2d2::Pool::builder()
        .max_size(config.max_size)
        .connection_timeout(config.connection_timeout)
        .build(manager)?;
    info!(path = %path.display(), max_size = config.max_size, "database pool opened");
    Ok(pool)
}

/// In-memory pool for tests. Capped at one connection so every checkout
/// sees the same database.
pub fn new_in_memory(config: &ConnectionConfig) -> Result<ConnectionPool> {
    let manager = SqliteConnectionManager::memory().with_init(init_pragmas);
    let pool = r2d2::Pool::builder()
        .max_size(1)
        .connection_timeout(config.connection_timeout)
        .build(manager)?;
    Ok(pool)
}
