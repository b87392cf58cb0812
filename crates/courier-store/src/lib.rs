//! # courier-store
//!
//! SQLite persistence for the Courier gateway: accounts, webhook
//! subscriptions, and the append-only delivery log.
//!
//! Layout mirrors the repository/facade split used across the workspace:
//!
//! - [`connection`] — r2d2 pool construction and pragmas
//! - [`migrations`] — versioned schema, applied via `PRAGMA user_version`
//! - [`repositories`] — stateless per-table query modules
//! - [`store::Store`] — the facade the rest of the system talks to;
//!   serializes writes in-process and retries on `SQLITE_BUSY`
//!
//! Batch inserts into `delivery_logs` tolerate schema drift: when the
//! database predates a column, the insert is retried with that column
//! stripped rather than failing the whole batch.

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod repositories;
pub mod store;

pub use connection::{ConnectionConfig, ConnectionPool, PooledConnection, new_in_memory, open_pool};
pub use errors::{Result, StoreError};
pub use store::Store;
