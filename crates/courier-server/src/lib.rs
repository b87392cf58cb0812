//! # courier-server
//!
//! The HTTP surface of the Courier gateway:
//!
//! - account CRUD, QR retrieval, and the send endpoint under `/api`
//! - webhook subscription CRUD (each mutation invalidates the caches)
//! - the public inbound receiver under `/hooks/{account_id}`
//! - `/health` and Prometheus `/metrics`
//!
//! Handlers stay thin: admission, state, and fan-out semantics live in
//! `courier-relay`; this crate only maps them onto HTTP.

#![deny(unsafe_code)]

pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
