//! # courier-relay
//!
//! The concurrent core of the Courier gateway:
//!
//! - [`transport`] — the abstract `TransportClient`/`TransportFactory`
//!   seam; one client and one ordered event stream per session
//! - [`registry`] — `AccountRegistry`: concurrency-safe map of live
//!   sessions, the lifecycle state machine, and the per-account event
//!   consumer task
//! - [`queue`] — `OutboundQueue`: per-account bounded admission gate in
//!   front of the transport's send call
//! - [`dispatcher`] — `WebhookDispatcher`: parallel fan-out with
//!   per-target payload shaping and timeout tiering
//! - [`webhook_cache`] — `WebhookCache`: time-bounded secret validation
//!   and active-webhook read-through caches with eager invalidation
//! - [`batcher`] — `LogBatcher`: bounded in-memory buffer flushing
//!   delivery records to the store on size or time triggers
//!
//! Nothing here owns an HTTP surface; `courier-server` mounts the routes
//! and `courier-gateway` wires the pieces together.

#![deny(unsafe_code)]

pub mod batcher;
pub mod dispatcher;
pub mod errors;
pub mod queue;
pub mod registry;
pub mod testing;
pub mod transport;
pub mod webhook_cache;

pub use batcher::LogBatcher;
pub use dispatcher::{DispatchPolicy, DispatchSummary, TargetClass, WebhookDispatcher};
pub use errors::GatewayError;
pub use queue::OutboundQueue;
pub use registry::{AccountEntry, AccountRegistry, SessionView};
pub use transport::{OutboundPayload, TransportClient, TransportError, TransportFactory};
pub use webhook_cache::WebhookCache;
