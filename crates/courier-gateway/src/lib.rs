//! Shared library modules for the `courier-gateway` binary and its tests.
//!
//! The binary (`main.rs`) wires all crates together and starts the HTTP
//! server; this `lib.rs` exposes the bridge transport adapter so
//! integration tests can exercise it without the daemon.

#![deny(unsafe_code)]

pub mod bridge;
