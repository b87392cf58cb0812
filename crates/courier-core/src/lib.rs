//! # courier-core
//!
//! Foundation types for the Courier messaging gateway.
//!
//! This crate provides the shared vocabulary that all other courier crates
//! depend on:
//!
//! - **Branded IDs**: [`ids::AccountId`], [`ids::WebhookId`] as newtypes
//! - **Accounts**: [`account::Account`] and the [`account::AccountStatus`]
//!   session state machine
//! - **Webhooks**: [`webhook::Webhook`] and [`webhook::DeliveryRecord`]
//! - **Transport events**: [`events::SessionEvent`] emitted by a session's
//!   transport client, [`events::InboundMessage`] for received messages
//! - **Normalization**: [`normalize::PhoneNumberNormalizer`] mapping raw
//!   destination numbers to canonical routing addresses
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other courier crates.

#![deny(unsafe_code)]

pub mod account;
pub mod events;
pub mod ids;
pub mod normalize;
pub mod webhook;
