//! Live update channel - development hub.
//!
//! A small server speaking the channel protocol, for local runs and tests:
//! - Token check on upgrade (close code 1008 on rejection)
//! - `connected` acknowledgement on accept
//! - Per-client task subscriptions with `subscribed` / `unsubscribed` replies
//! - `ping` → `pong`, anything else → `error`
//! - Server-side pushes: task updates to subscribers, notifications to all

pub mod client;
pub mod error;
pub mod server;

pub use client::{ClientConnection, Outbound};
pub use error::HubError;
pub use server::{Hub, HubConfig};
