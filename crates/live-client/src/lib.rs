//! Live update channel - connection manager.
//!
//! [`ConnectionManager`] owns one authenticated connection to the channel
//! endpoint and:
//! - dispatches every inbound frame to the listeners registered for its kind
//! - sends `{type, data}` frames while the connection is open
//! - reconnects after transport loss, up to a bounded number of attempts
//! - keeps the connection alive with a periodic `ping`
//!
//! All connection state lives in one background task; the public handle
//! never blocks and never returns errors.

pub mod config;
pub mod listeners;
pub mod manager;
pub mod state;

pub use config::{Backoff, ManagerConfig};
pub use listeners::{Handler, ListenerRegistry};
pub use manager::ConnectionManager;
pub use state::ConnectionState;
