//! Live update channel - transport layer.
//!
//! Provides the connectors the connection manager opens transports with.
//! The transport layer handles:
//! - Opening a connection to an endpoint URL (the credential is already in it)
//! - Carrying text frames in both directions
//! - Reporting close and failure as the end of the frame stream
//!
//! The manager is decoupled from any concrete socket via the [`Connector`]
//! trait; [`WebSocketConnector`] is the production implementation and
//! [`MemoryConnector`] wires a manager to an in-process peer.

pub mod connector;
pub mod endpoint;
pub mod error;
pub mod memory;
pub mod websocket;

pub use connector::{Connection, ConnectFuture, Connector, FrameSink, FrameStream};
pub use endpoint::{channel_url, endpoint_from_api_url};
pub use error::TransportError;
pub use memory::{MemoryConnector, MemoryPeer, MemoryServer};
pub use websocket::WebSocketConnector;
