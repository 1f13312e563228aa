//! The seam between the connection manager and a concrete transport.

use std::future::Future;
use std::pin::Pin;

use futures_util::{Sink, Stream};
use url::Url;

use crate::error::TransportError;

/// Outbound half of an open transport: accepts text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Inbound half of an open transport: yields text frames.
///
/// The stream ending (or yielding an error) means the transport is gone.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// Future returned by [`Connector::connect`]. Resolving is the "open" event.
pub type ConnectFuture = Pin<Box<dyn Future<Output = Result<Connection, TransportError>> + Send>>;

/// An open transport, split into its two halves.
pub struct Connection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Connection {
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Opens transports to an endpoint.
///
/// The returned future must not borrow the connector: the manager may drop
/// it at any time to abandon the attempt.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &Url) -> ConnectFuture;
}
