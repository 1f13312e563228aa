//! In-process transport.
//!
//! [`MemoryConnector`] opens connections to a [`MemoryServer`] living in the
//! same process. Each successful connect hands the server a [`MemoryPeer`]
//! holding the server side of the connection. Dropping the peer closes the
//! connection as seen by the client.

use std::sync::Arc;

use futures_util::{sink, stream};
use live_protocol::auth::TOKEN_QUERY_PARAM;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

use crate::connector::{Connection, ConnectFuture, Connector};
use crate::error::TransportError;

struct Shared {
    accepting: bool,
    refuse_remaining: usize,
    attempts: Vec<Url>,
}

/// Client side of the in-process transport.
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Arc<Mutex<Shared>>,
    peer_tx: mpsc::UnboundedSender<MemoryPeer>,
}

/// Server side: accepts peers and controls whether connects succeed.
pub struct MemoryServer {
    shared: Arc<Mutex<Shared>>,
    peer_rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryConnector {
    /// Create a connected connector/server pair. The server accepts by default.
    pub fn pair() -> (MemoryConnector, MemoryServer) {
        let shared = Arc::new(Mutex::new(Shared {
            accepting: true,
            refuse_remaining: 0,
            attempts: Vec::new(),
        }));
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        (
            MemoryConnector {
                shared: shared.clone(),
                peer_tx,
            },
            MemoryServer { shared, peer_rx },
        )
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, url: &Url) -> ConnectFuture {
        let refused = {
            let mut shared = self.shared.lock();
            shared.attempts.push(url.clone());
            if shared.refuse_remaining > 0 {
                shared.refuse_remaining -= 1;
                true
            } else {
                !shared.accepting
            }
        };

        if refused {
            return Box::pin(async { Err(TransportError::Refused("memory server refused".into())) });
        }

        let (to_client, from_server) = mpsc::unbounded_channel::<String>();
        let (to_server, from_client) = mpsc::unbounded_channel::<String>();
        let peer = MemoryPeer {
            url: url.clone(),
            outbound: to_client,
            inbound: from_client,
        };
        let delivered = self.peer_tx.send(peer).is_ok();

        Box::pin(async move {
            if !delivered {
                return Err(TransportError::Refused("memory server is gone".into()));
            }

            let sink = sink::unfold(to_server, |tx: mpsc::UnboundedSender<String>, frame: String| async move {
                tx.send(frame).map_err(|_| TransportError::Closed)?;
                Ok::<_, TransportError>(tx)
            });
            let stream = stream::unfold(from_server, |mut rx| async move {
                let frame = rx.recv().await?;
                Some((Ok::<_, TransportError>(frame), rx))
            });

            Ok(Connection::new(Box::pin(sink), Box::pin(stream)))
        })
    }
}

impl MemoryServer {
    /// Accept (`true`) or refuse (`false`) every following connect.
    pub fn set_accepting(&self, accepting: bool) {
        self.shared.lock().accepting = accepting;
    }

    /// Refuse the next `count` connects, then fall back to `set_accepting`.
    pub fn refuse_next(&self, count: usize) {
        self.shared.lock().refuse_remaining = count;
    }

    /// Number of connects attempted so far, refused ones included.
    pub fn attempts(&self) -> usize {
        self.shared.lock().attempts.len()
    }

    pub fn attempted_urls(&self) -> Vec<Url> {
        self.shared.lock().attempts.clone()
    }

    /// Wait for the next accepted connection.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        let peer = self.peer_rx.recv().await;
        if let Some(ref peer) = peer {
            debug!("Memory peer accepted on {}", peer.url.path());
        }
        peer
    }

    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.peer_rx.try_recv().ok()
    }
}

/// Server side of one in-process connection.
pub struct MemoryPeer {
    url: Url,
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The credential the client connected with.
    pub fn token(&self) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == TOKEN_QUERY_PARAM)
            .map(|(_, value)| value.into_owned())
    }

    /// Push a frame to the client. Returns `false` once the client is gone.
    pub fn push(&self, frame: impl Into<String>) -> bool {
        self.outbound.send(frame.into()).is_ok()
    }

    /// Next frame written by the client; `None` once the client closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.inbound.try_recv().ok()
    }

    /// Close the connection from the server side.
    pub fn close(self) {
        drop(self);
    }
}
