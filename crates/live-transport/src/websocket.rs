//! WebSocket connector using tokio-tungstenite.

use futures_util::{SinkExt, StreamExt, future, stream};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

use crate::connector::{Connection, ConnectFuture, Connector};
use crate::error::TransportError;

/// Opens `ws://` / `wss://` connections.
///
/// Protocol-level pings are answered by tungstenite itself; only text and
/// binary frames reach the manager. Binary frames must be valid UTF-8 and
/// are then treated like text; anything else is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self, url: &Url) -> ConnectFuture {
        let url = url.to_string();
        Box::pin(async move {
            let (ws, _response) = connect_async(url.as_str()).await?;
            debug!("WebSocket open: {}", redact(&url));

            let (write, read) = ws.split();

            let sink = write
                .sink_map_err(TransportError::from)
                .with(|text: String| future::ready(Ok::<_, TransportError>(Message::Text(text.into()))));

            let stream = stream::unfold(read, |mut read| async move {
                loop {
                    match read.next().await {
                        Some(Ok(Message::Text(text))) => return Some((Ok(text.as_str().to_owned()), read)),
                        Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                            Ok(text) => return Some((Ok(text), read)),
                            Err(e) => {
                                warn!("Dropping binary frame that is not UTF-8: {e}");
                                continue;
                            }
                        },
                        Some(Ok(Message::Close(frame))) => {
                            debug!("WebSocket close frame: {frame:?}");
                            return None;
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Some((Err(TransportError::from(e)), read)),
                        None => return None,
                    }
                }
            });

            Ok(Connection::new(Box::pin(sink), Box::pin(stream)))
        })
    }
}

/// Strip the query string so credentials never reach the logs.
pub(crate) fn redact(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}
