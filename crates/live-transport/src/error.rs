//! Transport failures.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint string is not a usable URL.
    #[error("invalid endpoint `{endpoint}`: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    /// The endpoint does not use a WebSocket scheme.
    #[error("unsupported endpoint scheme `{0}` (expected ws or wss)")]
    UnsupportedScheme(String),

    /// The peer refused the connection or could not be reached.
    #[error("connection refused: {0}")]
    Refused(String),

    /// The transport is no longer open.
    #[error("transport closed")]
    Closed,

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
