//! Protocol errors raised while encoding or decoding frames.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not JSON at all.
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// The frame is JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// The frame has no string `type` field.
    #[error("frame has no string `type` field")]
    MissingType,

    /// The `data` of a frame does not match the payload type of its kind.
    #[error("payload of `{kind}` frame does not match its schema: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    /// A payload could not be turned into JSON.
    #[error("failed to serialize `{kind}` payload: {source}")]
    Serialize {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    /// A well-formed frame of a kind the receiver does not accept.
    #[error("unexpected message type `{0}`")]
    UnexpectedKind(String),

    #[error("credential must not be empty")]
    EmptyCredential,
}

impl ProtocolError {
    pub fn invalid_payload(kind: impl Into<String>, source: serde_json::Error) -> Self {
        Self::InvalidPayload {
            kind: kind.into(),
            source,
        }
    }

    pub fn serialize(kind: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialize {
            kind: kind.into(),
            source,
        }
    }
}
