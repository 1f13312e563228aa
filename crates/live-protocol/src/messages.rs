//! Typed views over [`Envelope`]s, one enum per direction.

use serde_json::Value;

use crate::envelope::Envelope;
use crate::error::ProtocolError;
use crate::kinds::MessageKind;
use crate::payloads::{ConnectedAck, Notification, ServerError, TaskId, TaskSubscription, TaskUpdate};

/// A message pushed by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Connected(ConnectedAck),
    TaskUpdate(TaskUpdate),
    Notification(Notification),
    Pong,
    Error(ServerError),
    Subscribed(TaskSubscription),
    Unsubscribed(TaskSubscription),
    /// Any kind a client does not expect from a server, kept as-is.
    Unknown(Envelope),
}

impl ServerMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Connected(_) => MessageKind::Connected,
            Self::TaskUpdate(_) => MessageKind::TaskUpdate,
            Self::Notification(_) => MessageKind::Notification,
            Self::Pong => MessageKind::Pong,
            Self::Error(_) => MessageKind::Error,
            Self::Subscribed(_) => MessageKind::Subscribed,
            Self::Unsubscribed(_) => MessageKind::Unsubscribed,
            Self::Unknown(envelope) => envelope.kind.clone(),
        }
    }

    pub fn into_envelope(self) -> Result<Envelope, ProtocolError> {
        match self {
            Self::Connected(ack) => Envelope::from_payload(MessageKind::Connected, &ack),
            Self::TaskUpdate(update) => Envelope::from_payload(MessageKind::TaskUpdate, &update),
            Self::Notification(n) => Envelope::from_payload(MessageKind::Notification, &n),
            Self::Pong => Ok(Envelope::new(MessageKind::Pong, Value::Null)),
            Self::Error(err) => Envelope::from_payload(MessageKind::Error, &err),
            Self::Subscribed(sub) => Envelope::from_payload(MessageKind::Subscribed, &sub),
            Self::Unsubscribed(sub) => Envelope::from_payload(MessageKind::Unsubscribed, &sub),
            Self::Unknown(envelope) => Ok(envelope),
        }
    }

    pub fn encode(self) -> Result<String, ProtocolError> {
        self.into_envelope()?.encode()
    }
}

impl TryFrom<Envelope> for ServerMessage {
    type Error = ProtocolError;

    fn try_from(envelope: Envelope) -> Result<Self, ProtocolError> {
        Ok(match envelope.kind {
            MessageKind::Connected => {
                // The ack carries no required fields; tolerate a null payload.
                if envelope.data.is_null() {
                    Self::Connected(ConnectedAck::default())
                } else {
                    Self::Connected(envelope.payload()?)
                }
            }
            MessageKind::TaskUpdate => Self::TaskUpdate(envelope.payload()?),
            MessageKind::Notification => Self::Notification(envelope.payload()?),
            MessageKind::Pong => Self::Pong,
            MessageKind::Error => {
                // `Self::Error` would name the associated type here.
                if envelope.data.is_null() {
                    ServerMessage::Error(ServerError::default())
                } else {
                    ServerMessage::Error(envelope.payload()?)
                }
            }
            MessageKind::Subscribed => Self::Subscribed(envelope.payload()?),
            MessageKind::Unsubscribed => Self::Unsubscribed(envelope.payload()?),
            _ => Self::Unknown(envelope),
        })
    }
}

/// A message sent by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessage {
    SubscribeTask(TaskId),
    UnsubscribeTask(TaskId),
    Ping,
}

impl ClientMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::SubscribeTask(_) => MessageKind::SubscribeTask,
            Self::UnsubscribeTask(_) => MessageKind::UnsubscribeTask,
            Self::Ping => MessageKind::Ping,
        }
    }

    pub fn into_envelope(self) -> Result<Envelope, ProtocolError> {
        match self {
            Self::SubscribeTask(task_id) => {
                Envelope::from_payload(MessageKind::SubscribeTask, &TaskSubscription { task_id })
            }
            Self::UnsubscribeTask(task_id) => {
                Envelope::from_payload(MessageKind::UnsubscribeTask, &TaskSubscription { task_id })
            }
            Self::Ping => Ok(Envelope::new(MessageKind::Ping, Value::Null)),
        }
    }
}

impl TryFrom<Envelope> for ClientMessage {
    type Error = ProtocolError;

    /// Fails with [`ProtocolError::UnexpectedKind`] for kinds a client never
    /// sends, so a server can answer them with an `error` frame.
    fn try_from(envelope: Envelope) -> Result<Self, ProtocolError> {
        match envelope.kind {
            MessageKind::SubscribeTask => {
                let sub: TaskSubscription = envelope.payload()?;
                Ok(Self::SubscribeTask(sub.task_id))
            }
            MessageKind::UnsubscribeTask => {
                let sub: TaskSubscription = envelope.payload()?;
                Ok(Self::UnsubscribeTask(sub.task_id))
            }
            MessageKind::Ping => Ok(Self::Ping),
            other => Err(ProtocolError::UnexpectedKind(other.to_string())),
        }
    }
}
