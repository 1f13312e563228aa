//! Message type tags.
//!
//! The `type` field of every frame names what the frame carries. Known tags
//! map onto [`MessageKind`] variants; anything else is preserved verbatim in
//! [`MessageKind::Other`] so newer servers can introduce tags without
//! breaking older clients.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// All message type tags, grouped by direction.
pub struct MessageTypes;

impl MessageTypes {
    // ── Server → client ─────────────────────────────────────────────────
    pub const CONNECTED: &str = "connected";
    pub const TASK_UPDATE: &str = "task_update";
    pub const NOTIFICATION: &str = "notification";
    pub const PONG: &str = "pong";
    pub const ERROR: &str = "error";
    pub const SUBSCRIBED: &str = "subscribed";
    pub const UNSUBSCRIBED: &str = "unsubscribed";

    // ── Client → server ─────────────────────────────────────────────────
    pub const SUBSCRIBE_TASK: &str = "subscribe_task";
    pub const UNSUBSCRIBE_TASK: &str = "unsubscribe_task";
    pub const PING: &str = "ping";
}

/// A message type tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Connected,
    TaskUpdate,
    Notification,
    Pong,
    Error,
    Subscribed,
    Unsubscribed,
    SubscribeTask,
    UnsubscribeTask,
    Ping,
    /// A tag this version does not know about.
    Other(String),
}

impl MessageKind {
    pub fn parse(tag: &str) -> Self {
        match tag {
            MessageTypes::CONNECTED => Self::Connected,
            MessageTypes::TASK_UPDATE => Self::TaskUpdate,
            MessageTypes::NOTIFICATION => Self::Notification,
            MessageTypes::PONG => Self::Pong,
            MessageTypes::ERROR => Self::Error,
            MessageTypes::SUBSCRIBED => Self::Subscribed,
            MessageTypes::UNSUBSCRIBED => Self::Unsubscribed,
            MessageTypes::SUBSCRIBE_TASK => Self::SubscribeTask,
            MessageTypes::UNSUBSCRIBE_TASK => Self::UnsubscribeTask,
            MessageTypes::PING => Self::Ping,
            other => Self::Other(other.to_string()),
        }
    }

    /// The tag exactly as it appears on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Connected => MessageTypes::CONNECTED,
            Self::TaskUpdate => MessageTypes::TASK_UPDATE,
            Self::Notification => MessageTypes::NOTIFICATION,
            Self::Pong => MessageTypes::PONG,
            Self::Error => MessageTypes::ERROR,
            Self::Subscribed => MessageTypes::SUBSCRIBED,
            Self::Unsubscribed => MessageTypes::UNSUBSCRIBED,
            Self::SubscribeTask => MessageTypes::SUBSCRIBE_TASK,
            Self::UnsubscribeTask => MessageTypes::UNSUBSCRIBE_TASK,
            Self::Ping => MessageTypes::PING,
            Self::Other(tag) => tag,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<&str> for MessageKind {
    fn from(tag: &str) -> Self {
        Self::parse(tag)
    }
}

impl From<String> for MessageKind {
    fn from(tag: String) -> Self {
        match Self::parse(&tag) {
            Self::Other(_) => Self::Other(tag),
            known => known,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MessageKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from(tag))
    }
}
