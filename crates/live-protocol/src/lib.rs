//! Live update channel - protocol types.
//!
//! Every frame on the channel is a JSON text frame of the form
//! `{"type": <tag>, "data": <payload>}`. This crate is the single source of
//! truth for the envelope, the message kinds, the typed payloads carried by
//! each kind, and the errors raised while decoding them.

pub mod auth;
pub mod envelope;
pub mod error;
pub mod kinds;
pub mod messages;
pub mod payloads;

pub use envelope::Envelope;
pub use error::ProtocolError;
pub use kinds::{MessageKind, MessageTypes};
pub use messages::{ClientMessage, ServerMessage};
pub use payloads::{
    ConnectedAck, Notification, NotificationLevel, ServerError, TaskId, TaskSubscription,
    TaskUpdate,
};
