//! The `{type, data}` frame envelope.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::kinds::MessageKind;

/// One frame on the channel: a type tag plus an opaque JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<MessageKind>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Build an envelope from any serializable payload.
    pub fn from_payload<T: Serialize + ?Sized>(
        kind: impl Into<MessageKind>,
        payload: &T,
    ) -> Result<Self, ProtocolError> {
        let kind = kind.into();
        let data = serde_json::to_value(payload)
            .map_err(|e| ProtocolError::serialize(kind.as_str(), e))?;
        Ok(Self { kind, data })
    }

    /// Decode a text frame.
    ///
    /// Servers in the wild do not always nest the payload under `data`:
    /// - no `data` field: every top-level field except `type` becomes the
    ///   payload (`null` when there are none);
    /// - `data` is an object and sibling fields exist: siblings are folded
    ///   into it without overwriting keys already present in `data`.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;
        let Value::Object(mut fields) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        let kind = match fields.remove("type") {
            Some(Value::String(tag)) => MessageKind::from(tag),
            _ => return Err(ProtocolError::MissingType),
        };

        let data = match fields.remove("data") {
            Some(Value::Object(mut data)) => {
                for (key, value) in fields {
                    data.entry(key).or_insert(value);
                }
                Value::Object(data)
            }
            Some(data) => data,
            None if fields.is_empty() => Value::Null,
            None => Value::Object(fields),
        };

        Ok(Self { kind, data })
    }

    /// Encode as a text frame with exactly two fields, `type` and `data`.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::serialize(self.kind.as_str(), e))
    }

    /// Decode `data` into a typed payload.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        T::deserialize(&self.data).map_err(|e| ProtocolError::invalid_payload(self.kind.as_str(), e))
    }
}
