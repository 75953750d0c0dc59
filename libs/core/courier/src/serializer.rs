//! Payload codec contract and the default JSON codec.

use crate::error::CourierError;
use crate::message::Message;

/// Encodes messages to wire bytes and back.
///
/// A failed decode is a [`CourierError::Serialization`], never a panic;
/// callers leave the offending delivery in place for manual inspection.
pub trait Serializer: Send + Sync {
    /// Encode a message to wire bytes.
    fn serialize(&self, message: &Message) -> Result<Vec<u8>, CourierError>;

    /// Decode wire bytes back into a message.
    fn deserialize(&self, payload: &[u8]) -> Result<Message, CourierError>;
}

/// The default codec: messages as JSON documents.
#[derive(Debug, Clone, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, message: &Message) -> Result<Vec<u8>, CourierError> {
        Ok(serde_json::to_vec(message)?)
    }

    fn deserialize(&self, payload: &[u8]) -> Result<Message, CourierError> {
        Ok(serde_json::from_slice(payload)?)
    }
}
