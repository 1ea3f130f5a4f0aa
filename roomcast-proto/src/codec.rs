//! Serialization and deserialization for the Roomcast wire protocol.
//!
//! Events are postcard-encoded and carried in WebSocket binary frames, so
//! no additional framing is needed: the transport preserves message
//! boundaries. Decode failures are recoverable — the relay logs and drops
//! the offending frame.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Encodes an event into a byte vector using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the value cannot be serialized.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(value).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes an event from a byte slice using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the bytes cannot be
/// deserialized into `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}
