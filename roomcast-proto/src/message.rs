//! Chat message record relayed between room members.

use serde::{Deserialize, Serialize};

/// An ephemeral chat message.
///
/// Every field is client-supplied and opaque to the relay: `id` is whatever
/// identifier the sending client chose, `timestamp` is conventionally UTC
/// milliseconds but never checked, and none of the fields are validated or
/// required. The relay forwards the record verbatim and discards it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Client-chosen message identifier.
    pub id: Option<String>,
    /// Display name of the sender (not unique, not validated).
    pub username: Option<String>,
    /// Message body.
    pub text: Option<String>,
    /// Client-supplied send time in UTC milliseconds.
    pub timestamp: Option<u64>,
}
