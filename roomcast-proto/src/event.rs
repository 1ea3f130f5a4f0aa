//! Wire events exchanged between chat clients and the relay server.
//!
//! Defines the [`ClientEvent`] and [`ServerEvent`] enums that are
//! postcard-encoded and carried in WebSocket binary frames. The relay
//! never validates event fields — identity and text fields are optional
//! and forwarded to recipients exactly as received.

use serde::{Deserialize, Serialize};

use crate::message::ChatMessage;
use crate::presence::RoomStatus;

/// Events sent by a client to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientEvent {
    /// Join a named room.
    ///
    /// Subscribes the connection to the room's broadcasts and records the
    /// display name on the connection. Joining a different room leaves the
    /// previous one first; re-joining the same room is idempotent.
    JoinRoom {
        /// Room to join.
        room_id: Option<String>,
        /// Display name to record on the connection.
        username: Option<String>,
    },

    /// Send a chat message to a room.
    ///
    /// `room_id` is used only for routing and need not match the room the
    /// connection joined. The message is relayed once to every other
    /// member and discarded.
    SendMessage {
        /// Room to route the message to.
        room_id: Option<String>,
        /// The message payload, forwarded verbatim.
        message: ChatMessage,
    },

    /// Signal that the sender started or stopped typing.
    Typing {
        /// Room to route the indicator to.
        room_id: Option<String>,
        /// Display name of the typist.
        username: Option<String>,
        /// Whether the sender is currently typing.
        is_typing: bool,
    },
}

/// Events sent by the relay to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerEvent {
    /// Another member joined the room. Never sent to the joiner itself.
    UserJoined {
        /// Display name the joiner supplied.
        username: Option<String>,
    },

    /// Presence update for the room, sent to every member including the
    /// one whose join or departure triggered it.
    RoomStatus(RoomStatus),

    /// A chat message from another member. Never sent to the sender.
    ReceiveMessage(ChatMessage),

    /// Typing indicator from another member. Never sent to the sender.
    UserTyping {
        /// Display name of the typist.
        username: Option<String>,
        /// Whether the typist is currently typing.
        is_typing: bool,
    },
}
