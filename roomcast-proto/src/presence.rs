//! Room presence status derived from the live member count.

use serde::{Deserialize, Serialize};

/// Coarse online/offline status for a room.
///
/// `online` is a derived value: a room counts as online when more than one
/// member is connected (someone is there to talk to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomStatus {
    /// Whether more than one member is currently in the room.
    pub online: bool,
    /// Live member count at the time of the triggering event.
    pub count: u32,
}

impl RoomStatus {
    /// Builds a status from a member count, deriving `online = count > 1`.
    #[must_use]
    pub const fn from_count(count: u32) -> Self {
        Self {
            online: count > 1,
            count,
        }
    }
}
