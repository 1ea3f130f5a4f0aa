//! Room membership directory for the relay server.
//!
//! Maintains the in-memory mapping from room id to the set of currently
//! connected members. Rooms are created lazily on first join and removed
//! exactly when their last member leaves, so a room id present in the map
//! always has a non-empty member set.
//!
//! Membership is ephemeral — lost on relay restart, same as connections.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use crate::relay::ConnId;

/// In-memory directory of rooms and their members.
///
/// Thread-safe via [`RwLock`]. Each operation takes the lock once for its
/// whole read-modify-write, so membership mutations are atomic with
/// respect to each other even under multi-threaded dispatch.
pub struct RoomDirectory {
    rooms: RwLock<HashMap<String, HashSet<ConnId>>>,
}

impl Default for RoomDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomDirectory {
    /// Creates a new, empty room directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Adds a connection to a room, creating the room if needed.
    ///
    /// Inserting an existing member is a no-op (set semantics). Returns
    /// the member count after the insert.
    pub async fn join(&self, room_id: &str, conn: ConnId) -> usize {
        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(room_id.to_string()).or_default();
        members.insert(conn);
        members.len()
    }

    /// Removes a connection from a room.
    ///
    /// If the member set becomes empty the room entry is deleted. Returns
    /// the remaining member count, or `None` if the room did not exist.
    pub async fn leave(&self, room_id: &str, conn: ConnId) -> Option<usize> {
        let mut rooms = self.rooms.write().await;
        let members = rooms.get_mut(room_id)?;
        members.remove(&conn);
        let remaining = members.len();
        if remaining == 0 {
            rooms.remove(room_id);
        }
        Some(remaining)
    }

    /// Returns a snapshot of a room's members, empty if the room does not
    /// exist.
    pub async fn members(&self, room_id: &str) -> Vec<ConnId> {
        let rooms = self.rooms.read().await;
        rooms
            .get(room_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns the current member count for a room (0 if absent).
    pub async fn count(&self, room_id: &str) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(room_id).map_or(0, HashSet::len)
    }

    /// Returns whether the room currently exists in the directory.
    pub async fn contains(&self, room_id: &str) -> bool {
        let rooms = self.rooms.read().await;
        rooms.contains_key(room_id)
    }
}
