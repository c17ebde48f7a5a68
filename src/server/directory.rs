//! Room existence lookups
//!
//! The server only needs to know whether a room exists before it lets a
//! connection subscribe. Storage that knows the rooms implements
//! [`RoomDirectory`].

use std::collections::HashSet;
use std::future::Future;

use parking_lot::RwLock;

use crate::registry::RoomId;

/// Answers whether a room may be subscribed to
pub trait RoomDirectory: Send + Sync + 'static {
    /// Check if `room` exists
    fn room_exists(&self, room: &RoomId) -> impl Future<Output = bool> + Send;
}

/// Accepts every room id
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyRoom;

impl RoomDirectory for AnyRoom {
    async fn room_exists(&self, _room: &RoomId) -> bool {
        true
    }
}

/// In-memory set of rooms
#[derive(Debug, Default)]
pub struct KnownRooms {
    rooms: RwLock<HashSet<RoomId>>,
}

impl KnownRooms {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the room was already known
    pub fn insert(&self, room: impl Into<RoomId>) -> bool {
        self.rooms.write().insert(room.into())
    }

    /// Returns false if the room was not known
    pub fn remove(&self, room: &RoomId) -> bool {
        self.rooms.write().remove(room)
    }

    /// Check if the room is known
    pub fn contains(&self, room: &RoomId) -> bool {
        self.rooms.read().contains(room)
    }

    /// Number of known rooms
    pub fn len(&self) -> usize {
        self.rooms.read().len()
    }

    /// Check if no room is known
    pub fn is_empty(&self) -> bool {
        self.rooms.read().is_empty()
    }
}

impl<I: Into<RoomId>> FromIterator<I> for KnownRooms {
    fn from_iter<T: IntoIterator<Item = I>>(iter: T) -> Self {
        Self {
            rooms: RwLock::new(iter.into_iter().map(Into::into).collect()),
        }
    }
}

impl RoomDirectory for KnownRooms {
    async fn room_exists(&self, room: &RoomId) -> bool {
        self.contains(room)
    }
}

impl<D: RoomDirectory> RoomDirectory for std::sync::Arc<D> {
    fn room_exists(&self, room: &RoomId) -> impl Future<Output = bool> + Send {
        (**self).room_exists(room)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_any_room() {
        assert!(AnyRoom.room_exists(&RoomId::from("whatever")).await);
    }

    #[tokio::test]
    async fn test_known_rooms() {
        let rooms: KnownRooms = ["r1", "r2"].into_iter().collect();
        assert_eq!(rooms.len(), 2);
        assert!(rooms.room_exists(&RoomId::from("r1")).await);
        assert!(!rooms.room_exists(&RoomId::from("r3")).await);

        assert!(rooms.insert("r3"));
        assert!(!rooms.insert("r3"));
        assert!(rooms.room_exists(&RoomId::from("r3")).await);

        assert!(rooms.remove(&RoomId::from("r1")));
        assert!(!rooms.room_exists(&RoomId::from("r1")).await);
    }

    #[tokio::test]
    async fn test_shared_directory() {
        let rooms = Arc::new(KnownRooms::new());
        let shared = Arc::clone(&rooms);
        rooms.insert("late");

        assert!(shared.room_exists(&RoomId::from("late")).await);
    }
}
