//! Subscriber registry implementation
//!
//! The central registry that tracks which connections are watching which room.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::entry::SubscriberSet;
use super::room::RoomId;
use crate::session::{ConnectionHandle, ConnectionId};
use crate::stats::RegistryStats;

#[derive(Debug, Default)]
struct Rooms {
    /// Map of room to its live subscribers
    rooms: HashMap<RoomId, SubscriberSet>,

    /// Reverse index enforcing one room per connection
    index: HashMap<ConnectionId, RoomId>,
}

impl Rooms {
    /// Remove `id` from `room`, dropping the room key once it is empty.
    /// Returns the removed handle and the remaining subscriber count.
    fn detach(&mut self, room: &RoomId, id: ConnectionId) -> Option<(ConnectionHandle, usize)> {
        if self.index.get(&id) != Some(room) {
            return None;
        }
        self.index.remove(&id);

        let set = self.rooms.get_mut(room)?;
        let handle = set.remove(id)?;
        let remaining = set.len();
        if remaining == 0 {
            self.rooms.remove(room);
        }
        Some((handle, remaining))
    }
}

/// Process-wide registry of room subscribers
///
/// All operations take the same `parking_lot::Mutex`. Critical sections only
/// touch the maps; callers get owned copies of the handles and perform any
/// I/O after the guard is dropped.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    inner: Mutex<Rooms>,
}

impl SubscriberRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room
    ///
    /// Creates the room's set if absent. A connection already watching another
    /// room is moved, so it is never a member of two rooms.
    pub fn subscribe(&self, room: &RoomId, handle: ConnectionHandle) {
        let id = handle.id();

        let (created, moved_from, subscribers) = {
            let mut inner = self.inner.lock();

            let moved_from = match inner.index.get(&id).cloned() {
                Some(previous) if &previous != room => {
                    inner.detach(&previous, id);
                    Some(previous)
                }
                _ => None,
            };

            let created = !inner.rooms.contains_key(room);
            let set = inner.rooms.entry(room.clone()).or_default();
            set.insert(handle);
            let subscribers = set.len();
            inner.index.insert(id, room.clone());

            (created, moved_from, subscribers)
        };

        if let Some(previous) = moved_from {
            tracing::debug!(
                connection_id = %id,
                from = %previous,
                to = %room,
                "Subscriber moved between rooms"
            );
        }
        if created {
            tracing::info!(room = %room, "Room subscriber set created");
        }
        tracing::info!(
            room = %room,
            connection_id = %id,
            subscribers = subscribers,
            "Subscriber added"
        );
    }

    /// Remove a connection from a room
    ///
    /// Returns `false` when the connection was not subscribed to `room`, which
    /// keeps teardown idempotent.
    pub fn unsubscribe(&self, room: &RoomId, id: ConnectionId) -> bool {
        let removed = self.inner.lock().detach(room, id);

        match removed {
            Some((_, remaining)) => {
                tracing::info!(
                    room = %room,
                    connection_id = %id,
                    subscribers = remaining,
                    "Subscriber removed"
                );
                if remaining == 0 {
                    tracing::info!(room = %room, "Room subscriber set removed");
                }
                true
            }
            None => false,
        }
    }

    /// Remove several connections from a room under one lock acquisition
    ///
    /// Returns how many were actually removed.
    pub fn remove_many(&self, room: &RoomId, ids: &[ConnectionId]) -> usize {
        let (removed, remaining) = {
            let mut inner = self.inner.lock();
            let removed = ids
                .iter()
                .filter(|id| inner.detach(room, **id).is_some())
                .count();
            let remaining = inner.rooms.get(room).map_or(0, SubscriberSet::len);
            (removed, remaining)
        };

        if removed > 0 {
            tracing::info!(
                room = %room,
                removed = removed,
                subscribers = remaining,
                "Subscribers pruned"
            );
        }
        removed
    }

    /// Copy of the current subscribers of a room
    ///
    /// Taken under the mutation lock; the returned handles can be written to
    /// after the lock is released.
    pub fn snapshot(&self, room: &RoomId) -> Vec<ConnectionHandle> {
        self.inner
            .lock()
            .rooms
            .get(room)
            .map(SubscriberSet::handles)
            .unwrap_or_default()
    }

    /// Number of subscribers watching a room
    pub fn subscriber_count(&self, room: &RoomId) -> usize {
        self.inner.lock().rooms.get(room).map_or(0, SubscriberSet::len)
    }

    /// Check whether a room currently has any subscriber
    pub fn contains_room(&self, room: &RoomId) -> bool {
        self.inner.lock().rooms.contains_key(room)
    }

    /// Check whether a connection is subscribed to a room
    pub fn is_subscribed(&self, room: &RoomId, id: ConnectionId) -> bool {
        self.inner
            .lock()
            .rooms
            .get(room)
            .is_some_and(|set| set.contains(id))
    }

    /// Number of rooms with at least one subscriber
    pub fn room_count(&self) -> usize {
        self.inner.lock().rooms.len()
    }

    /// Total number of subscribed connections
    pub fn total_subscribers(&self) -> usize {
        self.inner.lock().index.len()
    }

    /// Registry statistics
    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.lock();
        RegistryStats {
            rooms: inner.rooms.len(),
            subscribers: inner.index.len(),
        }
    }
}
