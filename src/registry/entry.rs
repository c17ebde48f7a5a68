//! Per-room subscriber set
//!
//! This module defines the per-room state stored in the registry.

use std::collections::HashMap;

use crate::session::{ConnectionHandle, ConnectionId};

/// The live connections watching a single room
///
/// Each handle carries its own cancellation signal, so the set doubles as the
/// room's map from connection to cancel trigger.
#[derive(Debug, Default)]
pub struct SubscriberSet {
    members: HashMap<ConnectionId, ConnectionHandle>,
}

impl SubscriberSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handle, returning the one it replaced if the id was already present
    pub fn insert(&mut self, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.members.insert(handle.id(), handle)
    }

    /// Remove a handle by connection id
    pub fn remove(&mut self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.members.remove(&id)
    }

    /// Check whether a connection is in the set
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.members.contains_key(&id)
    }

    /// Number of subscribers
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if the set has no subscribers
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Copy the handles out so they can be written to without the lock
    pub fn handles(&self) -> Vec<ConnectionHandle> {
        self.members.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_same_id() {
        let mut set = SubscriberSet::new();
        let (first, _rx1) = ConnectionHandle::new(ConnectionId::new(7), None, 4);
        let (second, _rx2) = ConnectionHandle::new(ConnectionId::new(7), None, 4);

        assert!(set.insert(first).is_none());
        assert!(set.insert(second).is_some());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_remove_missing_is_none() {
        let mut set = SubscriberSet::new();
        assert!(set.remove(ConnectionId::new(1)).is_none());
        assert!(set.is_empty());
    }
}
