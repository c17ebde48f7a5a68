//! Room identifiers

use serde::{Deserialize, Serialize};

/// Identifier of a room
///
/// Opaque to the registry. The external API uses the UUID text form, and the
/// upgrade path checks that shape before a connection ever reaches the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Create a new room id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&RoomId> for RoomId {
    fn from(id: &RoomId) -> Self {
        id.clone()
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_as_plain_string() {
        let room = RoomId::new("5b1c7e2a-0c53-4c43-9a3e-6f1f7f3b8d21");
        let json = serde_json::to_string(&room).unwrap();

        assert_eq!(json, r#""5b1c7e2a-0c53-4c43-9a3e-6f1f7f3b8d21""#);
        assert_eq!(serde_json::from_str::<RoomId>(&json).unwrap(), room);
    }

    #[test]
    fn test_display() {
        assert_eq!(RoomId::from("r1").to_string(), "r1");
    }
}
