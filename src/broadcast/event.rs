//! Broadcast events
//!
//! Wire shape, stable with clients:
//!
//! ```text
//! { "kind": "message_created", "room_id": "<room>", "value": { ... } }
//! ```
//!
//! `value` is whatever the REST layer answered for the mutation that produced
//! the event, so clients can apply it without a refetch.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::registry::RoomId;

/// What happened in a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A message was posted to the room
    MessageCreated,
    /// A message gained a reaction
    MessageReactionIncreased,
    /// A message lost a reaction
    MessageReactionDecreased,
    /// A message was marked answered
    MessageAnswered,
}

impl EventKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MessageCreated => "message_created",
            EventKind::MessageReactionIncreased => "message_reaction_increased",
            EventKind::MessageReactionDecreased => "message_reaction_decreased",
            EventKind::MessageAnswered => "message_answered",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload shapes for the typed constructors
pub mod payload {
    use serde::{Deserialize, Serialize};

    /// A message as returned after creation
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MessageCreated {
        /// Message id
        pub id: String,
        /// Message body
        pub message: String,
        /// Display name of the poster
        pub author: String,
    }

    /// New reaction count of a message
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ReactionCount {
        /// Message id
        pub id: String,
        /// Reaction count after the change
        pub count: i64,
    }

    /// A message that was marked answered
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MessageAnswered {
        /// Message id
        pub id: String,
    }
}

/// One state change, addressed to one room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// What changed
    pub kind: EventKind,
    /// Room whose subscribers receive the event
    pub room_id: RoomId,
    /// Kind-specific payload
    pub value: Value,
}

impl Event {
    /// Build an event from any serializable payload
    ///
    /// A payload that does not serialize is sent as `null`; the failure is
    /// logged since it points at a bug in the payload type.
    pub fn new(kind: EventKind, room_id: impl Into<RoomId>, value: impl Serialize) -> Self {
        let room_id = room_id.into();
        let value = serde_json::to_value(value).unwrap_or_else(|e| {
            tracing::error!(kind = %kind, room = %room_id, error = %e, "Event payload did not serialize");
            Value::Null
        });
        Self {
            kind,
            room_id,
            value,
        }
    }

    /// `message_created` carrying the created message
    pub fn message_created(room_id: impl Into<RoomId>, message: impl Serialize) -> Self {
        Self::new(EventKind::MessageCreated, room_id, message)
    }

    /// `message_reaction_increased` with the new count
    pub fn reaction_increased(room_id: impl Into<RoomId>, id: impl Into<String>, count: i64) -> Self {
        Self::new(
            EventKind::MessageReactionIncreased,
            room_id,
            payload::ReactionCount {
                id: id.into(),
                count,
            },
        )
    }

    /// `message_reaction_decreased` with the new count
    pub fn reaction_decreased(room_id: impl Into<RoomId>, id: impl Into<String>, count: i64) -> Self {
        Self::new(
            EventKind::MessageReactionDecreased,
            room_id,
            payload::ReactionCount {
                id: id.into(),
                count,
            },
        )
    }

    /// `message_answered` for message `id`
    pub fn message_answered(room_id: impl Into<RoomId>, id: impl Into<String>) -> Self {
        Self::new(
            EventKind::MessageAnswered,
            room_id,
            payload::MessageAnswered { id: id.into() },
        )
    }

    /// Serialize to the wire form
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
