//! Application-level liveness frames
//!
//! Clients that cannot send transport pings (browsers) send
//! `{"kind":"client_ping"}` and expect `{"kind":"server_pong"}` back.

use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};

/// Serialized form of [`ServerFrame::ServerPong`]
pub const SERVER_PONG: &str = r#"{"kind":"server_pong"}"#;

/// Frames a client may send, distinguished by `kind`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Application-level liveness probe
    ClientPing,
}

impl ClientFrame {
    /// Parse a text frame; anything unrecognized is `None`
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

/// Frames the server sends outside of broadcast events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Reply to [`ClientFrame::ClientPing`]
    ServerPong,
}

/// The pong reply as a ready-to-send message
pub fn server_pong() -> Message {
    Message::Text(Utf8Bytes::from_static(SERVER_PONG))
}
