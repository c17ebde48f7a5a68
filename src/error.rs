//! Server error types
//!
//! Only the accept/upgrade path produces errors. Per-subscriber delivery
//! failures are [`DeliveryError`](crate::session::DeliveryError) and loop exits
//! are [`CloseReason`](crate::session::CloseReason); neither is surfaced here.

use std::time::Duration;

use tokio_tungstenite::tungstenite;

use crate::registry::RoomId;
use crate::server::PathRejection;

/// Error type for server operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket bind, accept or configuration failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The WebSocket upgrade was refused or malformed
    #[error("WebSocket handshake failed: {0}")]
    Handshake(#[from] tungstenite::Error),

    /// The peer did not finish the upgrade in time
    #[error("WebSocket handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// The request path is not a subscribe route or its room id is malformed
    #[error("upgrade rejected for {path}: {reason}")]
    Rejected { path: String, reason: PathRejection },

    /// The room does not exist in the room directory
    #[error("room not found: {0}")]
    RoomNotFound(RoomId),
}

/// Result alias used throughout the server path
pub type Result<T> = std::result::Result<T, Error>;
