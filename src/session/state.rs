//! Connection state machine
//!
//! Tracks a connection from upgrade to teardown. The phase lives in an atomic
//! so both loops can move it to `Closing` while the owning routine reads it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

use super::handle::{ConnectionId, DeliveryError};
use crate::registry::RoomId;

/// Connection lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectionPhase {
    /// Upgraded, not yet registered
    Connecting = 0,
    /// Registered, both loops running
    Active = 1,
    /// One loop exited; the other is unwinding
    Closing = 2,
    /// Unsubscribed and transport closed
    Closed = 3,
}

impl ConnectionPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Why one of a connection's loops stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The cancellation signal fired (sibling loop exit or broadcaster prune)
    Cancelled,
    /// The peer sent a close frame, or the stream ended cleanly
    PeerClosed {
        /// Close code from the frame, if any
        code: Option<u16>,
    },
    /// The transport dropped without a closing handshake
    ConnectionLost,
    /// Nothing was read before the read deadline lapsed
    IdleTimeout,
    /// A liveness probe could not be written
    ProbeFailed(String),
    /// A queued frame could not be written
    WriteFailed(String),
    /// The reply to a client ping could not be queued
    ReplyFailed(DeliveryError),
    /// The peer violated the protocol
    ProtocolError(String),
}

impl CloseReason {
    /// Whether this is an ordinary way for a connection to end
    ///
    /// Expected closures are logged at `debug`; everything else at `warn`.
    pub fn is_expected(&self) -> bool {
        match self {
            CloseReason::Cancelled | CloseReason::ConnectionLost | CloseReason::IdleTimeout => true,
            // normal, going away, abnormal
            CloseReason::PeerClosed { code } => matches!(code, None | Some(1000 | 1001 | 1006)),
            CloseReason::ProbeFailed(_)
            | CloseReason::WriteFailed(_)
            | CloseReason::ReplyFailed(_)
            | CloseReason::ProtocolError(_) => false,
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Cancelled => write!(f, "cancelled"),
            CloseReason::PeerClosed { code: Some(code) } => write!(f, "closed by peer ({})", code),
            CloseReason::PeerClosed { code: None } => write!(f, "closed by peer"),
            CloseReason::ConnectionLost => write!(f, "connection lost"),
            CloseReason::IdleTimeout => write!(f, "idle timeout"),
            CloseReason::ProbeFailed(e) => write!(f, "ping failed: {}", e),
            CloseReason::WriteFailed(e) => write!(f, "write failed: {}", e),
            CloseReason::ReplyFailed(e) => write!(f, "pong not queued: {}", e),
            CloseReason::ProtocolError(e) => write!(f, "protocol error: {}", e),
        }
    }
}

/// State of one connection
#[derive(Debug)]
pub struct ConnectionState {
    /// Connection id
    pub id: ConnectionId,

    /// Room being watched
    pub room: RoomId,

    /// Remote peer address
    pub peer_addr: Option<SocketAddr>,

    /// Time the connection was accepted
    pub connected_at: Instant,

    phase: AtomicU8,
}

impl ConnectionState {
    /// Create a new connection state in `Connecting`
    pub fn new(id: ConnectionId, room: RoomId, peer_addr: Option<SocketAddr>) -> Self {
        Self {
            id,
            room,
            peer_addr,
            connected_at: Instant::now(),
            phase: AtomicU8::new(ConnectionPhase::Connecting as u8),
        }
    }

    /// Current phase
    pub fn phase(&self) -> ConnectionPhase {
        ConnectionPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// `Connecting -> Active`
    pub fn activate(&self) -> bool {
        self.advance(ConnectionPhase::Connecting, ConnectionPhase::Active)
    }

    /// `Connecting | Active -> Closing`
    ///
    /// Returns `true` only for the first caller.
    pub fn begin_close(&self) -> bool {
        self.advance(ConnectionPhase::Active, ConnectionPhase::Closing)
            || self.advance(ConnectionPhase::Connecting, ConnectionPhase::Closing)
    }

    /// Move to the terminal phase
    pub fn finish(&self) {
        self.phase
            .store(ConnectionPhase::Closed as u8, Ordering::Release);
    }

    /// Check if the connection is active
    pub fn is_active(&self) -> bool {
        self.phase() == ConnectionPhase::Active
    }

    /// Time since the connection was accepted
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }

    fn advance(&self, from: ConnectionPhase, to: ConnectionPhase) -> bool {
        self.phase
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
