//! Per-connection session handling
//!
//! A session owns one upgraded WebSocket for its whole life. It registers a
//! [`ConnectionHandle`] for the room, then runs two loops side by side:
//!
//! - the keepalive loop, sole writer of the sink (probes + queued frames)
//! - the inbound loop, sole reader of the stream (deadline + client pings)
//!
//! Whichever loop stops first fires the connection's [`CancelSignal`], which
//! unwinds the other. The session then unsubscribes exactly once.

use std::time::Duration;

pub mod cancel;
pub mod frame;
pub mod handle;
mod inbound;
pub mod keepalive;
pub mod lifecycle;
pub mod state;

pub use cancel::CancelSignal;
pub use frame::{ClientFrame, ServerFrame};
pub use handle::{ConnectionHandle, ConnectionId, DeliveryError};
pub use keepalive::{KeepAlivePolicy, ReadDeadline};
pub use lifecycle::{Session, SessionSummary};
pub use state::{CloseReason, ConnectionPhase, ConnectionState};

/// Settings a session needs from the server configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Probe cadence and read deadline
    pub keepalive: KeepAlivePolicy,

    /// Upper bound for a single outbound write
    pub write_timeout: Duration,

    /// Frames that may wait in a connection's outbound queue
    pub outbound_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keepalive: KeepAlivePolicy::default(),
            write_timeout: Duration::from_secs(10),
            outbound_buffer: 64,
        }
    }
}
