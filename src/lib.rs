//! Room-scoped live notifications over WebSocket
//!
//! `roomcast` is the subscriber side of a room message board: viewers open a
//! WebSocket on `/subscribe/{room_id}` and receive every event the REST layer
//! publishes for that room.
//!
//! # Architecture
//!
//! ```text
//!        CRUD handler                          RoomServer (accept loop)
//!             │                                         │
//!             ▼                                         ▼
//!   Broadcaster::notify(event)               Session::run (one task per socket)
//!             │                                ┌────────┴─────────┐
//!             ▼                                ▼                  ▼
//!   Arc<SubscriberRegistry> ◄── subscribe ── keepalive          inbound
//!   Mutex<HashMap<RoomId,                    (owns sink,        (owns stream,
//!     SubscriberSet>>                         probes, queue)     deadline, pong)
//!             │
//!             └──► ConnectionHandle::try_send ──► bounded queue ──► keepalive ──► TCP
//! ```
//!
//! The registry lock is held only while the maps are touched. Fan-out copies
//! the subscriber set out and enqueues into bounded per-connection queues, so a
//! stalled peer can fill its own queue but never blocks another room.

pub mod broadcast;
pub mod error;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use broadcast::{Broadcaster, Event, EventKind, NotifyReport};
pub use error::{Error, Result};
pub use registry::{RoomId, SubscriberRegistry};
pub use server::{AnyRoom, KnownRooms, RoomDirectory, RoomServer, ServerConfig};
pub use session::{
    CancelSignal, CloseReason, ConnectionHandle, ConnectionId, ConnectionPhase, KeepAlivePolicy,
    Session, SessionConfig, SessionSummary,
};
