//! Subscriber registry for room fan-out
//!
//! The registry maps each room to the live connections watching it. It is the
//! only shared mutable state in the crate and is guarded by a single mutex.
//!
//! # Architecture
//!
//! ```text
//!                      Arc<SubscriberRegistry>
//!                 ┌──────────────────────────────┐
//!                 │ rooms: HashMap<RoomId,       │
//!                 │   SubscriberSet {            │
//!                 │     ConnectionId ->          │
//!                 │       ConnectionHandle       │
//!                 │   }                          │
//!                 │ >                            │
//!                 │ index: ConnectionId -> Room  │
//!                 └──────────────┬───────────────┘
//!                                │ snapshot()
//!         ┌──────────────────────┼──────────────────────┐
//!         ▼                      ▼                      ▼
//!    [handle]                [handle]               [handle]
//!    try_send()              try_send()             try_send()
//! ```
//!
//! # Invariants
//!
//! - A room key exists only while its set is non-empty.
//! - A connection is a member of at most one room.
//! - The lock is never held across an await point or a network write.

pub mod entry;
pub mod room;
pub mod store;

pub use entry::SubscriberSet;
pub use room::RoomId;
pub use store::SubscriberRegistry;
