//! Event fan-out to room subscribers

pub mod broadcaster;
pub mod event;

pub use broadcaster::{Broadcaster, NotifyReport};
pub use event::{payload, Event, EventKind};
