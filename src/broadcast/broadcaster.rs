//! Room fan-out

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use super::event::Event;
use crate::registry::SubscriberRegistry;
use crate::session::ConnectionId;

/// Result of one fan-out pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    /// Subscribers in the room when the pass started
    pub subscribers: usize,
    /// Frames enqueued
    pub delivered: usize,
    /// Subscribers cancelled and removed after a failed enqueue
    pub pruned: usize,
}

/// Pushes events to every subscriber of a room
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<SubscriberRegistry>,
}

impl Broadcaster {
    /// Create a broadcaster over `registry`
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self { registry }
    }

    /// The registry events are fanned out from
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Deliver `event` to its room
    ///
    /// Never blocks: each subscriber gets a non-blocking enqueue. A subscriber
    /// whose queue is full or closed is cancelled, and all of them are removed
    /// from the registry in one batch after the pass.
    pub fn notify(&self, event: &Event) -> NotifyReport {
        let room = &event.room_id;
        let handles = self.registry.snapshot(room);

        if handles.is_empty() {
            tracing::debug!(room = %room, kind = %event.kind, "No subscribers for event");
            return NotifyReport::default();
        }

        let frame = match event.to_json() {
            Ok(json) => Message::text(json),
            Err(e) => {
                tracing::error!(room = %room, kind = %event.kind, error = %e, "Failed to serialize event");
                return NotifyReport {
                    subscribers: handles.len(),
                    ..NotifyReport::default()
                };
            }
        };

        let mut failed: Vec<ConnectionId> = Vec::new();
        for handle in &handles {
            if let Err(e) = handle.try_send(frame.clone()) {
                tracing::debug!(
                    room = %room,
                    connection_id = %handle.id(),
                    error = %e,
                    "Dropping subscriber"
                );
                handle.cancel();
                failed.push(handle.id());
            }
        }

        let pruned = if failed.is_empty() {
            0
        } else {
            self.registry.remove_many(room, &failed)
        };

        let report = NotifyReport {
            subscribers: handles.len(),
            delivered: handles.len() - failed.len(),
            pruned,
        };

        tracing::debug!(
            room = %room,
            kind = %event.kind,
            subscribers = report.subscribers,
            delivered = report.delivered,
            pruned = report.pruned,
            "Event broadcast"
        );

        report
    }

    /// Run [`notify`](Self::notify) on the runtime and return immediately
    ///
    /// Must be called from within a tokio runtime.
    pub fn notify_in_background(&self, event: Event) -> JoinHandle<NotifyReport> {
        let this = self.clone();
        tokio::spawn(async move { this.notify(&event) })
    }
}
