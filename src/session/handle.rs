//! Connection handles
//!
//! A handle is the registry's view of one live connection: somewhere to put
//! outbound frames and a way to tell the connection to shut down.

use std::net::SocketAddr;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_tungstenite::tungstenite::Message;

use super::cancel::CancelSignal;

/// Unique identifier of a connection within one process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wrap a raw id
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw id
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a frame could not be queued for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The outbound queue is at capacity: the peer is not keeping up
    #[error("outbound queue full")]
    QueueFull,
    /// The connection is shutting down or gone
    #[error("connection closed")]
    Closed,
}

/// Handle to one live streaming connection
///
/// Cheap to clone. All clones share the same bounded outbound queue and the
/// same cancellation signal.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    outbound: mpsc::Sender<Message>,
    cancel: CancelSignal,
}

impl ConnectionHandle {
    /// Create a handle and the receiving end of its outbound queue
    ///
    /// `capacity` bounds how many frames may wait for the writer; it is raised
    /// to one if zero.
    pub fn new(
        id: ConnectionId,
        peer_addr: Option<SocketAddr>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Message>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id,
            peer_addr,
            outbound,
            cancel: CancelSignal::new(),
        };
        (handle, rx)
    }

    /// Connection id
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote peer address, if known
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// The connection's cancellation signal
    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Queue a frame without waiting
    pub fn try_send(&self, frame: Message) -> Result<(), DeliveryError> {
        if self.cancel.is_cancelled() {
            return Err(DeliveryError::Closed);
        }
        self.outbound.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::QueueFull,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Ask the connection to shut down
    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    /// Check whether shutdown was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_send_queues_frame() {
        let (handle, mut rx) = ConnectionHandle::new(ConnectionId::new(1), None, 2);

        handle.try_send(Message::text("hello")).unwrap();

        assert_eq!(rx.try_recv().unwrap(), Message::text("hello"));
    }

    #[test]
    fn test_try_send_reports_full_queue() {
        let (handle, _rx) = ConnectionHandle::new(ConnectionId::new(1), None, 1);

        handle.try_send(Message::text("a")).unwrap();
        assert_eq!(
            handle.try_send(Message::text("b")),
            Err(DeliveryError::QueueFull)
        );
    }

    #[test]
    fn test_try_send_reports_closed() {
        let (handle, rx) = ConnectionHandle::new(ConnectionId::new(1), None, 4);
        drop(rx);

        assert_eq!(
            handle.try_send(Message::text("a")),
            Err(DeliveryError::Closed)
        );
    }

    #[test]
    fn test_cancelled_handle_refuses_frames() {
        let (handle, _rx) = ConnectionHandle::new(ConnectionId::new(1), None, 4);
        let clone = handle.clone();

        assert!(clone.cancel());
        assert!(handle.is_cancelled());
        assert_eq!(
            handle.try_send(Message::text("a")),
            Err(DeliveryError::Closed)
        );
    }
}
