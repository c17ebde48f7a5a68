//! Connection lifecycle
//!
//! Drives one connection through `Connecting -> Active -> Closing -> Closed`.

use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::{Sink, Stream};
use tokio_tungstenite::tungstenite::{Error, Message};

use super::handle::{ConnectionHandle, ConnectionId};
use super::state::{CloseReason, ConnectionPhase, ConnectionState};
use super::{inbound, keepalive, SessionConfig};
use crate::registry::{RoomId, SubscriberRegistry};
use crate::stats::{ConnectionCounters, ConnectionStats};

/// Outcome of a finished session
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// Connection id
    pub connection_id: ConnectionId,
    /// Room that was watched
    pub room: RoomId,
    /// Final phase, always `Closed` once `run` returns
    pub phase: ConnectionPhase,
    /// Why the keepalive/writer loop stopped
    pub outbound: CloseReason,
    /// Why the inbound loop stopped
    pub inbound: CloseReason,
    /// Frame counters for the connection
    pub stats: ConnectionStats,
}

/// Removes the connection from its room when dropped
///
/// Dropping also covers the case where the session future itself is dropped
/// mid-flight, so the registry never keeps a handle for a dead task.
struct Subscription<'a> {
    registry: &'a SubscriberRegistry,
    room: &'a RoomId,
    id: ConnectionId,
}

impl Drop for Subscription<'_> {
    fn drop(&mut self) {
        self.registry.unsubscribe(self.room, self.id);
    }
}

/// One connection watching one room
pub struct Session {
    state: ConnectionState,
    registry: Arc<SubscriberRegistry>,
    config: SessionConfig,
}

impl Session {
    /// Create a session in `Connecting`
    pub fn new(
        id: ConnectionId,
        room: RoomId,
        peer_addr: Option<SocketAddr>,
        registry: Arc<SubscriberRegistry>,
        config: SessionConfig,
    ) -> Self {
        Self {
            state: ConnectionState::new(id, room, peer_addr),
            registry,
            config,
        }
    }

    /// Connection id
    pub fn id(&self) -> ConnectionId {
        self.state.id
    }

    /// Room being watched
    pub fn room(&self) -> &RoomId {
        &self.state.room
    }

    /// Register the connection and serve it until either side ends it
    ///
    /// `sink` and `stream` are the two halves of the upgraded transport. The
    /// sink is closed exactly once, by the writer loop, before this returns.
    pub async fn run<K, S>(self, sink: K, stream: S) -> SessionSummary
    where
        K: Sink<Message> + Unpin,
        K::Error: Display,
        S: Stream<Item = Result<Message, Error>> + Unpin,
    {
        let state = &self.state;
        let (handle, outbound_rx) =
            ConnectionHandle::new(state.id, state.peer_addr, self.config.outbound_buffer);
        let cancel = handle.cancel_signal().clone();
        let counters = ConnectionCounters::default();

        self.registry.subscribe(&state.room, handle.clone());
        let subscription = Subscription {
            registry: &self.registry,
            room: &state.room,
            id: state.id,
        };
        state.activate();

        tracing::info!(
            connection_id = %state.id,
            room = %state.room,
            peer = ?state.peer_addr,
            "Connection active"
        );

        let outbound = async {
            let reason =
                keepalive::run(sink, outbound_rx, &cancel, &self.config, &counters).await;
            state.begin_close();
            cancel.cancel();
            reason
        };
        let inbound = async {
            let reason =
                inbound::run(stream, &handle, &cancel, self.config.keepalive, &counters).await;
            state.begin_close();
            cancel.cancel();
            reason
        };
        let (outbound, inbound) = tokio::join!(outbound, inbound);

        drop(subscription);
        drop(handle);
        state.finish();

        for (side, reason) in [("outbound", &outbound), ("inbound", &inbound)] {
            if reason.is_expected() {
                tracing::debug!(connection_id = %state.id, side = side, reason = %reason, "Loop stopped");
            } else {
                tracing::warn!(connection_id = %state.id, side = side, reason = %reason, "WebSocket error");
            }
        }

        let stats = counters.snapshot_with_duration(state.duration());
        tracing::info!(
            connection_id = %state.id,
            room = %state.room,
            peer = ?state.peer_addr,
            duration_ms = stats.duration.as_millis() as u64,
            frames_sent = stats.frames_sent,
            frames_received = stats.frames_received,
            "Connection closed"
        );

        SessionSummary {
            connection_id: state.id,
            room: state.room.clone(),
            phase: state.phase(),
            outbound,
            inbound,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::channel::mpsc as fmpsc;
    use futures::StreamExt;
    use tokio::time;

    use super::*;
    use crate::broadcast::{Broadcaster, Event};
    use crate::session::frame::SERVER_PONG;
    use crate::session::KeepAlivePolicy;

    fn config(ping_ms: u64, idle_ms: u64) -> SessionConfig {
        SessionConfig {
            keepalive: KeepAlivePolicy::new(
                Duration::from_millis(ping_ms),
                Duration::from_millis(idle_ms),
            ),
            write_timeout: Duration::from_millis(200),
            outbound_buffer: 8,
        }
    }

    async fn wait_for_subscribers(registry: &SubscriberRegistry, room: &RoomId, count: usize) {
        time::timeout(Duration::from_secs(1), async {
            while registry.subscriber_count(room) != count {
                time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscriber count never reached");
    }

    #[tokio::test]
    async fn test_idle_connection_is_closed_and_removed() {
        let registry = Arc::new(SubscriberRegistry::new());
        let room = RoomId::from("r1");
        let session = Session::new(
            ConnectionId::new(1),
            room.clone(),
            None,
            Arc::clone(&registry),
            config(20, 60),
        );

        // Peer that never sends anything, not even pongs
        let stream = futures::stream::pending::<Result<Message, Error>>();
        let sink = futures::sink::drain::<Message>();

        let summary = time::timeout(Duration::from_secs(2), session.run(sink, stream))
            .await
            .expect("idle connection should be reaped");

        assert_eq!(summary.phase, ConnectionPhase::Closed);
        assert_eq!(summary.inbound, CloseReason::IdleTimeout);
        assert_eq!(summary.outbound, CloseReason::Cancelled);
        assert!(summary.stats.probes_sent >= 1);
        assert!(!registry.contains_room(&room));
    }

    #[tokio::test]
    async fn test_client_ping_keeps_connection_active() {
        let registry = Arc::new(SubscriberRegistry::new());
        let room = RoomId::from("r1");
        let session = Session::new(
            ConnectionId::new(7),
            room.clone(),
            None,
            Arc::clone(&registry),
            config(1_000, 2_000),
        );

        let (peer_tx, stream) = fmpsc::unbounded::<Result<Message, Error>>();
        let (sink, mut peer_rx) = fmpsc::unbounded::<Message>();
        let running = tokio::spawn(session.run(sink, stream));

        wait_for_subscribers(&registry, &room, 1).await;

        peer_tx
            .unbounded_send(Ok(Message::text(r#"{"kind":"client_ping"}"#)))
            .unwrap();
        let reply = time::timeout(Duration::from_secs(1), peer_rx.next())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reply, Message::text(SERVER_PONG));
        assert!(!running.is_finished());
        assert!(registry.is_subscribed(&room, ConnectionId::new(7)));

        // Peer goes away cleanly
        drop(peer_tx);
        let summary = running.await.unwrap();
        assert_eq!(summary.inbound, CloseReason::PeerClosed { code: None });
        assert_eq!(summary.stats.client_pings, 1);
        assert!(!registry.contains_room(&room));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_session_sink() {
        let registry = Arc::new(SubscriberRegistry::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        let room = RoomId::from("r1");
        let session = Session::new(
            ConnectionId::new(3),
            room.clone(),
            None,
            Arc::clone(&registry),
            config(1_000, 2_000),
        );

        let (peer_tx, stream) = fmpsc::unbounded::<Result<Message, Error>>();
        let (sink, mut peer_rx) = fmpsc::unbounded::<Message>();
        let running = tokio::spawn(session.run(sink, stream));
        wait_for_subscribers(&registry, &room, 1).await;

        let report = broadcaster.notify(&Event::message_answered(room.clone(), "m1"));
        assert_eq!(report.delivered, 1);

        let frame = time::timeout(Duration::from_secs(1), peer_rx.next())
            .await
            .unwrap()
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "message_answered", "room_id": "r1", "value": {"id": "m1"}})
        );

        drop(peer_tx);
        running.await.unwrap();
    }

    #[tokio::test]
    async fn test_external_cancel_unwinds_both_loops() {
        let registry = Arc::new(SubscriberRegistry::new());
        let room = RoomId::from("r1");
        let session = Session::new(
            ConnectionId::new(9),
            room.clone(),
            None,
            Arc::clone(&registry),
            config(1_000, 2_000),
        );

        let (_peer_tx, stream) = fmpsc::unbounded::<Result<Message, Error>>();
        let (sink, _peer_rx) = fmpsc::unbounded::<Message>();
        let running = tokio::spawn(session.run(sink, stream));
        wait_for_subscribers(&registry, &room, 1).await;

        // What the broadcaster does on a failed write
        for handle in registry.snapshot(&room) {
            handle.cancel();
            handle.cancel();
        }

        let summary = time::timeout(Duration::from_secs(1), running)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.outbound, CloseReason::Cancelled);
        assert_eq!(summary.inbound, CloseReason::Cancelled);
        assert_eq!(summary.phase, ConnectionPhase::Closed);
        assert!(!registry.contains_room(&room));
    }

    #[tokio::test]
    async fn test_failed_sink_closes_connection() {
        let registry = Arc::new(SubscriberRegistry::new());
        let room = RoomId::from("r1");
        let session = Session::new(
            ConnectionId::new(4),
            room.clone(),
            None,
            Arc::clone(&registry),
            config(10, 1_000),
        );

        let (_peer_tx, stream) = fmpsc::unbounded::<Result<Message, Error>>();
        let (sink, peer_rx) = fmpsc::unbounded::<Message>();
        drop(peer_rx);

        let summary = time::timeout(Duration::from_secs(1), session.run(sink, stream))
            .await
            .unwrap();
        assert!(matches!(summary.outbound, CloseReason::ProbeFailed(_)));
        assert_eq!(summary.inbound, CloseReason::Cancelled);
        assert!(!registry.contains_room(&room));
    }

    #[tokio::test]
    async fn test_extreme_keepalive_values_do_not_panic() {
        let registry = Arc::new(SubscriberRegistry::new());
        let room = RoomId::from("r1");
        let config = SessionConfig {
            keepalive: KeepAlivePolicy {
                ping_interval: Duration::ZERO,
                idle_timeout: Duration::MAX,
            },
            write_timeout: Duration::from_millis(200),
            outbound_buffer: 8,
        };
        let session = Session::new(
            ConnectionId::new(5),
            room.clone(),
            None,
            Arc::clone(&registry),
            config,
        );

        let (peer_tx, stream) = fmpsc::unbounded::<Result<Message, Error>>();
        let (sink, mut peer_rx) = fmpsc::unbounded::<Message>();
        let running = tokio::spawn(session.run(sink, stream));
        wait_for_subscribers(&registry, &room, 1).await;

        let ping = time::timeout(Duration::from_secs(1), peer_rx.next())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(ping, Message::Ping(_)));

        drop(peer_tx);
        let summary = time::timeout(Duration::from_secs(1), running)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.inbound, CloseReason::PeerClosed { code: None });
        assert_eq!(summary.phase, ConnectionPhase::Closed);
        assert!(!registry.contains_room(&room));
    }
}
