//! Statistics and metrics for connections and the server

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Connection-level statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Frames read from the peer, of any type
    pub frames_received: u64,
    /// Queued frames written to the peer
    pub frames_sent: u64,
    /// Application-level pings answered
    pub client_pings: u64,
    /// Transport pings written by the keepalive loop
    pub probes_sent: u64,
    /// Connection duration
    pub duration: Duration,
}

/// Live counters shared by the two loops of one connection
#[derive(Debug, Default)]
pub struct ConnectionCounters {
    frames_received: AtomicU64,
    frames_sent: AtomicU64,
    client_pings: AtomicU64,
    probes_sent: AtomicU64,
}

impl ConnectionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn client_ping(&self) {
        self.client_pings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn probe_sent(&self) {
        self.probes_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Current values with a zero duration
    pub fn snapshot(&self) -> ConnectionStats {
        self.snapshot_with_duration(Duration::ZERO)
    }

    /// Current values stamped with how long the connection has lived
    pub fn snapshot_with_duration(&self, duration: Duration) -> ConnectionStats {
        ConnectionStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            client_pings: self.client_pings.load(Ordering::Relaxed),
            probes_sent: self.probes_sent.load(Ordering::Relaxed),
            duration,
        }
    }
}

/// Registry occupancy at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Rooms with at least one subscriber
    pub rooms: usize,
    /// Subscribed connections across all rooms
    pub subscribers: usize,
}

/// Server-wide statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Total connections accepted at the TCP level
    pub total_connections: u64,
    /// Connections currently being served
    pub active_connections: u64,
    /// Connections turned away at the connection limit
    pub rejected_connections: u64,
    /// Upgrades that failed or were refused
    pub failed_handshakes: u64,
    /// Uptime
    pub uptime: Duration,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Server-wide counters, updated by the accept loop and connection tasks
#[derive(Debug)]
pub struct ServerCounters {
    started_at: Instant,
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    rejected_connections: AtomicU64,
    failed_handshakes: AtomicU64,
}

impl Default for ServerCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerCounters {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            rejected_connections: AtomicU64::new(0),
            failed_handshakes: AtomicU64::new(0),
        }
    }

    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        // Saturating decrement
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn connection_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshake_failed(&self) {
        self.failed_handshakes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ServerStats {
        ServerStats {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            failed_handshakes: self.failed_handshakes.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}
