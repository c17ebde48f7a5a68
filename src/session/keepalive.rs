//! Keepalive and outbound writer loop
//!
//! This loop is the only writer of a connection's sink. It sends a transport
//! ping every `ping_interval` and writes whatever the registry queued for the
//! connection, each write bounded by `write_timeout`.
//!
//! The ping interval is kept shorter than the idle timeout (54s vs 60s by
//! default) so the pong for a probe lands before the read deadline lapses,
//! with one round trip of slack. If the peer never answers, the inbound loop
//! times out on its own. A ping interval at or past the idle timeout is
//! pulled back to nine tenths of it.

use std::fmt::Display;
use std::time::Duration;

use bytes::Bytes;
use futures::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;

use super::cancel::CancelSignal;
use super::state::CloseReason;
use super::SessionConfig;
use crate::stats::ConnectionCounters;

/// Ping cadence and idle timeout for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlivePolicy {
    /// Interval between outbound liveness probes
    pub ping_interval: Duration,

    /// Read deadline measured from the last inbound frame
    pub idle_timeout: Duration,
}

impl Default for KeepAlivePolicy {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(54),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Shortest ping interval the writer will run with
pub const MIN_PING_INTERVAL: Duration = Duration::from_millis(1);

// Stand-in for deadlines past what the clock can represent
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

impl KeepAlivePolicy {
    /// Create a policy
    pub fn new(ping_interval: Duration, idle_timeout: Duration) -> Self {
        Self {
            ping_interval: ping_interval.max(MIN_PING_INTERVAL),
            idle_timeout,
        }
    }

    /// Interval the writer actually probes at
    ///
    /// Always at least [`MIN_PING_INTERVAL`] and below `idle_timeout`.
    pub fn effective_ping_interval(&self) -> Duration {
        let interval = if self.ping_interval >= self.idle_timeout {
            self.idle_timeout / 10 * 9
        } else {
            self.ping_interval
        };
        interval.max(MIN_PING_INTERVAL)
    }

    /// Margin between a probe and the deadline it is meant to refresh
    pub fn probe_margin(&self) -> Duration {
        self.idle_timeout.saturating_sub(self.effective_ping_interval())
    }
}

/// `now + after`, saturating to a far-future instant
pub(crate) fn instant_after(now: Instant, after: Duration) -> Instant {
    now.checked_add(after).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Read deadline refreshed by inbound activity
#[derive(Debug, Clone, Copy)]
pub struct ReadDeadline {
    at: Instant,
    idle_timeout: Duration,
}

impl ReadDeadline {
    /// Start a deadline `idle_timeout` from now
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            at: instant_after(Instant::now(), idle_timeout),
            idle_timeout,
        }
    }

    /// Push the deadline out to `idle_timeout` from now
    pub fn refresh(&mut self) {
        self.at = instant_after(Instant::now(), self.idle_timeout);
    }

    /// The instant the connection goes idle
    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Check if the deadline has passed
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }
}

/// Run the writer until cancelled or a write fails, then close the sink
pub(crate) async fn run<K>(
    mut sink: K,
    mut outbound: mpsc::Receiver<Message>,
    cancel: &CancelSignal,
    config: &SessionConfig,
    counters: &ConnectionCounters,
) -> CloseReason
where
    K: Sink<Message> + Unpin,
    K::Error: Display,
{
    let period = config.keepalive.effective_ping_interval();
    let mut ticker = time::interval_at(instant_after(Instant::now(), period), period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break CloseReason::Cancelled,

            _ = ticker.tick() => {
                if let Err(e) = write(&mut sink, Message::Ping(Bytes::new()), config.write_timeout).await {
                    break CloseReason::ProbeFailed(e);
                }
                counters.probe_sent();
                tracing::trace!("Ping sent");
            }

            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = write(&mut sink, frame, config.write_timeout).await {
                        break CloseReason::WriteFailed(e);
                    }
                    counters.frame_sent();
                }
                // Every handle is gone, nothing can be queued anymore
                None => break CloseReason::Cancelled,
            },
        }
    };

    match time::timeout(config.write_timeout, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(error = %e, "Sink close failed"),
        Err(_) => tracing::debug!("Sink close timed out"),
    }

    reason
}

async fn write<K>(sink: &mut K, frame: Message, limit: Duration) -> Result<(), String>
where
    K: Sink<Message> + Unpin,
    K::Error: Display,
{
    match time::timeout(limit, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {:?}", limit)),
    }
}

#[cfg(test)]
mod tests {
    use futures::channel::mpsc as fmpsc;
    use futures::StreamExt;

    use super::*;

    fn config(ping_ms: u64) -> SessionConfig {
        SessionConfig {
            keepalive: KeepAlivePolicy::new(
                Duration::from_millis(ping_ms),
                Duration::from_millis(ping_ms * 4),
            ),
            write_timeout: Duration::from_millis(200),
            outbound_buffer: 8,
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = KeepAlivePolicy::default();
        assert_eq!(policy.ping_interval, Duration::from_secs(54));
        assert_eq!(policy.idle_timeout, Duration::from_secs(60));
        assert_eq!(policy.probe_margin(), Duration::from_secs(6));
    }

    #[test]
    fn test_zero_ping_interval_is_floored() {
        let policy = KeepAlivePolicy::new(Duration::ZERO, Duration::from_millis(100));
        assert_eq!(policy.ping_interval, MIN_PING_INTERVAL);

        let raw = KeepAlivePolicy {
            ping_interval: Duration::ZERO,
            idle_timeout: Duration::ZERO,
        };
        assert_eq!(raw.effective_ping_interval(), MIN_PING_INTERVAL);
    }

    #[test]
    fn test_ping_interval_stays_below_idle_timeout() {
        let policy = KeepAlivePolicy::new(Duration::from_secs(90), Duration::from_secs(60));
        assert_eq!(policy.effective_ping_interval(), Duration::from_secs(54));
        assert_eq!(policy.probe_margin(), Duration::from_secs(6));

        let equal = KeepAlivePolicy::new(Duration::from_secs(10), Duration::from_secs(10));
        assert_eq!(equal.effective_ping_interval(), Duration::from_secs(9));
    }

    #[tokio::test]
    async fn test_huge_idle_timeout_saturates() {
        let mut deadline = ReadDeadline::new(Duration::MAX);
        assert!(!deadline.is_expired());
        assert!(deadline.instant() > Instant::now() + Duration::from_secs(86400));

        deadline.refresh();
        assert!(!deadline.is_expired());
    }

    #[tokio::test]
    async fn test_zero_ping_interval_does_not_stall_writer() {
        let (sink, mut written) = fmpsc::unbounded::<Message>();
        let (_queue, outbound) = mpsc::channel(8);
        let cancel = CancelSignal::new();
        let counters = ConnectionCounters::default();
        let config = SessionConfig {
            keepalive: KeepAlivePolicy {
                ping_interval: Duration::ZERO,
                idle_timeout: Duration::from_millis(100),
            },
            write_timeout: Duration::from_millis(200),
            outbound_buffer: 8,
        };

        let writer = run(sink, outbound, &cancel, &config, &counters);
        let observer = async {
            let ping = written.next().await.unwrap();
            cancel.cancel();
            ping
        };

        let (reason, ping) = tokio::join!(writer, observer);
        assert_eq!(reason, CloseReason::Cancelled);
        assert!(matches!(ping, Message::Ping(_)));
    }

    #[tokio::test]
    async fn test_read_deadline_refresh() {
        let mut deadline = ReadDeadline::new(Duration::from_millis(30));
        let first = deadline.instant();
        assert!(!deadline.is_expired());

        time::sleep(Duration::from_millis(40)).await;
        assert!(deadline.is_expired());

        deadline.refresh();
        assert!(deadline.instant() > first);
        assert!(!deadline.is_expired());
    }

    #[tokio::test]
    async fn test_sends_pings_and_queued_frames() {
        let (sink, mut written) = fmpsc::unbounded::<Message>();
        let (queue, outbound) = mpsc::channel(8);
        let cancel = CancelSignal::new();
        let counters = ConnectionCounters::default();
        let config = config(20);

        queue.send(Message::text("event")).await.unwrap();

        let writer = run(sink, outbound, &cancel, &config, &counters);
        let observer = async {
            let first = written.next().await.unwrap();
            let second = written.next().await.unwrap();
            cancel.cancel();
            (first, second)
        };

        let (reason, (first, second)) = tokio::join!(writer, observer);

        assert_eq!(reason, CloseReason::Cancelled);
        assert_eq!(first, Message::text("event"));
        assert!(matches!(second, Message::Ping(_)));
        assert_eq!(counters.snapshot().frames_sent, 1);
        assert!(counters.snapshot().probes_sent >= 1);
    }

    #[tokio::test]
    async fn test_ping_failure_ends_loop() {
        let (sink, written) = fmpsc::unbounded::<Message>();
        drop(written);
        let (_queue, outbound) = mpsc::channel(8);
        let cancel = CancelSignal::new();
        let counters = ConnectionCounters::default();

        let reason = time::timeout(
            Duration::from_secs(1),
            run(sink, outbound, &cancel, &config(10), &counters),
        )
        .await
        .unwrap();

        assert!(matches!(reason, CloseReason::ProbeFailed(_)));
    }
}
