//! One-shot cancellation signal
//!
//! A close-once flag paired with a `Notify`. Firing is idempotent and safe from
//! any task, including the broadcaster which does not own the connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    fired: AtomicBool,
    notify: Notify,
}

/// Cancellation signal shared by a connection's loops and the registry
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    inner: Arc<Inner>,
}

impl CancelSignal {
    /// Create an unfired signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal
    ///
    /// Returns `true` only for the call that actually fired it; later calls are
    /// no-ops.
    pub fn cancel(&self) -> bool {
        if self.inner.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.notify.notify_waiters();
        true
    }

    /// Check whether the signal has fired
    pub fn is_cancelled(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    /// Wait until the signal fires
    ///
    /// Resolves immediately if it already has.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent cancel() is not lost
        notified.as_mut().enable();

        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_pending, assert_ready, task};

    use super::*;

    #[test]
    fn test_cancel_is_idempotent() {
        let signal = CancelSignal::new();

        assert!(!signal.is_cancelled());
        assert!(signal.cancel());
        assert!(!signal.cancel());
        assert!(!signal.clone().cancel());
        assert!(signal.is_cancelled());
    }

    #[test]
    fn test_wakes_waiter_registered_before_cancel() {
        let signal = CancelSignal::new();
        let mut waiter = task::spawn(signal.cancelled());

        assert_pending!(waiter.poll());

        signal.cancel();
        assert!(waiter.is_woken());
        assert_ready!(waiter.poll());
    }

    #[test]
    fn test_resolves_immediately_after_cancel() {
        let signal = CancelSignal::new();
        signal.cancel();

        let mut waiter = task::spawn(signal.cancelled());
        assert_ready!(waiter.poll());
    }

    #[tokio::test]
    async fn test_cancel_from_another_task() {
        let signal = CancelSignal::new();
        let remote = signal.clone();

        let waiter = tokio::spawn(async move { signal.cancelled().await });
        tokio::spawn(async move {
            remote.cancel();
            remote.cancel();
        });

        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be released")
            .unwrap();
    }
}
