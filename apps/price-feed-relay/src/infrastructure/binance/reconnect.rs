//! Reconnection Timer
//!
//! Fixed-delay, single-slot reconnect scheduling for the feed connection.
//! A disconnect schedules exactly one reconnect after `delay`; further
//! disconnect signals while that reconnect is pending are ignored. Once the
//! timer fires the slot is cleared and the owner opens a fresh connection.
//! There is no backoff and no attempt limit.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default delay before reconnecting.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1500);

/// Signal that a scheduled reconnect is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectTick {
    /// Reconnect attempt number since startup.
    pub attempt: u32,
}

/// Single-slot reconnect timer.
///
/// # Example
///
/// ```rust
/// use price_feed_relay::infrastructure::binance::reconnect::ReconnectTimer;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (timer, mut ticks) = ReconnectTimer::new(Duration::from_millis(10), CancellationToken::new());
///
/// assert!(timer.schedule());
/// assert!(!timer.schedule()); // already pending
///
/// let tick = ticks.recv().await.unwrap();
/// assert_eq!(tick.attempt, 1);
/// # }
/// ```
#[derive(Debug)]
pub struct ReconnectTimer {
    delay: Duration,
    pending: Arc<AtomicBool>,
    attempts: Arc<AtomicU32>,
    tick_tx: mpsc::Sender<ReconnectTick>,
    cancel: CancellationToken,
}

impl ReconnectTimer {
    /// Create a timer and the receiver its ticks are delivered on.
    #[must_use]
    pub fn new(delay: Duration, cancel: CancellationToken) -> (Self, mpsc::Receiver<ReconnectTick>) {
        let (tick_tx, tick_rx) = mpsc::channel(4);
        let timer = Self {
            delay,
            pending: Arc::new(AtomicBool::new(false)),
            attempts: Arc::new(AtomicU32::new(0)),
            tick_tx,
            cancel,
        };
        (timer, tick_rx)
    }

    /// Schedule a reconnect after the configured delay.
    ///
    /// Returns `false` without scheduling anything if a reconnect is
    /// already pending.
    pub fn schedule(&self) -> bool {
        if self.pending.swap(true, Ordering::AcqRel) {
            return false;
        }

        let delay = self.delay;
        let pending = Arc::clone(&self.pending);
        let attempts = Arc::clone(&self.attempts);
        let tick_tx = self.tick_tx.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {
                    pending.store(false, Ordering::Release);
                }
                () = tokio::time::sleep(delay) => {
                    pending.store(false, Ordering::Release);
                    let attempt = attempts.fetch_add(1, Ordering::AcqRel) + 1;
                    let _ = tick_tx.send(ReconnectTick { attempt }).await;
                }
            }
        });

        true
    }

    /// Whether a reconnect is currently pending.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Reconnects fired so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Configured delay.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let (timer, mut ticks) = ReconnectTimer::new(DEFAULT_RECONNECT_DELAY, CancellationToken::new());
        let started = Instant::now();

        assert!(timer.schedule());
        let tick = ticks.recv().await.unwrap();

        assert!(started.elapsed() >= DEFAULT_RECONNECT_DELAY);
        assert_eq!(tick.attempt, 1);
        assert!(!timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn second_close_while_pending_is_ignored() {
        let (timer, mut ticks) = ReconnectTimer::new(DEFAULT_RECONNECT_DELAY, CancellationToken::new());

        assert!(timer.schedule());
        assert!(!timer.schedule());
        assert!(timer.is_pending());

        assert_eq!(ticks.recv().await.unwrap().attempt, 1);

        // Well past another delay: nothing else was scheduled.
        tokio::time::sleep(DEFAULT_RECONNECT_DELAY * 4).await;
        assert!(ticks.try_recv().is_err());
        assert_eq!(timer.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_fires_before_delay() {
        let (timer, mut ticks) = ReconnectTimer::new(DEFAULT_RECONNECT_DELAY, CancellationToken::new());
        assert!(timer.schedule());

        tokio::time::sleep(Duration::from_millis(1_499)).await;
        assert!(ticks.try_recv().is_err());
        assert!(timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn can_reschedule_after_firing() {
        let (timer, mut ticks) = ReconnectTimer::new(DEFAULT_RECONNECT_DELAY, CancellationToken::new());

        assert!(timer.schedule());
        ticks.recv().await.unwrap();
        assert!(timer.schedule());
        assert_eq!(ticks.recv().await.unwrap().attempt, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_clears_pending_reconnect() {
        let cancel = CancellationToken::new();
        let (timer, mut ticks) = ReconnectTimer::new(DEFAULT_RECONNECT_DELAY, cancel.clone());

        assert!(timer.schedule());
        cancel.cancel();
        tokio::time::sleep(DEFAULT_RECONNECT_DELAY * 2).await;

        assert!(ticks.try_recv().is_err());
        assert!(!timer.is_pending());
    }
}
