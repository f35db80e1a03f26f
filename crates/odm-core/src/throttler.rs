//! Per-job resource governor: bounds in-flight requests and bytes per hour.
//!
//! Workers acquire a token before fetching and release it with the actual
//! byte count afterwards. `stop()` cooperatively cancels the throttler:
//! pending and future acquisitions fail with the abort signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::error::DlError;
use crate::payload::Limits;

const WINDOW: Duration = Duration::from_secs(3600);

#[derive(Debug)]
struct ByteWindow {
    start: Instant,
    spent: i64,
}

/// Opaque permit for one in-flight item. Must be handed back via
/// [`Throttler::release`] with the actual transferred byte count.
#[derive(Debug)]
pub struct ThrottleToken {
    _permit: OwnedSemaphorePermit,
    hint: i64,
}

#[derive(Debug)]
pub struct Throttler {
    conns: Arc<Semaphore>,
    bytes_per_hour: i64,
    window: Mutex<ByteWindow>,
    stopped: AtomicBool,
    stop_notify: Notify,
}

impl Throttler {
    /// `limits` must already be target-local (bytes/hour divided among the
    /// active targets by the caller). Zero connections means unbounded.
    pub fn new(limits: Limits) -> Self {
        let permits = if limits.connections == 0 {
            Semaphore::MAX_PERMITS
        } else {
            limits.connections
        };
        Self {
            conns: Arc::new(Semaphore::new(permits)),
            bytes_per_hour: limits.bytes_per_hour.max(0),
            window: Mutex::new(ByteWindow {
                start: Instant::now(),
                spent: 0,
            }),
            stopped: AtomicBool::new(false),
            stop_notify: Notify::new(),
        }
    }

    /// Target-local bytes/hour bound, 0 when unbounded.
    pub fn bytes_per_hour(&self) -> i64 {
        self.bytes_per_hour
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Reserve capacity for one item expected to transfer about
    /// `bytes_hint` bytes. Suspends while the connection cap is reached or
    /// the hourly byte window is exhausted; fails with `DlError::Aborted`
    /// once the throttler is stopped.
    pub async fn acquire(&self, bytes_hint: i64) -> Result<ThrottleToken, DlError> {
        let permit = self
            .conns
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DlError::Aborted)?;

        if self.bytes_per_hour > 0 {
            loop {
                let deadline = {
                    let mut w = self.window.lock().unwrap();
                    let now = Instant::now();
                    if now.duration_since(w.start) >= WINDOW {
                        w.start = now;
                        w.spent = 0;
                    }
                    // An empty window always admits one item so oversized
                    // hints cannot wedge the job.
                    if w.spent == 0 || w.spent + bytes_hint <= self.bytes_per_hour {
                        w.spent += bytes_hint;
                        None
                    } else {
                        Some(w.start + WINDOW)
                    }
                };
                let Some(deadline) = deadline else { break };

                let stop = self.stop_notify.notified();
                if self.is_stopped() {
                    return Err(DlError::Aborted);
                }
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = stop => return Err(DlError::Aborted),
                }
            }
        }
        if self.is_stopped() {
            return Err(DlError::Aborted);
        }
        Ok(ThrottleToken {
            _permit: permit,
            hint: bytes_hint,
        })
    }

    /// Settle a token: charge the window with the actual byte count instead
    /// of the hint and free the connection slot.
    pub fn release(&self, token: ThrottleToken, actual_bytes: i64) {
        if self.bytes_per_hour > 0 {
            let mut w = self.window.lock().unwrap();
            w.spent = (w.spent - token.hint + actual_bytes).max(0);
        }
        // Permit drops here.
    }

    /// Stop the throttler: all pending and future acquisitions fail.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.conns.close();
        self.stop_notify.notify_waiters();
    }

    /// Resolves once the throttler has been stopped. Used by workers to
    /// cancel in-flight fetches on abort.
    pub async fn cancelled(&self) {
        loop {
            if self.is_stopped() {
                return;
            }
            let notified = self.stop_notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn connection_cap_blocks_third_acquire() {
        let t = Throttler::new(Limits {
            bytes_per_hour: 0,
            connections: 2,
        });
        let a = t.acquire(0).await.unwrap();
        let _b = t.acquire(0).await.unwrap();
        let third = tokio::time::timeout(Duration::from_millis(50), t.acquire(0)).await;
        assert!(third.is_err(), "third acquire should block at cap 2");

        t.release(a, 0);
        let c = tokio::time::timeout(Duration::from_millis(200), t.acquire(0))
            .await
            .expect("slot freed")
            .unwrap();
        t.release(c, 0);
    }

    #[tokio::test]
    async fn stop_fails_pending_and_future_acquires() {
        let t = Arc::new(Throttler::new(Limits {
            bytes_per_hour: 0,
            connections: 1,
        }));
        let held = t.acquire(0).await.unwrap();

        let t2 = Arc::clone(&t);
        let pending = tokio::spawn(async move { t2.acquire(0).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        t.stop();
        let res = pending.await.unwrap();
        assert!(matches!(res, Err(DlError::Aborted)));
        assert!(matches!(t.acquire(0).await, Err(DlError::Aborted)));
        t.release(held, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn byte_window_suspends_until_next_hour() {
        let t = Throttler::new(Limits {
            bytes_per_hour: 1_000,
            connections: 0,
        });
        let a = t.acquire(900).await.unwrap();
        t.release(a, 900);

        // Exceeds the remaining window; with paused time the sleep
        // auto-advances a full hour and the window resets.
        let before = tokio::time::Instant::now();
        let b = t.acquire(900).await.unwrap();
        t.release(b, 900);
        assert!(before.elapsed() >= Duration::from_secs(3000));
    }

    #[tokio::test]
    async fn oversized_hint_admitted_on_empty_window() {
        let t = Throttler::new(Limits {
            bytes_per_hour: 10,
            connections: 0,
        });
        let tok = tokio::time::timeout(Duration::from_millis(100), t.acquire(1_000_000))
            .await
            .expect("empty window admits one oversized item")
            .unwrap();
        t.release(tok, 1_000_000);
    }

    #[tokio::test]
    async fn cancelled_resolves_after_stop() {
        let t = Arc::new(Throttler::new(Limits::default()));
        let t2 = Arc::clone(&t);
        let waiter = tokio::spawn(async move { t2.cancelled().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        t.stop();
        tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .expect("cancelled() should resolve")
            .unwrap();
    }
}
