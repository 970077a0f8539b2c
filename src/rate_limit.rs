//! Request pacing.
//!
//! Every outbound call site awaits a [`RateLimiter`] instead of sleeping inline,
//! so tests can swap in a limiter that only counts.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Something that can hold the caller back before the next request.
pub trait RateLimiter {
    /// Wait until the next request may go out.
    fn pace(&self) -> impl Future<Output = ()> + Send;
}

/// Unconditional pause of a fixed length on every call.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl RateLimiter for FixedDelay {
    async fn pace(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// Guarantees a minimum interval between consecutive calls.
///
/// The first call passes immediately; later calls sleep only for whatever is
/// left of the interval since the previous one.
#[derive(Debug)]
pub struct IntervalGate {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl IntervalGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Time still to wait before the next call, if any
    fn remaining(&self) -> Option<Duration> {
        let last = self.last.lock().ok()?;
        last.map(|t| t.elapsed())
            .filter(|elapsed| *elapsed < self.interval)
            .map(|elapsed| self.interval - elapsed)
    }

    fn mark(&self) {
        if let Ok(mut last) = self.last.lock() {
            *last = Some(Instant::now());
        }
    }
}

impl RateLimiter for IntervalGate {
    async fn pace(&self) {
        // guard is released inside remaining(), before the await
        if let Some(wait) = self.remaining() {
            debug!(wait_ms = wait.as_millis() as u64, "Rate limit gate");
            tokio::time::sleep(wait).await;
        }
        self.mark();
    }
}
