//! Global request pacing for fetch workers
//!
//! Every worker reserves its request slot from one shared "next allowed"
//! timestamp, so the whole pool issues at most one request per
//! `base_interval` regardless of worker count.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tracing::debug;

/// Configuration for request pacing
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Minimum spacing between any two requests
    pub base_interval: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(1500),
        }
    }
}

/// Shared request pacer.
///
/// Clone it into each worker; all clones share the same timestamp.
#[derive(Clone)]
pub struct RateLimiter {
    next_allowed: Arc<Mutex<Instant>>,
    base_interval: Duration,
}

impl RateLimiter {
    /// Create a pacer whose first slot is available immediately
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            next_allowed: Arc::new(Mutex::new(Instant::now())),
            base_interval: config.base_interval,
        }
    }

    /// Reserve the next free slot without waiting.
    ///
    /// Returns the instant at which the caller may issue its request. The
    /// shared timestamp moves forward by `base_interval`.
    pub fn reserve_slot(&self) -> Instant {
        let mut next = self.next_allowed.lock();
        let now = Instant::now();
        if *next < now {
            *next = now;
        }
        let slot = *next;
        *next = slot + self.base_interval;
        slot
    }

    /// Wait for a reserved slot; returns how long the caller waited.
    ///
    /// The lock is only held while reserving, never while sleeping.
    pub async fn acquire_slot(&self) -> Duration {
        let slot = self.reserve_slot();
        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            tokio::time::sleep_until(slot).await;
        }
        wait
    }

    /// Push the shared timestamp forward so every worker slows down.
    ///
    /// A timestamp already in the past is first brought up to now, so the
    /// penalty is always felt by the next reservation.
    pub fn extend_penalty(&self, extra: Duration) {
        let mut next = self.next_allowed.lock();
        let now = Instant::now();
        if *next < now {
            *next = now;
        }
        *next += extra;
        debug!("Rate limiter penalty extended by {:?}", extra);
    }

    /// Current shared timestamp
    pub fn next_allowed(&self) -> Instant {
        *self.next_allowed.lock()
    }

    pub fn base_interval(&self) -> Duration {
        self.base_interval
    }
}
