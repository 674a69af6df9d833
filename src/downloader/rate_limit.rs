//! Request-rate limiting
//!
//! One leaky bucket shared by every caller: listing and transcript requests
//! draw from the same budget. Slots are spaced `ceil(1e9 / rate)` ns apart,
//! so no rolling one-second window ever admits more than `ceil(rate)`
//! callers, and callers are admitted in the order they reserve a slot.

use crate::metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Rate limiter shared across tasks; cloning shares the budget
#[derive(Clone, Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Arc<Mutex<Option<Instant>>>,
}

impl RateLimiter {
    /// Limiter admitting at most `rate` callers per second
    pub fn per_second(rate: f64) -> Result<Self, RateLimitError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(RateLimitError::InvalidRate(rate));
        }
        let nanos = (1e9 / rate).ceil();
        if nanos > u64::MAX as f64 {
            return Err(RateLimitError::InvalidRate(rate));
        }
        Ok(Self {
            interval: Duration::from_nanos(nanos.max(1.0) as u64),
            next_slot: Arc::new(Mutex::new(None)),
        })
    }

    /// Spacing between admissions
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for admission.
    ///
    /// The slot is reserved under the lock and the sleep happens outside it,
    /// so a cancelled caller forfeits its slot without blocking others.
    pub async fn acquire(&self) {
        let requested = Instant::now();
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(at) if at > now => at,
                _ => now,
            };
            *next = Some(slot + self.interval);
            slot
        };
        sleep_until(slot).await;
        metrics::record_queue_wait(requested.elapsed());
    }
}

/// Rate limiter errors
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Rate is zero, negative or not a number
    #[error("invalid rate limit {0}: must be a positive, finite number of calls per second")]
    InvalidRate(f64),
}
