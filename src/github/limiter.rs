use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("rate limiter wait aborted")]
pub struct LimiterAborted;

/// Fixed-rate limiter allowing one call per `interval`, with a burst of one:
/// the first call proceeds immediately, each later call waits for its slot.
///
/// A zero interval never waits, which is what tests use.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
    cancel: CancellationToken,
}

impl RateLimiter {
    pub fn new(interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
            cancel,
        }
    }

    #[cfg(test)]
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO, CancellationToken::new())
    }

    /// Wait for the next slot. Returns `LimiterAborted` if the cancellation
    /// token fires before or during the wait.
    pub async fn acquire(&self) -> Result<(), LimiterAborted> {
        if self.cancel.is_cancelled() {
            return Err(LimiterAborted);
        }

        let slot = self.reserve();
        if slot <= Instant::now() {
            return Ok(());
        }

        tokio::select! {
            _ = tokio::time::sleep_until(slot) => Ok(()),
            _ = self.cancel.cancelled() => Err(LimiterAborted),
        }
    }

    /// Claim the earliest free slot and push the next one back by `interval`.
    fn reserve(&self) -> Instant {
        let now = Instant::now();
        let mut next = match self.next_slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let slot = next.map_or(now, |n| n.max(now));
        *next = Some(slot + self.interval);
        slot
    }
}
