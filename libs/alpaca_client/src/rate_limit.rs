//! Rate limiter for the Alpaca API.
//!
//! Alpaca allows 200 requests per minute per account. Reads and writes get
//! separate buckets so a burst of quote polling can't starve order entry.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

type DirectLimiter = GovLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Dual rate limiter with separate buckets for reads and writes.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    read_limiter: Arc<DirectLimiter>,
    write_limiter: Arc<DirectLimiter>,
}

impl RateLimiter {
    /// Split the account-wide 200/min between reads and writes.
    pub fn new() -> Self {
        Self::with_limits(150, 50)
    }

    /// Create with custom per-minute limits. Zero is clamped to one.
    pub fn with_limits(reads_per_min: u32, writes_per_min: u32) -> Self {
        let read_quota = Quota::per_minute(NonZeroU32::new(reads_per_min.max(1)).unwrap_or(NonZeroU32::MIN));
        let write_quota = Quota::per_minute(NonZeroU32::new(writes_per_min.max(1)).unwrap_or(NonZeroU32::MIN));

        Self {
            read_limiter: Arc::new(GovLimiter::direct(read_quota)),
            write_limiter: Arc::new(GovLimiter::direct(write_quota)),
        }
    }

    /// Wait until a read slot is available.
    pub async fn wait_read(&self) {
        self.read_limiter.until_ready().await;
    }

    /// Wait until a write slot is available.
    pub async fn wait_write(&self) {
        self.write_limiter.until_ready().await;
    }

    /// Try to acquire a read slot without waiting. Returns true if acquired.
    pub fn try_read(&self) -> bool {
        self.read_limiter.check().is_ok()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_is_bounded() {
        let limiter = RateLimiter::with_limits(3, 1);
        assert!(limiter.try_read());
        assert!(limiter.try_read());
        assert!(limiter.try_read());
        assert!(!limiter.try_read(), "fourth read inside a minute should be refused");
    }

    #[test]
    fn test_zero_limit_is_clamped() {
        let limiter = RateLimiter::with_limits(0, 0);
        assert!(limiter.try_read());
    }
}
