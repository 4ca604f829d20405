//! Rate limiting implementation
//!
//! Uses the governor crate with a burst of one, which turns the token bucket
//! into a minimum spacing between consecutive requests.

use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Minimum-interval rate limiter
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<Governor<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>,
    interval: Duration,
}

impl RateLimiter {
    /// Limiter allowing one request per `interval`; `None` for a zero interval
    pub fn with_interval(interval: Duration) -> Option<Self> {
        let quota = Quota::with_period(interval)?.allow_burst(NonZeroU32::MIN);
        Some(Self {
            limiter: Arc::new(Governor::direct(quota)),
            interval,
        })
    }

    /// Wait until the next request may be sent
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }

    /// Try to acquire a permit, returning immediately
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Configured spacing
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("interval", &self.interval)
            .finish()
    }
}
