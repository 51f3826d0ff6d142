//! Request pacing
//!
//! Every navigation waits a random, human-scale delay first. A governor quota
//! caps the navigation rate on top of that in case delays are configured low.

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

use crate::infrastructure::config::HarvestConfig;

#[async_trait]
pub trait Pacer: Send + Sync {
    /// Wait until the next navigation may be issued
    async fn before_navigation(&self);
}

pub struct HumanPacer {
    min_delay: Duration,
    max_delay: Duration,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl HumanPacer {
    pub fn new(min_delay: Duration, max_delay: Duration, per_minute: NonZeroU32) -> Self {
        let (min_delay, max_delay) = if min_delay <= max_delay {
            (min_delay, max_delay)
        } else {
            (max_delay, min_delay)
        };
        Self {
            min_delay,
            max_delay,
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        }
    }

    pub fn from_config(config: &HarvestConfig) -> Self {
        let per_minute = NonZeroU32::new(config.max_navigations_per_minute).unwrap_or(NonZeroU32::MIN);
        Self::new(
            Duration::from_secs(config.min_delay_secs),
            Duration::from_secs(config.max_delay_secs),
            per_minute,
        )
    }

    /// Uniform draw from `[min_delay, max_delay]` at millisecond resolution
    pub fn next_delay(&self) -> Duration {
        let min = self.min_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        Duration::from_millis(fastrand::u64(min..=max))
    }
}

#[async_trait]
impl Pacer for HumanPacer {
    async fn before_navigation(&self) {
        let delay = self.next_delay();
        debug!("⏳ Waiting {:.1}s before next navigation", delay.as_secs_f64());
        tokio::time::sleep(delay).await;
        self.limiter.until_ready().await;
    }
}

/// No waiting at all; for tests and local fixtures
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediatePacer;

#[async_trait]
impl Pacer for ImmediatePacer {
    async fn before_navigation(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_within_bounds() {
        let pacer = HumanPacer::new(
            Duration::from_secs(20),
            Duration::from_secs(70),
            NonZeroU32::new(6).unwrap(),
        );
        for _ in 0..200 {
            let delay = pacer.next_delay();
            assert!(delay >= Duration::from_secs(20));
            assert!(delay <= Duration::from_secs(70));
        }
    }

    #[test]
    fn test_inverted_bounds_are_swapped() {
        let pacer = HumanPacer::new(
            Duration::from_secs(5),
            Duration::from_secs(1),
            NonZeroU32::new(60).unwrap(),
        );
        let delay = pacer.next_delay();
        assert!(delay >= Duration::from_secs(1) && delay <= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_zero_delay_pacer_passes_quota() {
        let pacer = HumanPacer::new(Duration::ZERO, Duration::ZERO, NonZeroU32::new(60).unwrap());
        // burst capacity equals the per-minute quota
        for _ in 0..3 {
            pacer.before_navigation().await;
        }
    }

    #[test]
    fn test_immediate_pacer_is_ready_at_once() {
        let pacer = ImmediatePacer;
        let mut wait = tokio_test::task::spawn(pacer.before_navigation());
        tokio_test::assert_ready!(wait.poll());
    }
}
