//! Token-bucket rate limiting around governor.
//!
//! The bucket hands out at most `capacity` permits in any rolling
//! `refill_period`: every consumed permit returns to the bucket exactly one
//! period after it was taken. On top of that a governor pacer with a burst of
//! one enforces the minimum spacing between consecutive requests.

use crate::oracle::config::GatewayConfig;
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// Limits of one bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketLimits {
    /// Permits available per refill period
    pub capacity: u32,
    /// Rolling window a permit stays consumed
    pub refill_period: Duration,
    /// Minimum spacing between two permits
    pub min_interval: Duration,
}

impl BucketLimits {
    pub fn new(capacity: u32, refill_period: Duration, min_interval: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            refill_period,
            min_interval,
        }
    }
}

impl From<&GatewayConfig> for BucketLimits {
    fn from(config: &GatewayConfig) -> Self {
        BucketLimits::new(
            config.requests_per_minute,
            config.refill_period(),
            config.min_request_interval(),
        )
    }
}

/// Point-in-time view of a bucket.
#[derive(Debug, Clone)]
pub struct BucketSnapshot {
    pub remaining: u32,
    pub capacity: u32,
    /// When a consumed permit last returned to the bucket
    pub last_refill: Option<Instant>,
    /// When the last permit was handed out
    pub last_request: Option<Instant>,
}

#[derive(Debug, Default)]
struct BucketState {
    /// Consumption times of permits still inside the window, oldest first
    issued: VecDeque<Instant>,
    last_refill: Option<Instant>,
    last_request: Option<Instant>,
}

impl BucketState {
    fn expire(&mut self, now: Instant, period: Duration) {
        while let Some(&oldest) = self.issued.front() {
            let released = oldest + period;
            if released <= now {
                self.issued.pop_front();
                self.last_refill = Some(released);
            } else {
                break;
            }
        }
    }
}

/// Shared token bucket. Check-and-consume happens under one lock, so
/// concurrent callers never overdraw it.
pub struct TokenBucket {
    limits: BucketLimits,
    state: Mutex<BucketState>,
    /// Minimum-spacing pacer; absent when no spacing is required
    pacer: Option<DefaultDirectRateLimiter>,
    clock: DefaultClock,
}

impl TokenBucket {
    pub fn new(limits: BucketLimits) -> Self {
        let pacer = Quota::with_period(limits.min_interval).map(RateLimiter::direct);
        Self {
            limits,
            state: Mutex::new(BucketState::default()),
            pacer,
            clock: DefaultClock::default(),
        }
    }

    pub fn limits(&self) -> &BucketLimits {
        &self.limits
    }

    /// Wait until a permit is available and consume it.
    ///
    /// Returns how long the caller waited.
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Duration {
        let started = Instant::now();
        loop {
            match self.try_acquire() {
                Ok(()) => break,
                Err(wait) => {
                    debug!("Rate limit reached, waiting {:?}", wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
        started.elapsed()
    }

    /// Consume a permit if one is available right now, otherwise report the
    /// minimum time to wait before trying again.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut state = self.lock_state();
        let now = Instant::now();
        state.expire(now, self.limits.refill_period);

        if state.issued.len() >= self.limits.capacity as usize {
            let wait = state
                .issued
                .front()
                .map(|oldest| (*oldest + self.limits.refill_period).saturating_duration_since(now))
                .unwrap_or(self.limits.refill_period);
            return Err(wait.max(Duration::from_millis(1)));
        }

        if let Some(pacer) = &self.pacer {
            if let Err(not_until) = pacer.check() {
                let wait = not_until.wait_time_from(self.clock.now());
                return Err(wait.max(Duration::from_millis(1)));
            }
        }

        state.issued.push_back(now);
        state.last_request = Some(now);
        Ok(())
    }

    /// Current bucket state.
    pub fn snapshot(&self) -> BucketSnapshot {
        let mut state = self.lock_state();
        state.expire(Instant::now(), self.limits.refill_period);
        BucketSnapshot {
            remaining: self.limits.capacity.saturating_sub(state.issued.len() as u32),
            capacity: self.limits.capacity,
            last_refill: state.last_refill,
            last_request: state.last_request,
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, BucketState> {
        // A poisoned lock only means another caller panicked mid-update;
        // the queue of timestamps is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_limits_from_gateway_config() {
        let limits = BucketLimits::from(&GatewayConfig::default());
        assert_eq!(limits.capacity, 60);
        assert_eq!(limits.refill_period, Duration::from_secs(60));
        assert_eq!(limits.min_interval, Duration::from_millis(1500));
    }

    #[test]
    fn test_burst_up_to_capacity() {
        let bucket = TokenBucket::new(BucketLimits::new(5, Duration::from_secs(60), Duration::ZERO));

        for _ in 0..5 {
            assert!(bucket.try_acquire().is_ok());
        }
        let wait = bucket.try_acquire().unwrap_err();
        assert!(wait > Duration::from_secs(59));

        let snapshot = bucket.snapshot();
        assert_eq!(snapshot.remaining, 0);
        assert!(snapshot.last_request.is_some());
        assert!(snapshot.last_refill.is_none());
    }

    #[test]
    fn test_min_interval_blocks_second_request() {
        let bucket = TokenBucket::new(BucketLimits::new(
            10,
            Duration::from_secs(60),
            Duration::from_millis(500),
        ));

        assert!(bucket.try_acquire().is_ok());
        let wait = bucket.try_acquire().unwrap_err();
        assert!(wait > Duration::from_millis(400));
        assert!(wait <= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_permit_returns_after_period() {
        let bucket = TokenBucket::new(BucketLimits::new(
            2,
            Duration::from_millis(200),
            Duration::ZERO,
        ));

        bucket.acquire().await;
        bucket.acquire().await;
        let waited = bucket.acquire().await;

        assert!(waited >= Duration::from_millis(150));
        assert!(bucket.snapshot().last_refill.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_acquirers_never_overdraw() {
        let bucket = Arc::new(TokenBucket::new(BucketLimits::new(
            4,
            Duration::from_millis(300),
            Duration::ZERO,
        )));
        let started = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let bucket = bucket.clone();
            handles.push(tokio::spawn(async move {
                bucket.acquire().await;
                Instant::now()
            }));
        }

        let mut stamps = Vec::new();
        for handle in handles {
            stamps.push(handle.await.unwrap());
        }
        stamps.sort();

        // The second four must wait for the first four to return
        let immediate = stamps
            .iter()
            .filter(|t| t.duration_since(started) < Duration::from_millis(250))
            .count();
        assert_eq!(immediate, 4);
    }
}
