//! Call statistics and pipeline counters.
//!
//! Aggregate and per-endpoint gateway statistics live behind one tokio
//! `RwLock`, alongside free-form named counters and gauges the pipeline uses
//! for its own bookkeeping.

use crate::oracle::errors::ErrorKind;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Number of recent outcomes kept per endpoint for the success rate.
const RECENT_WINDOW: usize = 100;

/// Counters for a set of calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallCounters {
    /// Individual attempts issued (retries included)
    pub attempts: u64,
    /// Calls that eventually succeeded
    pub successes: u64,
    /// Calls that eventually failed
    pub failures: u64,
    /// 429-class responses seen
    pub rate_limited: u64,
    /// Retries scheduled after a transient failure (timeouts and 5xx included)
    pub transient_retries: u64,
    /// Backoff waits performed
    pub backoffs: u64,
    /// Time spent waiting on the bucket and on backoff
    pub total_wait: Duration,
}

/// Health of a single endpoint.
#[derive(Debug, Clone)]
pub struct EndpointStats {
    pub counters: CallCounters,
    /// Success rate over the recent window
    pub success_rate: f64,
    pub consecutive_failures: u32,
    pub last_error: Option<ErrorKind>,
    pub last_failure: Option<Instant>,
    recent: VecDeque<bool>,
}

impl EndpointStats {
    fn new() -> Self {
        Self {
            counters: CallCounters::default(),
            success_rate: 1.0,
            consecutive_failures: 0,
            last_error: None,
            last_failure: None,
            recent: VecDeque::new(),
        }
    }

    fn record_outcome(&mut self, success: bool) {
        self.recent.push_back(success);
        while self.recent.len() > RECENT_WINDOW {
            self.recent.pop_front();
        }
        let successes = self.recent.iter().filter(|&&ok| ok).count();
        self.success_rate = successes as f64 / self.recent.len() as f64;
    }
}

/// Snapshot of all gateway statistics.
#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    pub totals: CallCounters,
    pub endpoints: HashMap<String, EndpointStats>,
}

#[derive(Debug, Default)]
struct InternalMetrics {
    totals: CallCounters,
    endpoints: HashMap<String, EndpointStats>,
    counters: HashMap<String, u64>,
    gauges: HashMap<String, f64>,
}

impl InternalMetrics {
    fn endpoint(&mut self, endpoint: &str) -> &mut EndpointStats {
        self.endpoints
            .entry(endpoint.to_string())
            .or_insert_with(EndpointStats::new)
    }
}

/// Shared statistics collector. Cloning shares the underlying storage.
#[derive(Debug, Clone, Default)]
pub struct CallStatistics {
    metrics: Arc<RwLock<InternalMetrics>>,
}

impl CallStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_attempt(&self, endpoint: &str) {
        let mut metrics = self.metrics.write().await;
        metrics.totals.attempts += 1;
        metrics.endpoint(endpoint).counters.attempts += 1;
    }

    #[instrument(skip(self), fields(endpoint = %endpoint))]
    pub async fn record_success(&self, endpoint: &str) {
        let mut metrics = self.metrics.write().await;
        metrics.totals.successes += 1;
        let stats = metrics.endpoint(endpoint);
        stats.counters.successes += 1;
        stats.consecutive_failures = 0;
        stats.record_outcome(true);
        debug!(
            "Endpoint {} success, {:.1}% recent success rate",
            endpoint,
            stats.success_rate * 100.0
        );
    }

    /// Record a call that gave up, either terminally or after exhausting retries.
    #[instrument(skip(self), fields(endpoint = %endpoint))]
    pub async fn record_failure(&self, endpoint: &str, kind: ErrorKind) {
        let mut metrics = self.metrics.write().await;
        metrics.totals.failures += 1;
        let stats = metrics.endpoint(endpoint);
        stats.counters.failures += 1;
        stats.consecutive_failures += 1;
        stats.last_error = Some(kind);
        stats.last_failure = Some(Instant::now());
        stats.record_outcome(false);
        debug!(
            "Endpoint {} failed ({}), {} consecutive failures",
            endpoint,
            kind.as_str(),
            stats.consecutive_failures
        );
    }

    /// Record a failed attempt that will be retried after `delay`.
    pub async fn record_retry(&self, endpoint: &str, kind: ErrorKind, delay: Duration) {
        let mut metrics = self.metrics.write().await;
        let InternalMetrics { totals, endpoints, .. } = &mut *metrics;
        let stats = endpoints
            .entry(endpoint.to_string())
            .or_insert_with(EndpointStats::new);
        for counters in [totals, &mut stats.counters] {
            if kind == ErrorKind::RateLimited {
                counters.rate_limited += 1;
            } else {
                counters.transient_retries += 1;
            }
            counters.backoffs += 1;
            counters.total_wait += delay;
        }
        stats.last_error = Some(kind);
    }

    /// Count a 429 that was not retried (attempts exhausted).
    pub async fn record_rate_limited(&self, endpoint: &str) {
        let mut metrics = self.metrics.write().await;
        metrics.totals.rate_limited += 1;
        metrics.endpoint(endpoint).counters.rate_limited += 1;
    }

    /// Record time spent waiting for a bucket permit.
    pub async fn record_wait(&self, endpoint: &str, waited: Duration) {
        if waited.is_zero() {
            return;
        }
        let mut metrics = self.metrics.write().await;
        metrics.totals.total_wait += waited;
        metrics.endpoint(endpoint).counters.total_wait += waited;
    }

    pub async fn totals(&self) -> CallCounters {
        self.metrics.read().await.totals.clone()
    }

    pub async fn endpoint(&self, endpoint: &str) -> Option<EndpointStats> {
        self.metrics.read().await.endpoints.get(endpoint).cloned()
    }

    pub async fn snapshot(&self) -> StatsSnapshot {
        let metrics = self.metrics.read().await;
        StatsSnapshot {
            totals: metrics.totals.clone(),
            endpoints: metrics.endpoints.clone(),
        }
    }

    /// Increment a named pipeline counter.
    #[instrument(skip(self), fields(metric = %name))]
    pub async fn increment_counter(&self, name: &str) {
        self.add_to_counter(name, 1).await;
    }

    pub async fn add_to_counter(&self, name: &str, amount: u64) {
        let mut metrics = self.metrics.write().await;
        *metrics.counters.entry(name.to_string()).or_insert(0) += amount;
    }

    pub async fn set_gauge(&self, name: &str, value: f64) {
        let mut metrics = self.metrics.write().await;
        metrics.gauges.insert(name.to_string(), value);
    }

    pub async fn counter(&self, name: &str) -> u64 {
        self.metrics.read().await.counters.get(name).copied().unwrap_or(0)
    }

    pub async fn gauge(&self, name: &str) -> Option<f64> {
        self.metrics.read().await.gauges.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_and_failure_counting() {
        let stats = CallStatistics::new();

        stats.record_attempt("profiles").await;
        stats.record_success("profiles").await;
        stats.record_attempt("profiles").await;
        stats.record_failure("profiles", ErrorKind::ClientError).await;

        let totals = stats.totals().await;
        assert_eq!(totals.attempts, 2);
        assert_eq!(totals.successes, 1);
        assert_eq!(totals.failures, 1);

        let endpoint = stats.endpoint("profiles").await.unwrap();
        assert!((endpoint.success_rate - 0.5).abs() < 1e-9);
        assert_eq!(endpoint.consecutive_failures, 1);
        assert_eq!(endpoint.last_error, Some(ErrorKind::ClientError));
    }

    #[tokio::test]
    async fn test_rate_limited_track_is_separate() {
        let stats = CallStatistics::new();

        stats
            .record_retry("boosts", ErrorKind::RateLimited, Duration::from_millis(100))
            .await;
        stats
            .record_retry("boosts", ErrorKind::Timeout, Duration::from_millis(50))
            .await;

        let endpoint = stats.endpoint("boosts").await.unwrap();
        assert_eq!(endpoint.counters.rate_limited, 1);
        assert_eq!(endpoint.counters.transient_retries, 1);
        assert_eq!(endpoint.counters.backoffs, 2);
        assert_eq!(endpoint.counters.total_wait, Duration::from_millis(150));
        assert_eq!(stats.totals().await.total_wait, Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_named_counters_and_gauges() {
        let stats = CallStatistics::new();

        stats.increment_counter("alerts_emitted").await;
        stats.add_to_counter("alerts_emitted", 2).await;
        stats.set_gauge("alert_rate_percent", 4.5).await;

        assert_eq!(stats.counter("alerts_emitted").await, 3);
        assert_eq!(stats.counter("missing").await, 0);
        assert_eq!(stats.gauge("alert_rate_percent").await, Some(4.5));
    }

    #[tokio::test]
    async fn test_recent_window_bounded() {
        let stats = CallStatistics::new();
        for _ in 0..150 {
            stats.record_failure("security", ErrorKind::ServerError).await;
        }
        for _ in 0..50 {
            stats.record_success("security").await;
        }
        let endpoint = stats.endpoint("security").await.unwrap();
        assert!((endpoint.success_rate - 0.5).abs() < 1e-9);
    }
}
