//! Rate-limited request gateway with bounded exponential backoff.
//!
//! Every outbound call goes through [`RequestGateway::execute`]. A call is
//! driven through an explicit retry state machine: ATTEMPT, then either DONE
//! or WAIT, and WAIT always leads back to ATTEMPT until the attempt budget is
//! spent. Rate-limited responses and transient failures back off on separate
//! tracks so one does not inflate the other's delay.

use crate::oracle::config::GatewayConfig;
use crate::oracle::errors::{CallError, ErrorKind};
use crate::oracle::metrics::{CallCounters, CallStatistics};
use crate::oracle::rate_limit::{BucketLimits, TokenBucket};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, instrument, warn};

/// Name of the bucket shared by endpoints without their own limits.
pub const SHARED_BUDGET: &str = "shared";

/// Tagged result of a gateway call. Never panics, never throws.
#[derive(Debug, Clone)]
pub struct CallOutcome<T> {
    pub endpoint: String,
    pub result: Result<T, CallError>,
    /// Attempts issued, first one included
    pub attempts: u32,
    /// Time spent waiting on permits and backoff
    pub waited: Duration,
}

impl<T> CallOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.result.as_ref().err().map(CallError::kind)
    }

    pub fn payload(self) -> Option<T> {
        self.result.ok()
    }
}

/// Rate limiter and statistics of one endpoint.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    pub remaining: u32,
    pub capacity: u32,
    pub last_refill: Option<Instant>,
    pub last_request: Option<Instant>,
    pub counters: CallCounters,
    pub success_rate: f64,
}

enum RetryState<T> {
    Attempt,
    Wait { delay: Duration, error: CallError },
    Done(Result<T, CallError>),
}

/// Shared gateway. Clone the `Arc` to share it between tasks.
pub struct RequestGateway {
    config: GatewayConfig,
    shared: Arc<TokenBucket>,
    dedicated: RwLock<HashMap<String, Arc<TokenBucket>>>,
    stats: CallStatistics,
}

impl RequestGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_statistics(config, CallStatistics::new())
    }

    pub fn with_statistics(config: GatewayConfig, stats: CallStatistics) -> Self {
        let shared = Arc::new(TokenBucket::new(BucketLimits::from(&config)));
        Self {
            config,
            shared,
            dedicated: RwLock::new(HashMap::new()),
            stats,
        }
    }

    /// Give `endpoint` its own bucket instead of the shared budget.
    pub fn with_endpoint_limits(self, endpoint: &str, limits: BucketLimits) -> Self {
        if let Ok(mut dedicated) = self.dedicated.write() {
            dedicated.insert(endpoint.to_string(), Arc::new(TokenBucket::new(limits)));
        }
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn statistics(&self) -> &CallStatistics {
        &self.stats
    }

    fn bucket_for(&self, endpoint: &str) -> Arc<TokenBucket> {
        self.dedicated
            .read()
            .ok()
            .and_then(|dedicated| dedicated.get(endpoint).cloned())
            .unwrap_or_else(|| self.shared.clone())
    }

    /// Block until `endpoint`'s bucket grants a permit. Returns the time waited.
    pub async fn acquire(&self, endpoint: &str) -> Duration {
        let waited = self.bucket_for(endpoint).acquire().await;
        if waited > self.config.min_request_interval() {
            debug!("Waited {:?} for a permit on {}", waited, endpoint);
        }
        self.stats.record_wait(endpoint, waited).await;
        waited
    }

    /// Run `call` under the rate limit, retrying retryable failures.
    ///
    /// `call` is invoked once per attempt, so it must build a fresh request
    /// each time.
    #[instrument(skip(self, call), fields(endpoint = %endpoint))]
    pub async fn execute<T, F, Fut>(&self, endpoint: &str, mut call: F) -> CallOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let max_attempts = self.config.max_retries.max(1);
        let call_timeout = self.config.call_timeout();
        let mut transient_track = self.backoff_track();
        let mut rate_limit_track = self.backoff_track();

        let mut attempts = 0u32;
        let mut waited = Duration::ZERO;
        let mut state = RetryState::Attempt;

        loop {
            state = match state {
                RetryState::Attempt => {
                    attempts += 1;
                    waited += self.acquire(endpoint).await;
                    self.stats.record_attempt(endpoint).await;

                    let result = match tokio::time::timeout(call_timeout, call()).await {
                        Ok(Err(CallError::Timeout(None))) | Err(_) => {
                            Err(CallError::Timeout(Some(call_timeout)))
                        }
                        Ok(result) => result,
                    };

                    match result {
                        Ok(payload) => RetryState::Done(Ok(payload)),
                        Err(error) if !error.is_retryable() => {
                            debug!("Terminal {} on {}: {}", error.kind().as_str(), endpoint, error);
                            RetryState::Done(Err(error))
                        }
                        Err(error) if attempts >= max_attempts => {
                            warn!(
                                "Giving up on {} after {} attempts: {}",
                                endpoint, attempts, error
                            );
                            if error.kind() == ErrorKind::RateLimited {
                                self.stats.record_rate_limited(endpoint).await;
                            }
                            RetryState::Done(Err(error))
                        }
                        Err(error) => {
                            let delay =
                                self.retry_delay(&error, &mut rate_limit_track, &mut transient_track);
                            RetryState::Wait { delay, error }
                        }
                    }
                }
                RetryState::Wait { delay, error } => {
                    warn!(
                        "Attempt {} on {} failed ({}), retrying in {:?}",
                        attempts,
                        endpoint,
                        error.kind().as_str(),
                        delay
                    );
                    self.stats.record_retry(endpoint, error.kind(), delay).await;
                    tokio::time::sleep(delay).await;
                    waited += delay;
                    RetryState::Attempt
                }
                RetryState::Done(result) => {
                    match &result {
                        Ok(_) => self.stats.record_success(endpoint).await,
                        Err(error) => self.stats.record_failure(endpoint, error.kind()).await,
                    }
                    return CallOutcome {
                        endpoint: endpoint.to_string(),
                        result,
                        attempts,
                        waited,
                    };
                }
            };
        }
    }

    /// Delays of base, 2x base, 4x base ... capped at the max delay.
    fn backoff_track(&self) -> ExponentialBackoff {
        let base_ms = self.config.base_backoff_delay_ms.max(2);
        ExponentialBackoff::from_millis(2)
            .factor(base_ms / 2)
            .max_delay(self.config.max_backoff_delay())
    }

    fn retry_delay(
        &self,
        error: &CallError,
        rate_limit_track: &mut ExponentialBackoff,
        transient_track: &mut ExponentialBackoff,
    ) -> Duration {
        let max = self.config.max_backoff_delay();
        match error {
            CallError::RateLimited { retry_after } => {
                let backoff = rate_limit_track.next().unwrap_or(max);
                retry_after.map_or(backoff, |hint| hint.max(backoff)).min(max)
            }
            _ => transient_track.next().unwrap_or(max).min(max),
        }
    }

    /// Bucket and statistics of `endpoint`.
    pub async fn rate_limit_state(&self, endpoint: &str) -> RateLimitState {
        let snapshot = self.bucket_for(endpoint).snapshot();
        let stats = self.stats.endpoint(endpoint).await;
        RateLimitState {
            remaining: snapshot.remaining,
            capacity: snapshot.capacity,
            last_refill: snapshot.last_refill,
            last_request: snapshot.last_request,
            counters: stats.as_ref().map(|s| s.counters.clone()).unwrap_or_default(),
            success_rate: stats.map(|s| s.success_rate).unwrap_or(1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn create_test_config() -> GatewayConfig {
        GatewayConfig {
            requests_per_minute: 1000,
            refill_period_ms: 60_000,
            min_request_interval_ms: 0,
            max_retries: 3,
            base_backoff_delay_ms: 10,
            max_backoff_delay_ms: 40,
            call_timeout_ms: 200,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let gateway = RequestGateway::new(create_test_config());
        let delays: Vec<Duration> = gateway.backoff_track().take(4).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(40),
                Duration::from_millis(40),
            ]
        );
    }

    #[test]
    fn test_retry_after_wins_when_longer() {
        let gateway = RequestGateway::new(create_test_config());
        let mut rate = gateway.backoff_track();
        let mut transient = gateway.backoff_track();

        let hinted = CallError::RateLimited {
            retry_after: Some(Duration::from_millis(30)),
        };
        assert_eq!(
            gateway.retry_delay(&hinted, &mut rate, &mut transient),
            Duration::from_millis(30)
        );

        let huge = CallError::RateLimited {
            retry_after: Some(Duration::from_secs(60)),
        };
        assert_eq!(
            gateway.retry_delay(&huge, &mut rate, &mut transient),
            Duration::from_millis(40)
        );

        // The transient track has not advanced
        let reset = CallError::NetworkTransient("reset".to_string());
        assert_eq!(
            gateway.retry_delay(&reset, &mut rate, &mut transient),
            Duration::from_millis(10)
        );
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let gateway = RequestGateway::new(create_test_config());
        let outcome = gateway
            .execute("market", || async { Ok::<_, CallError>(42) })
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.payload(), Some(42));
        assert_eq!(gateway.statistics().totals().await.successes, 1);
    }

    #[tokio::test]
    async fn test_client_timeout_reports_configured_deadline() {
        let gateway = RequestGateway::new(GatewayConfig {
            max_retries: 1,
            ..create_test_config()
        });
        let outcome: CallOutcome<()> = gateway
            .execute("security", || async { Err(CallError::Timeout(None)) })
            .await;

        assert_eq!(
            outcome.result,
            Err(CallError::Timeout(Some(Duration::from_millis(200))))
        );
        assert_eq!(
            CallError::Timeout(Some(Duration::from_millis(200))).to_string(),
            "call timed out after 200ms"
        );
        assert_eq!(CallError::Timeout(None).to_string(), "call timed out");
    }

    #[tokio::test]
    async fn test_transient_error_is_retried() {
        let gateway = RequestGateway::new(create_test_config());
        let calls = AtomicU32::new(0);

        let outcome = gateway
            .execute("market", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(CallError::ServerError { status: 503 })
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 2);
        let counters = gateway.statistics().totals().await;
        assert_eq!(counters.transient_retries, 1);
        assert_eq!(counters.rate_limited, 0);
    }

    #[tokio::test]
    async fn test_client_error_is_terminal() {
        let gateway = RequestGateway::new(create_test_config());
        let calls = AtomicU32::new(0);

        let outcome: CallOutcome<()> = gateway
            .execute("security", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(CallError::ClientError {
                        status: 404,
                        message: "Not Found".to_string(),
                    })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::ClientError));
        assert_eq!(gateway.statistics().totals().await.failures, 1);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let gateway = RequestGateway::new(create_test_config());
        let calls = AtomicU32::new(0);

        let outcome: CallOutcome<()> = gateway
            .execute("boosts", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(CallError::RateLimited { retry_after: None }) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::RateLimited));

        let state = gateway.rate_limit_state("boosts").await;
        assert_eq!(state.counters.rate_limited, 3);
        assert_eq!(state.counters.backoffs, 2);
        assert_eq!(state.counters.failures, 1);
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let gateway = RequestGateway::new(GatewayConfig {
            max_retries: 1,
            call_timeout_ms: 20,
            ..create_test_config()
        });

        let outcome: CallOutcome<()> = gateway
            .execute("liquidity", || async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(())
            })
            .await;

        assert_eq!(outcome.error_kind(), Some(ErrorKind::Timeout));
    }

    #[tokio::test]
    async fn test_dedicated_bucket_is_isolated() {
        let gateway = RequestGateway::new(create_test_config()).with_endpoint_limits(
            "deep",
            BucketLimits::new(1, Duration::from_secs(60), Duration::ZERO),
        );

        gateway.acquire("deep").await;
        assert_eq!(gateway.rate_limit_state("deep").await.remaining, 0);
        assert_eq!(gateway.rate_limit_state("market").await.remaining, 1000);
    }
}
