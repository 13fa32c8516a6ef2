//! End-to-end conviction pipeline.
//!
//! Runs a batch of candidates through the free tier, the velocity and
//! confidence scorer and the cost router, feeds observed market caps to the
//! bonding-curve tracker, and dispatches the routing plan to the expensive
//! analyzer. Alerts leave through an optional event channel.

use crate::oracle::bonding_curve::{
    BondingCurveTracker, CurveAlert, CurveSample, GraduationPrediction, StageProfile,
};
use crate::oracle::config::PipelineConfig;
use crate::oracle::cost_router::{ConvictionVerdict, CostRouter};
use crate::oracle::data_sources::{DeepAnalysis, DeepAnalyzer, SignalSource};
use crate::oracle::errors::{CurveError, ErrorKind};
use crate::oracle::free_tier::{FreeTierRouter, SourceFailure};
use crate::oracle::gateway::{RateLimitState, RequestGateway};
use crate::oracle::metrics::CallStatistics;
use crate::oracle::storage::CurveStorage;
use crate::oracle::types::{AnalysisDepth, ConvictionAlert, FusedTokenProfile, RoutingPlan};
use crate::oracle::velocity::VelocityScorer;
use crate::types::{Pubkey, TokenCandidate};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, instrument, warn};

/// Something downstream consumers should hear about.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Conviction(ConvictionAlert),
    Curve(CurveAlert),
}

/// Outcome of one expensive-analysis batch.
#[derive(Debug, Clone)]
pub struct DeepBatchResult {
    pub depth: AnalysisDepth,
    pub addresses: Vec<Pubkey>,
    pub analyses: Vec<DeepAnalysis>,
    pub error: Option<ErrorKind>,
}

/// Everything produced for one batch of candidates.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub verdicts: Vec<ConvictionVerdict>,
    pub alerts: Vec<ConvictionAlert>,
    pub curve_alerts: Vec<CurveAlert>,
    pub plan: RoutingPlan,
    pub deep_results: Vec<DeepBatchResult>,
    pub source_failures: Vec<SourceFailure>,
    /// Rejected by the allow/deny lists
    pub filtered: Vec<Pubkey>,
    pub alert_rate_percent: f64,
}

impl BatchReport {
    pub fn verdict(&self, address: &str) -> Option<&ConvictionVerdict> {
        self.verdicts.iter().find(|v| v.address == address)
    }
}

pub struct ConvictionPipeline {
    config: Arc<PipelineConfig>,
    gateway: Arc<RequestGateway>,
    free_tier: FreeTierRouter,
    velocity: VelocityScorer,
    router: CostRouter,
    curves: Mutex<BondingCurveTracker>,
    profile_cache: Cache<Pubkey, FusedTokenProfile>,
    stats: CallStatistics,
    analyzer: Option<Arc<dyn DeepAnalyzer>>,
    storage: Option<Arc<dyn CurveStorage>>,
    events: Option<mpsc::Sender<PipelineEvent>>,
}

impl ConvictionPipeline {
    pub fn new(
        config: PipelineConfig,
        gateway: Arc<RequestGateway>,
        sources: Vec<Arc<dyn SignalSource>>,
    ) -> Self {
        let config = Arc::new(config);
        let profile_cache = Cache::builder()
            .max_capacity(config.max_cache_entries as u64)
            .time_to_live(Duration::from_secs(config.cache_ttl_seconds))
            .build();

        info!(
            "Created conviction pipeline with {} signal sources, {} timeframes",
            sources.len(),
            config.timeframes.len()
        );

        Self {
            free_tier: FreeTierRouter::new(sources, config.clone()),
            velocity: VelocityScorer::new(&config),
            router: CostRouter::new(config.clone()),
            curves: Mutex::new(BondingCurveTracker::new(config.curve.clone())),
            stats: gateway.statistics().clone(),
            profile_cache,
            gateway,
            config,
            analyzer: None,
            storage: None,
            events: None,
        }
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn DeepAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn CurveStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_events(mut self, events: mpsc::Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn statistics(&self) -> &CallStatistics {
        &self.stats
    }

    pub async fn rate_limit_state(&self, endpoint: &str) -> RateLimitState {
        self.gateway.rate_limit_state(endpoint).await
    }

    /// Score, route and analyze one batch of candidates.
    ///
    /// Duplicate addresses are scored once. Sources or analyzer batches that
    /// fail are reported in the result and never abort the batch.
    #[instrument(skip(self, candidates), fields(count = candidates.len()))]
    pub async fn process_batch(&self, candidates: &[TokenCandidate]) -> BatchReport {
        let started = Instant::now();
        let mut report = BatchReport::default();

        let mut seen = HashSet::new();
        let mut admitted = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !self.config.filter.permits(&candidate.address) {
                debug!("Filtered out {}", candidate.address);
                report.filtered.push(candidate.address.clone());
            } else if seen.insert(candidate.address.clone()) {
                admitted.push(candidate.clone());
            }
        }
        if admitted.is_empty() {
            return report;
        }

        let free = self.free_tier.route(&admitted).await;
        report.source_failures = free.failures;

        let now = Utc::now();
        for ((mut profile, preliminary), candidate) in
            free.profiles.into_iter().zip(free.scores.iter()).zip(admitted.iter())
        {
            let velocity = self.velocity.score(&profile);
            let age = profile.age_minutes(now, candidate.first_seen);
            let confidence = self.velocity.assess_confidence(&profile, age);
            let reasons = self.velocity.reasons(&velocity, &confidence);
            let verdict = self
                .router
                .evaluate(&mut profile, preliminary, &velocity, &confidence, reasons);

            if let Some(market_cap) = profile.market_cap.measured() {
                match self.observe_market_cap(&profile.address, market_cap, now).await {
                    Ok(alerts) => report.curve_alerts.extend(alerts),
                    Err(e) => debug!("Curve sample for {} ignored: {}", profile.address, e),
                }
            }

            if verdict.is_alert {
                let alert = verdict.to_alert(now);
                info!(
                    address = %alert.address,
                    "Conviction alert {:.1} ({})",
                    alert.conviction_score,
                    alert.priority_tier.as_str()
                );
                self.emit(PipelineEvent::Conviction(alert.clone())).await;
                report.alerts.push(alert);
            }

            self.profile_cache.insert(profile.address.clone(), profile).await;
            report.verdicts.push(verdict);
        }

        report.plan = self.router.route(&report.verdicts);
        report.deep_results = self.dispatch(&report.plan).await;

        let scored = report.verdicts.len();
        report.alert_rate_percent = report.alerts.len() as f64 / scored as f64 * 100.0;
        if report.alert_rate_percent > self.config.target_alert_rate_percent {
            warn!(
                "Alert rate {:.1}% above target {:.1}% ({} of {})",
                report.alert_rate_percent,
                self.config.target_alert_rate_percent,
                report.alerts.len(),
                scored
            );
        }

        self.stats.add_to_counter("pipeline_tokens_scored_total", scored as u64).await;
        self.stats
            .add_to_counter("pipeline_alerts_total", report.alerts.len() as u64)
            .await;
        self.stats.set_gauge("pipeline_alert_rate_percent", report.alert_rate_percent).await;
        self.stats
            .set_gauge("pipeline_cost_saving_percent", report.plan.cost_saving_percent)
            .await;
        self.stats
            .set_gauge("pipeline_batch_seconds", started.elapsed().as_secs_f64())
            .await;

        info!(
            "Batch of {} scored in {}ms: {} alerts, {} routed, {:.1}% saved",
            scored,
            started.elapsed().as_millis(),
            report.alerts.len(),
            report.plan.routed_count(),
            report.plan.cost_saving_percent
        );
        report
    }

    /// Send every queued batch to the analyzer, deepest tier first, pausing
    /// each queue's delay between its batches.
    async fn dispatch(&self, plan: &RoutingPlan) -> Vec<DeepBatchResult> {
        let Some(analyzer) = &self.analyzer else {
            return Vec::new();
        };

        let mut results = Vec::new();
        for queue in &plan.queues {
            for (i, batch) in queue.batches.iter().enumerate() {
                if i > 0 && !queue.inter_batch_delay.is_zero() {
                    tokio::time::sleep(queue.inter_batch_delay).await;
                }
                let addresses: Vec<Pubkey> = batch.iter().cloned().collect();
                let result = match analyzer.analyze(queue.depth, batch).await {
                    Ok(analyses) => DeepBatchResult {
                        depth: queue.depth,
                        addresses,
                        analyses,
                        error: None,
                    },
                    Err(e) => {
                        warn!(
                            "{} analysis of {} tokens failed: {}",
                            queue.depth.as_str(),
                            addresses.len(),
                            e
                        );
                        self.stats.increment_counter("pipeline_deep_failures_total").await;
                        DeepBatchResult {
                            depth: queue.depth,
                            addresses,
                            analyses: Vec::new(),
                            error: Some(e.kind()),
                        }
                    }
                };
                results.push(result);
            }
        }
        results
    }

    /// Record a market-cap sample and forward any curve alerts.
    #[instrument(skip(self), fields(address = %address))]
    pub async fn observe_market_cap(
        &self,
        address: &str,
        market_cap: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<CurveAlert>, CurveError> {
        let alerts = {
            let mut curves = self.curves.lock().await;
            curves.track(address, market_cap, timestamp)?
        };

        if let Some(storage) = &self.storage {
            let sample = CurveSample {
                address: address.to_string(),
                timestamp,
                market_cap,
            };
            if let Err(e) = storage.save_sample(&sample).await {
                warn!("Failed to persist curve sample for {}: {:#}", address, e);
            } else if let Err(e) = storage.trim(address, self.config.curve.max_history).await {
                warn!("Failed to trim stored curve for {}: {:#}", address, e);
            }
        }

        for alert in &alerts {
            self.emit(PipelineEvent::Curve(alert.clone())).await;
        }
        Ok(alerts)
    }

    pub async fn predict_graduation(&self, address: &str) -> Option<GraduationPrediction> {
        self.curves.lock().await.predict_graduation(address)
    }

    /// Stage playbook for the configured trader profile.
    pub async fn stage_profile(&self, address: &str) -> Option<StageProfile> {
        self.curves
            .lock()
            .await
            .stage_profile(address, self.config.trader_profile)
    }

    pub async fn curve_history(&self, address: &str) -> Vec<CurveSample> {
        self.curves.lock().await.history(address)
    }

    /// Reload every stored curve history. Returns the number of addresses restored.
    pub async fn restore_curves(&self) -> Result<usize> {
        let Some(storage) = &self.storage else {
            return Ok(0);
        };
        let stored = storage
            .load_all()
            .await
            .context("Failed to load stored curve histories")?;

        let mut curves = self.curves.lock().await;
        let count = stored.len();
        for (address, samples) in stored {
            curves.restore(&address, samples);
        }
        info!("Restored {} curve histories", count);
        Ok(count)
    }

    /// Release graduated and stale curves, deleting their stored history.
    pub async fn prune_curves(&self, now: DateTime<Utc>) -> Vec<Pubkey> {
        let released = self.curves.lock().await.prune(now);
        if let Some(storage) = &self.storage {
            for address in &released {
                if let Err(e) = storage.delete(address).await {
                    warn!("Failed to delete stored curve for {}: {:#}", address, e);
                }
            }
        }
        released
    }

    /// Last fused profile for `address`, while it is still fresh.
    pub async fn cached_profile(&self, address: &str) -> Option<FusedTokenProfile> {
        let cached = self.profile_cache.get(address).await;
        let counter = if cached.is_some() {
            "pipeline_cache_hits_total"
        } else {
            "pipeline_cache_misses_total"
        };
        self.stats.increment_counter(counter).await;
        cached
    }

    /// Drain `receiver` in batches of up to `intake_batch_size` until every
    /// sender is dropped. Graduated and stale curves are released after each batch.
    #[instrument(skip(self, receiver))]
    pub async fn run(&self, mut receiver: mpsc::Receiver<TokenCandidate>) {
        info!("Starting conviction pipeline intake loop");
        let limit = self.config.intake_batch_size.max(1);

        while let Some(first) = receiver.recv().await {
            let mut batch = vec![first];
            while batch.len() < limit {
                match receiver.try_recv() {
                    Ok(candidate) => batch.push(candidate),
                    Err(_) => break,
                }
            }
            self.process_batch(&batch).await;
            self.prune_curves(Utc::now()).await;
        }

        info!("Conviction pipeline intake loop ended");
    }

    pub async fn shutdown(&self) {
        info!("Initiating conviction pipeline shutdown");
        let totals = self.stats.totals().await;
        info!(
            "Final call statistics - attempts: {}, successes: {}, failures: {}, rate limited: {}",
            totals.attempts, totals.successes, totals.failures, totals.rate_limited
        );
        info!(
            "Tokens scored: {}, alerts: {}, curves tracked: {}",
            self.stats.counter("pipeline_tokens_scored_total").await,
            self.stats.counter("pipeline_alerts_total").await,
            self.curves.lock().await.tracked_count()
        );
        self.profile_cache.invalidate_all();
        info!("Conviction pipeline shutdown complete");
    }

    async fn emit(&self, event: PipelineEvent) {
        if let Some(events) = &self.events {
            if events.send(event).await.is_err() {
                debug!("Event receiver dropped");
            }
        }
    }
}
