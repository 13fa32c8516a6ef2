//! Conviction oracle - tiered token scoring under a shared API budget.
//!
//! Cheap signal sources are fused into one profile per token, scored, and
//! only the promising tokens are routed to the expensive analysis provider.
//! Bonding-curve progress is tracked alongside for graduation timing.

pub mod bonding_curve;
pub mod config;
pub mod cost_router;
pub mod data_sources;
pub mod errors;
pub mod free_tier;
pub mod fusion;
pub mod gateway;
pub mod metrics;
pub mod pipeline;
pub mod rate_limit;
pub mod storage;
pub mod types;
pub mod velocity;

// Re-export the main entry points
pub use pipeline::{BatchReport, ConvictionPipeline, DeepBatchResult, PipelineEvent};
pub use config::{
    AddressFilter, CurveConfig, GatewayConfig, PipelineConfig, ScoringWeights, SourceEndpoints,
    TierThresholds,
};
pub use errors::{CallError, ConfigError, CurveError, ErrorKind};
pub use types::{
    AnalysisDepth, ConfidenceAssessment, ConfidenceLevel, ConvictionAlert, FusedTokenProfile,
    PriorityTier, Reading, RiskFlag, RoutingPlan, SourceKind, SourceRecord, TierQueue,
    TimeframeSeries, TraderProfile,
};

// Component re-exports for callers wiring their own pipeline
pub use bonding_curve::{
    BondingCurveTracker, CurveAlert, CurveAlertKind, CurveSample, CurveStage, CurveVelocity,
    GraduationLikelihood, GraduationPrediction, StageProfile,
};
pub use cost_router::{plan_routes, ConvictionVerdict, CostRouter};
pub use data_sources::{default_sources, DeepAnalysis, DeepAnalyzer, HttpDeepAnalyzer, SignalSource};
pub use free_tier::{FreeTierRouter, FreeTierScorer, PreliminaryScore, PreliminarySignals};
pub use fusion::{fuse_batch, fuse_profile};
pub use gateway::{CallOutcome, RateLimitState, RequestGateway};
pub use metrics::CallStatistics;
pub use rate_limit::{BucketLimits, TokenBucket};
pub use storage::{CurveStorage, SqliteCurveStore};
pub use velocity::{VelocityScore, VelocityScorer};

use anyhow::Context;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Pipeline builder for convenient construction with sensible defaults.
///
/// Without explicit sources the builder wires the standard HTTP sources; the
/// HTTP analyzer is wired only when an API key for it is configured.
pub struct PipelineBuilder {
    config: PipelineConfig,
    sources: Option<Vec<Arc<dyn SignalSource>>>,
    analyzer: Option<Arc<dyn DeepAnalyzer>>,
    storage: Option<Arc<dyn CurveStorage>>,
    events: Option<mpsc::Sender<PipelineEvent>>,
    statistics: Option<CallStatistics>,
}

impl PipelineBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self::from_config(PipelineConfig::default())
    }

    pub fn from_config(config: PipelineConfig) -> Self {
        Self {
            config,
            sources: None,
            analyzer: None,
            storage: None,
            events: None,
            statistics: None,
        }
    }

    /// Set the shared request budget.
    pub fn with_gateway(mut self, gateway: GatewayConfig) -> Self {
        self.config.gateway = gateway;
        self
    }

    /// Set free-tier signal weights.
    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.config.weights = weights;
        self
    }

    /// Set tier thresholds.
    pub fn with_thresholds(mut self, thresholds: TierThresholds) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    /// Set the alert and high-conviction thresholds.
    pub fn with_alert_thresholds(mut self, alert: f64, high_conviction: f64) -> Self {
        self.config.alert_score_threshold = alert;
        self.config.high_conviction_threshold = high_conviction;
        self
    }

    pub fn with_curve(mut self, curve: CurveConfig) -> Self {
        self.config.curve = curve;
        self
    }

    pub fn with_endpoints(mut self, endpoints: SourceEndpoints) -> Self {
        self.config.endpoints = endpoints;
        self
    }

    pub fn with_filter(mut self, filter: AddressFilter) -> Self {
        self.config.filter = filter;
        self
    }

    pub fn with_trader_profile(mut self, profile: TraderProfile) -> Self {
        self.config.trader_profile = profile;
        self
    }

    /// Set profile cache TTL in seconds.
    pub fn with_cache_ttl(mut self, ttl_seconds: u64) -> Self {
        self.config.cache_ttl_seconds = ttl_seconds;
        self
    }

    /// Set max cache entries.
    pub fn with_max_cache_entries(mut self, max_entries: usize) -> Self {
        self.config.max_cache_entries = max_entries;
        self
    }

    /// Replace the standard HTTP sources.
    pub fn with_sources(mut self, sources: Vec<Arc<dyn SignalSource>>) -> Self {
        self.sources = Some(sources);
        self
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

    /// Share call statistics with another component.
    pub fn with_statistics(mut self, statistics: CallStatistics) -> Self {
        self.statistics = Some(statistics);
        self
    }

    /// Build the pipeline configuration only.
    pub fn build_config(self) -> PipelineConfig {
        self.config
    }

    /// Validate the configuration and assemble the pipeline.
    pub fn build(self) -> anyhow::Result<ConvictionPipeline> {
        let config = self.config;
        config.validate().context("Invalid pipeline configuration")?;

        let gateway = Arc::new(RequestGateway::with_statistics(
            config.gateway.clone(),
            self.statistics.unwrap_or_default(),
        ));

        let client = Client::builder()
            .timeout(config.gateway.call_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        let sources = match self.sources {
            Some(sources) => sources,
            None => default_sources(gateway.clone(), client.clone(), &config),
        };

        let analyzer = self.analyzer.or_else(|| {
            config.endpoints.deep_analysis_api_key.as_ref().map(|_| {
                Arc::new(HttpDeepAnalyzer::new(
                    gateway.clone(),
                    client,
                    &config.endpoints,
                    config.expensive_batch_limit,
                )) as Arc<dyn DeepAnalyzer>
            })
        });

        let mut pipeline = ConvictionPipeline::new(config, gateway, sources);
        if let Some(analyzer) = analyzer {
            pipeline = pipeline.with_analyzer(analyzer);
        }
        if let Some(storage) = self.storage {
            pipeline = pipeline.with_storage(storage);
        }
        if let Some(events) = self.events {
            pipeline = pipeline.with_events(events);
        }
        Ok(pipeline)
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_rejects_invalid_config() {
        let result = PipelineBuilder::new()
            .with_thresholds(TierThresholds {
                critical: 30.0,
                high: 50.0,
                medium: 70.0,
            })
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_builder_applies_settings() {
        let pipeline = PipelineBuilder::new()
            .with_trader_profile(TraderProfile::Aggressive)
            .with_alert_thresholds(55.0, 65.0)
            .with_sources(Vec::new())
            .build()
            .unwrap();
        assert_eq!(pipeline.config().trader_profile, TraderProfile::Aggressive);
        assert_eq!(pipeline.config().alert_score_threshold, 55.0);
    }
}
