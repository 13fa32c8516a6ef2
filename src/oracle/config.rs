//! Pipeline configuration.
//!
//! Every tunable lives here as a named table so weights and thresholds can be
//! changed without touching scoring code. Loading from disk is left to the
//! caller; [`PipelineConfig::validate`] is the single fail-fast gate.

use crate::oracle::errors::ConfigError;
use crate::oracle::types::{AnalysisDepth, PriorityTier, TraderProfile};
use crate::types::Timeframe;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Complete pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Request gateway (rate limit + retry) settings
    pub gateway: GatewayConfig,
    /// Free-tier preliminary score weights
    pub weights: ScoringWeights,
    /// Domains raw signals are clamped to before scaling
    pub caps: SignalCaps,
    /// Priority tier thresholds on the 0-100 scale
    pub thresholds: TierThresholds,
    /// Per-depth batch size caps for expensive calls
    pub batch_size_limits: BatchSizeLimits,
    /// Per-depth analysis pricing (credits per token)
    pub pricing: TierPricing,
    /// Velocity sub-score caps
    pub velocity: VelocityConfig,
    /// Coverage buckets and threshold multipliers
    pub confidence: ConfidenceConfig,
    /// Blend of preliminary and velocity scores
    pub conviction: ConvictionWeights,
    /// Bonding-curve tracking
    pub curve: CurveConfig,
    /// Provider endpoints
    pub endpoints: SourceEndpoints,
    /// Known-address allow/deny lists
    pub filter: AddressFilter,
    /// Timeframes considered for coverage and velocity
    pub timeframes: Vec<Timeframe>,
    /// Score at which a token counts as high conviction
    pub high_conviction_threshold: f64,
    /// Score at which an alert is emitted (before confidence adjustment)
    pub alert_score_threshold: f64,
    /// Desired share of candidates that end up alerted
    pub target_alert_rate_percent: f64,
    /// Per-item liquidity lookups are capped to the first N addresses of a batch
    pub liquidity_item_cap: usize,
    /// Per-item security scans are capped the same way
    pub security_item_cap: usize,
    /// Maximum addresses in one comma-joined batch request
    pub expensive_batch_limit: usize,
    /// Fused profile cache TTL in seconds
    pub cache_ttl_seconds: u64,
    /// Maximum cached fused profiles
    pub max_cache_entries: usize,
    /// Candidates drained from the intake channel per batch
    pub intake_batch_size: usize,
    /// Position-sizing profile used for stage recommendations
    pub trader_profile: TraderProfile,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            weights: ScoringWeights::default(),
            caps: SignalCaps::default(),
            thresholds: TierThresholds::default(),
            batch_size_limits: BatchSizeLimits::default(),
            pricing: TierPricing::default(),
            velocity: VelocityConfig::default(),
            confidence: ConfidenceConfig::default(),
            conviction: ConvictionWeights::default(),
            curve: CurveConfig::default(),
            endpoints: SourceEndpoints::default(),
            filter: AddressFilter::default(),
            timeframes: Timeframe::all().to_vec(),
            high_conviction_threshold: 70.0,
            alert_score_threshold: 60.0,
            target_alert_rate_percent: 5.0,
            liquidity_item_cap: 20,
            security_item_cap: 20,
            expensive_batch_limit: 30,
            cache_ttl_seconds: 300,
            max_cache_entries: 1000,
            intake_batch_size: 50,
            trader_profile: TraderProfile::Balanced,
        }
    }
}

impl PipelineConfig {
    /// Validate every table. Called once when the pipeline is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gateway.validate()?;
        self.weights.validate()?;
        self.caps.validate()?;
        self.thresholds.validate()?;
        self.batch_size_limits.validate()?;
        self.velocity.validate()?;
        self.confidence.validate()?;
        self.conviction.validate()?;
        self.curve.validate()?;

        if self.timeframes.is_empty() {
            return Err(ConfigError::NoTimeframes);
        }
        let mut seen = HashSet::new();
        for tf in &self.timeframes {
            if !seen.insert(*tf) {
                return Err(ConfigError::DuplicateTimeframe(tf.to_string()));
            }
        }

        check_range("high_conviction_threshold", self.high_conviction_threshold, 0.0, 100.0)?;
        check_range("alert_score_threshold", self.alert_score_threshold, 0.0, 100.0)?;
        check_range("target_alert_rate_percent", self.target_alert_rate_percent, 0.0, 100.0)?;
        check_positive("liquidity_item_cap", self.liquidity_item_cap as f64)?;
        check_positive("security_item_cap", self.security_item_cap as f64)?;
        check_positive("expensive_batch_limit", self.expensive_batch_limit as f64)?;
        check_positive("max_cache_entries", self.max_cache_entries as f64)?;
        check_positive("intake_batch_size", self.intake_batch_size as f64)?;
        Ok(())
    }

    /// Configured timeframes, shortest first.
    pub fn sorted_timeframes(&self) -> Vec<Timeframe> {
        let mut tfs = self.timeframes.clone();
        tfs.sort();
        tfs
    }
}

/// Token bucket and retry settings for the request gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Bucket capacity per refill period
    pub requests_per_minute: u32,
    /// Refill period
    pub refill_period_ms: u64,
    /// Minimum spacing between two requests
    pub min_request_interval_ms: u64,
    /// Maximum attempts per call (first attempt included)
    pub max_retries: u32,
    /// First backoff delay
    pub base_backoff_delay_ms: u64,
    /// Backoff ceiling
    pub max_backoff_delay_ms: u64,
    /// Per-attempt timeout
    pub call_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            refill_period_ms: 60_000,
            min_request_interval_ms: 1500,
            max_retries: 3,
            base_backoff_delay_ms: 1000,
            max_backoff_delay_ms: 30_000,
            call_timeout_ms: 10_000,
        }
    }
}

impl GatewayConfig {
    pub fn refill_period(&self) -> Duration {
        Duration::from_millis(self.refill_period_ms)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    pub fn base_backoff_delay(&self) -> Duration {
        Duration::from_millis(self.base_backoff_delay_ms)
    }

    pub fn max_backoff_delay(&self) -> Duration {
        Duration::from_millis(self.max_backoff_delay_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Average spacing the bucket allows once its burst is spent.
    pub fn sustained_interval(&self) -> Duration {
        let per_token = self.refill_period() / self.requests_per_minute.max(1);
        per_token.max(self.min_request_interval())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check_positive("requests_per_minute", self.requests_per_minute as f64)?;
        check_positive("refill_period_ms", self.refill_period_ms as f64)?;
        check_positive("max_retries", self.max_retries as f64)?;
        check_positive("call_timeout_ms", self.call_timeout_ms as f64)?;
        if self.max_backoff_delay_ms < self.base_backoff_delay_ms {
            return Err(ConfigError::BackoffOrder);
        }
        Ok(())
    }
}

/// Weights of the free-tier preliminary score. They sum to the score ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub security: f64,
    pub social: f64,
    pub boost: f64,
    pub liquidity: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            security: 40.0,
            social: 25.0,
            boost: 20.0,
            liquidity: 15.0,
        }
    }
}

impl ScoringWeights {
    pub fn total(&self) -> f64 {
        self.security + self.social + self.boost + self.liquidity
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("weights.security", self.security),
            ("weights.social", self.social),
            ("weights.boost", self.boost),
            ("weights.liquidity", self.liquidity),
        ] {
            check_range(field, value, 0.0, 100.0)?;
        }
        check_range("weights.total", self.total(), f64::MIN_POSITIVE, 100.0)
    }
}

/// Upper bounds raw metrics are clamped to before linear scaling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalCaps {
    /// Security scores are reported on 0..security_max
    pub security_max: f64,
    /// Social scores are reported on 0..social_max
    pub social_max: f64,
    /// Boost activity is reported on 0..boost_max
    pub boost_max: f64,
    /// Liquidity at or above this earns the full liquidity weight
    pub liquidity_usd_cap: f64,
    /// Boost amount that maps to full boost activity
    pub boost_saturation: f64,
}

impl Default for SignalCaps {
    fn default() -> Self {
        Self {
            security_max: 100.0,
            social_max: 1.0,
            boost_max: 1.0,
            liquidity_usd_cap: 100_000.0,
            boost_saturation: 500.0,
        }
    }
}

impl SignalCaps {
    fn validate(&self) -> Result<(), ConfigError> {
        check_positive("caps.security_max", self.security_max)?;
        check_positive("caps.social_max", self.social_max)?;
        check_positive("caps.boost_max", self.boost_max)?;
        check_positive("caps.liquidity_usd_cap", self.liquidity_usd_cap)?;
        check_positive("caps.boost_saturation", self.boost_saturation)
    }
}

/// Score thresholds for the priority tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            critical: 70.0,
            high: 50.0,
            medium: 30.0,
        }
    }
}

impl TierThresholds {
    /// Map a 0-100 score to its priority tier.
    pub fn priority_for(&self, score: f64) -> PriorityTier {
        if score >= self.critical {
            PriorityTier::Critical
        } else if score >= self.high {
            PriorityTier::High
        } else if score >= self.medium {
            PriorityTier::Medium
        } else {
            PriorityTier::Low
        }
    }

    /// Thresholds multiplied by a confidence adjustment.
    pub fn scaled(&self, multiplier: f64) -> TierThresholds {
        TierThresholds {
            critical: self.critical * multiplier,
            high: self.high * multiplier,
            medium: self.medium * multiplier,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check_range("thresholds.critical", self.critical, 0.0, 100.0)?;
        if !(self.critical > self.high && self.high > self.medium && self.medium > 0.0) {
            return Err(ConfigError::ThresholdOrder);
        }
        Ok(())
    }
}

/// Maximum addresses per expensive batch, by analysis depth.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSizeLimits {
    pub comprehensive: usize,
    pub standard: usize,
    pub basic: usize,
}

impl Default for BatchSizeLimits {
    fn default() -> Self {
        Self {
            comprehensive: 10,
            standard: 20,
            basic: 30,
        }
    }
}

impl BatchSizeLimits {
    /// Batch cap for a depth; `Skip` never batches.
    pub fn for_depth(&self, depth: AnalysisDepth) -> usize {
        match depth {
            AnalysisDepth::Comprehensive => self.comprehensive,
            AnalysisDepth::Standard => self.standard,
            AnalysisDepth::Basic => self.basic,
            AnalysisDepth::Skip => 0,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check_positive("batch_size_limits.comprehensive", self.comprehensive as f64)?;
        check_positive("batch_size_limits.standard", self.standard as f64)?;
        check_positive("batch_size_limits.basic", self.basic as f64)
    }
}

/// Credits charged per token at each analysis depth.
///
/// Provider pricing changes independently of this code, so it is injected
/// rather than hardcoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierPricing {
    pub comprehensive: f64,
    pub standard: f64,
    pub basic: f64,
    pub skip: f64,
}

impl Default for TierPricing {
    fn default() -> Self {
        Self {
            comprehensive: 1.0,
            standard: 0.4,
            basic: 0.1,
            skip: 0.0,
        }
    }
}

impl TierPricing {
    pub fn cost_of(&self, depth: AnalysisDepth) -> f64 {
        match depth {
            AnalysisDepth::Comprehensive => self.comprehensive,
            AnalysisDepth::Standard => self.standard,
            AnalysisDepth::Basic => self.basic,
            AnalysisDepth::Skip => self.skip,
        }
    }
}

/// Caps and ratios for the velocity sub-scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityConfig {
    /// Constant added before the sub-scores
    pub base_offset: f64,
    /// Maximum volume-acceleration contribution
    pub volume_max: f64,
    /// Maximum momentum-cascade contribution
    pub momentum_max: f64,
    /// Maximum activity-surge contribution
    pub activity_max: f64,
    /// Unique traders that count as a full-strength crowd
    pub unique_trader_baseline: f64,
    /// Short/long rate ratio treated as strong acceleration
    pub strong_ratio: f64,
    /// Short/long rate ratio treated as mild acceleration
    pub mild_ratio: f64,
    /// Short/long rate ratio below which activity is declining
    pub decline_ratio: f64,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            base_offset: 0.10,
            volume_max: 0.30,
            momentum_max: 0.35,
            activity_max: 0.25,
            unique_trader_baseline: 50.0,
            strong_ratio: 2.0,
            mild_ratio: 1.2,
            decline_ratio: 0.5,
        }
    }
}

impl VelocityConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_range("velocity.base_offset", self.base_offset, 0.0, 1.0)?;
        check_range("velocity.volume_max", self.volume_max, 0.0, 1.0)?;
        check_range("velocity.momentum_max", self.momentum_max, 0.0, 1.0)?;
        check_range("velocity.activity_max", self.activity_max, 0.0, 1.0)?;
        check_positive("velocity.unique_trader_baseline", self.unique_trader_baseline)?;
        check_positive("velocity.decline_ratio", self.decline_ratio)?;
        if !(self.strong_ratio > self.mild_ratio && self.mild_ratio > self.decline_ratio) {
            return Err(ConfigError::OutOfRange {
                field: "velocity.mild_ratio",
                value: self.mild_ratio,
                min: self.decline_ratio,
                max: self.strong_ratio,
            });
        }
        Ok(())
    }
}

/// Coverage buckets, age thresholds and threshold multipliers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub high_coverage: f64,
    pub medium_coverage: f64,
    pub low_coverage: f64,
    pub high_multiplier: f64,
    pub medium_multiplier: f64,
    pub low_multiplier: f64,
    pub very_low_multiplier: f64,
    /// Tokens younger than this with live momentum are early detections
    pub ultra_early_age_minutes: f64,
    pub early_detection_multiplier: f64,
    /// Tokens older than this with sparse coverage are penalized
    pub mature_age_minutes: f64,
    pub mature_sparse_multiplier: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            high_coverage: 0.80,
            medium_coverage: 0.50,
            low_coverage: 0.25,
            high_multiplier: 0.95,
            medium_multiplier: 1.0,
            low_multiplier: 1.1,
            very_low_multiplier: 1.2,
            ultra_early_age_minutes: 30.0,
            early_detection_multiplier: 0.85,
            mature_age_minutes: 360.0,
            mature_sparse_multiplier: 1.3,
        }
    }
}

impl ConfidenceConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_range("confidence.high_coverage", self.high_coverage, 0.0, 1.0)?;
        check_range("confidence.medium_coverage", self.medium_coverage, 0.0, self.high_coverage)?;
        check_range("confidence.low_coverage", self.low_coverage, 0.0, self.medium_coverage)?;
        check_range("confidence.early_detection_multiplier", self.early_detection_multiplier, 0.0, 1.0)?;
        check_range("confidence.high_multiplier", self.high_multiplier, 0.0, 1.0)?;
        check_range("confidence.medium_multiplier", self.medium_multiplier, 1.0, f64::MAX)?;
        check_range("confidence.low_multiplier", self.low_multiplier, 1.0, f64::MAX)?;
        check_range("confidence.very_low_multiplier", self.very_low_multiplier, 1.0, f64::MAX)?;
        check_range("confidence.mature_sparse_multiplier", self.mature_sparse_multiplier, 1.2, f64::MAX)?;
        check_positive("confidence.mature_age_minutes", self.mature_age_minutes)?;
        Ok(())
    }
}

/// How the preliminary and velocity scores blend into conviction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvictionWeights {
    pub preliminary: f64,
    pub velocity: f64,
}

impl Default for ConvictionWeights {
    fn default() -> Self {
        Self {
            preliminary: 0.7,
            velocity: 0.3,
        }
    }
}

impl ConvictionWeights {
    fn validate(&self) -> Result<(), ConfigError> {
        check_range("conviction.preliminary", self.preliminary, 0.0, 1.0)?;
        check_range("conviction.velocity", self.velocity, 0.0, 1.0)?;
        check_range("conviction.total", self.preliminary + self.velocity, f64::MIN_POSITIVE, 1.0 + 1e-9)
    }
}

/// Bonding-curve tracker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveConfig {
    pub graduation_threshold_usd: f64,
    /// Samples kept per address; older ones are evicted
    pub max_history: usize,
    /// Default velocity lookback window
    pub lookback_minutes: i64,
    /// Fraction of the threshold that triggers the warning alert
    pub warning_fraction: f64,
    /// Fraction of the threshold that triggers the urgent alert
    pub urgent_fraction: f64,
    /// Velocity that triggers a spike alert
    pub velocity_spike_usd_per_hour: f64,
    /// Addresses without a sample for this long are released
    pub stale_after_minutes: i64,
    /// Samples in the window needed for full velocity confidence
    pub min_samples_full_confidence: usize,
}

impl Default for CurveConfig {
    fn default() -> Self {
        Self {
            graduation_threshold_usd: 69_000.0,
            max_history: 100,
            lookback_minutes: 60,
            warning_fraction: 0.80,
            urgent_fraction: 0.94,
            velocity_spike_usd_per_hour: 20_000.0,
            stale_after_minutes: 120,
            min_samples_full_confidence: 6,
        }
    }
}

impl CurveConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_positive("curve.graduation_threshold_usd", self.graduation_threshold_usd)?;
        check_positive("curve.max_history", self.max_history as f64)?;
        check_positive("curve.lookback_minutes", self.lookback_minutes as f64)?;
        check_positive("curve.stale_after_minutes", self.stale_after_minutes as f64)?;
        check_positive("curve.velocity_spike_usd_per_hour", self.velocity_spike_usd_per_hour)?;
        check_positive("curve.min_samples_full_confidence", self.min_samples_full_confidence as f64)?;
        if !(self.warning_fraction > 0.0
            && self.warning_fraction < self.urgent_fraction
            && self.urgent_fraction <= 1.0)
        {
            return Err(ConfigError::BoundaryOrder);
        }
        Ok(())
    }
}

/// Provider base URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceEndpoints {
    /// Batch market data, comma-joined addresses
    pub market_batch_url: String,
    /// Latest social/profile listings
    pub profiles_url: String,
    /// Latest boost/promotion listings
    pub boosts_url: String,
    /// Per-address pair/liquidity lookups
    pub liquidity_url: String,
    /// Per-address security scans
    pub security_url: String,
    /// Expensive batched analysis provider; sections are appended as paths
    pub deep_analysis_url: String,
    pub deep_analysis_api_key: Option<String>,
}

impl Default for SourceEndpoints {
    fn default() -> Self {
        Self {
            market_batch_url: "https://api.dexscreener.com/tokens/v1/solana".to_string(),
            profiles_url: "https://api.dexscreener.com/token-profiles/latest/v1".to_string(),
            boosts_url: "https://api.dexscreener.com/token-boosts/latest/v1".to_string(),
            liquidity_url: "https://api.dexscreener.com/latest/dex/tokens".to_string(),
            security_url: "https://api.rugcheck.xyz/v1/tokens".to_string(),
            deep_analysis_url: "https://public-api.birdeye.so/defi/v3/token".to_string(),
            deep_analysis_api_key: None,
        }
    }
}

/// Known-address allow/deny lists. Deny wins over allow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressFilter {
    /// When non-empty, only these addresses are evaluated
    pub allow: Vec<String>,
    /// Never evaluated
    pub deny: Vec<String>,
}

impl AddressFilter {
    pub fn permits(&self, address: &str) -> bool {
        if self.deny.iter().any(|a| a == address) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|a| a == address)
    }
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field })
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value, min, max })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.weights.total(), 100.0);
        assert_eq!(config.timeframes.len(), 6);
    }

    #[test]
    fn test_threshold_order_rejected() {
        let mut config = PipelineConfig::default();
        config.thresholds.high = 80.0;
        assert_eq!(config.validate(), Err(ConfigError::ThresholdOrder));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut config = PipelineConfig::default();
        config.weights.social = -1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "weights.social", .. })
        ));
    }

    #[test]
    fn test_duplicate_timeframe_rejected() {
        let mut config = PipelineConfig::default();
        config.timeframes = vec![Timeframe::M5, Timeframe::M5];
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateTimeframe(_))));
    }

    #[test]
    fn test_zero_item_cap_rejected() {
        let mut config = PipelineConfig::default();
        assert_eq!(config.security_item_cap, 20);
        config.security_item_cap = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::NotPositive { field: "security_item_cap" })
        );
    }

    #[test]
    fn test_curve_boundaries_rejected() {
        let mut config = PipelineConfig::default();
        config.curve.warning_fraction = 0.95;
        assert_eq!(config.validate(), Err(ConfigError::BoundaryOrder));
    }

    #[test]
    fn test_priority_mapping() {
        let thresholds = TierThresholds::default();
        assert_eq!(thresholds.priority_for(70.0), PriorityTier::Critical);
        assert_eq!(thresholds.priority_for(69.9), PriorityTier::High);
        assert_eq!(thresholds.priority_for(30.0), PriorityTier::Medium);
        assert_eq!(thresholds.priority_for(0.0), PriorityTier::Low);

        let strict = thresholds.scaled(1.2);
        assert_eq!(strict.priority_for(70.0), PriorityTier::High);
    }

    #[test]
    fn test_address_filter() {
        let filter = AddressFilter {
            allow: vec![],
            deny: vec!["Bad".to_string()],
        };
        assert!(filter.permits("Good"));
        assert!(!filter.permits("Bad"));

        let filter = AddressFilter {
            allow: vec!["Only".to_string(), "Bad".to_string()],
            deny: vec!["Bad".to_string()],
        };
        assert!(filter.permits("Only"));
        assert!(!filter.permits("Other"));
        assert!(!filter.permits("Bad"));
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let json = r#"{ "high_conviction_threshold": 80.0, "gateway": { "max_retries": 5 } }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.high_conviction_threshold, 80.0);
        assert_eq!(config.gateway.max_retries, 5);
        assert_eq!(config.gateway.requests_per_minute, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sustained_interval_uses_slower_limit() {
        let gateway = GatewayConfig::default();
        // 60 per 60s is 1s per token, but the 1.5s spacing is slower
        assert_eq!(gateway.sustained_interval(), Duration::from_millis(1500));
    }
}
