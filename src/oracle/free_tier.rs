//! Free-tier router: concurrent cheap lookups, preliminary score, routing.

use crate::oracle::config::{PipelineConfig, ScoringWeights, SignalCaps, TierThresholds};
use crate::oracle::cost_router::plan_routes;
use crate::oracle::data_sources::SignalSource;
use crate::oracle::errors::ErrorKind;
use crate::oracle::fusion::fuse_batch;
use crate::oracle::types::{
    AnalysisDepth, FusedTokenProfile, PriorityTier, Reading, RiskFlag, RoutingPlan, SourceKind,
    SourceRecord,
};
use crate::types::{Pubkey, TokenCandidate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Raw inputs of the preliminary score.
#[derive(Debug, Clone, PartialEq)]
pub struct PreliminarySignals {
    pub security: Reading<f64>,
    pub risk_flag: RiskFlag,
    pub social: Reading<f64>,
    /// 0..=boost_max
    pub boost_activity: Reading<f64>,
    pub liquidity_usd: Reading<f64>,
}

impl PreliminarySignals {
    pub fn from_profile(profile: &FusedTokenProfile, caps: &SignalCaps) -> Self {
        let boost_activity = match profile.boost_amount {
            Reading::Measured(amount) => Reading::Measured(amount / caps.boost_saturation * caps.boost_max),
            Reading::Absent => Reading::Absent,
        };
        Self {
            security: profile.security_score,
            risk_flag: profile.risk_flag,
            social: profile.social_score,
            boost_activity,
            liquidity_usd: profile.liquidity_usd,
        }
    }
}

/// Weighted contribution of each signal, in score points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub security: f64,
    pub social: f64,
    pub boost: f64,
    pub liquidity: f64,
}

impl ScoreComponents {
    pub fn total(&self) -> f64 {
        self.security + self.social + self.boost + self.liquidity
    }
}

/// Preliminary verdict for one token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreliminaryScore {
    pub address: Pubkey,
    /// 0-100
    pub score: f64,
    pub components: ScoreComponents,
    pub priority: PriorityTier,
    pub depth: AnalysisDepth,
    pub reasons: Vec<String>,
}

/// Weighted sum of clamped, linearly scaled signals.
#[derive(Debug, Clone)]
pub struct FreeTierScorer {
    weights: ScoringWeights,
    caps: SignalCaps,
    thresholds: TierThresholds,
}

/// Scale `value` from `0..=cap` to `0..=weight`, clamping first.
fn scaled(value: Reading<f64>, cap: f64, weight: f64) -> f64 {
    value.value_or_zero().clamp(0.0, cap) / cap * weight
}

impl FreeTierScorer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            weights: config.weights.clone(),
            caps: config.caps.clone(),
            thresholds: config.thresholds.clone(),
        }
    }

    pub fn caps(&self) -> &SignalCaps {
        &self.caps
    }

    pub fn thresholds(&self) -> &TierThresholds {
        &self.thresholds
    }

    pub fn components(&self, signals: &PreliminarySignals) -> ScoreComponents {
        // A dangerous scan forfeits the whole security weight
        let security = if signals.risk_flag == RiskFlag::Risky {
            0.0
        } else {
            scaled(signals.security, self.caps.security_max, self.weights.security)
        };
        ScoreComponents {
            security,
            social: scaled(signals.social, self.caps.social_max, self.weights.social),
            boost: scaled(signals.boost_activity, self.caps.boost_max, self.weights.boost),
            liquidity: scaled(signals.liquidity_usd, self.caps.liquidity_usd_cap, self.weights.liquidity),
        }
    }

    pub fn score(&self, address: &str, signals: &PreliminarySignals) -> PreliminaryScore {
        let components = self.components(signals);
        let score = components.total().clamp(0.0, 100.0);
        let priority = self.thresholds.priority_for(score);
        PreliminaryScore {
            address: address.to_string(),
            score,
            reasons: self.reasons(signals, &components),
            components,
            priority,
            depth: priority.recommended_depth(),
        }
    }

    fn reasons(&self, signals: &PreliminarySignals, components: &ScoreComponents) -> Vec<String> {
        let mut reasons = Vec::new();
        let strong = |points: f64, weight: f64| weight > 0.0 && points >= weight * 0.7;

        if signals.risk_flag == RiskFlag::Risky {
            reasons.push("security scan flagged risks".to_string());
        } else if strong(components.security, self.weights.security) {
            reasons.push(format!("strong security ({:.0})", signals.security.value_or_zero()));
        }
        if strong(components.social, self.weights.social) {
            reasons.push("strong social presence".to_string());
        }
        if strong(components.boost, self.weights.boost) {
            reasons.push("active promotion".to_string());
        }
        if strong(components.liquidity, self.weights.liquidity) {
            reasons.push(format!(
                "healthy liquidity (${:.0})",
                signals.liquidity_usd.value_or_zero()
            ));
        }
        for (name, reading) in [
            ("security", signals.security),
            ("social", signals.social),
            ("liquidity", signals.liquidity_usd),
        ] {
            if !reading.is_measured() {
                reasons.push(format!("{} not measured", name));
            }
        }
        reasons
    }
}

/// A source that returned nothing for a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFailure {
    pub kind: SourceKind,
    pub error: Option<ErrorKind>,
}

/// Result of routing one batch through the free tier.
#[derive(Debug, Clone)]
pub struct FreeTierReport {
    /// One per candidate, carrying the preliminary score and depth
    pub profiles: Vec<FusedTokenProfile>,
    pub scores: Vec<PreliminaryScore>,
    pub plan: RoutingPlan,
    pub failures: Vec<SourceFailure>,
}

/// Queries every free source concurrently and routes the batch.
pub struct FreeTierRouter {
    sources: Vec<Arc<dyn SignalSource>>,
    scorer: FreeTierScorer,
    config: Arc<PipelineConfig>,
}

impl FreeTierRouter {
    pub fn new(sources: Vec<Arc<dyn SignalSource>>, config: Arc<PipelineConfig>) -> Self {
        Self {
            sources,
            scorer: FreeTierScorer::new(&config),
            config,
        }
    }

    pub fn scorer(&self) -> &FreeTierScorer {
        &self.scorer
    }

    /// Fetch from every source at once. A failing source contributes no
    /// records and is reported, it never fails the batch.
    #[instrument(skip(self, addresses), fields(count = addresses.len()))]
    pub async fn collect(&self, addresses: &[Pubkey]) -> (Vec<SourceRecord>, Vec<SourceFailure>) {
        let mut tasks = JoinSet::new();
        for source in &self.sources {
            let source = source.clone();
            let addresses = addresses.to_vec();
            tasks.spawn(async move {
                let kind = source.kind();
                (kind, source.fetch(&addresses).await)
            });
        }

        let mut records = Vec::new();
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((kind, Ok(batch))) => {
                    debug!("{} returned {} records", kind.as_str(), batch.len());
                    records.extend(batch);
                }
                Ok((kind, Err(e))) => {
                    warn!("Source {} unavailable for this batch: {}", kind.as_str(), e);
                    failures.push(SourceFailure {
                        kind,
                        error: Some(e.kind()),
                    });
                }
                Err(e) => {
                    warn!("Source task aborted: {}", e);
                }
            }
        }
        (records, failures)
    }

    /// Score and route a batch of candidates.
    #[instrument(skip(self, candidates), fields(count = candidates.len()))]
    pub async fn route(&self, candidates: &[TokenCandidate]) -> FreeTierReport {
        let addresses: Vec<Pubkey> = candidates.iter().map(|c| c.address.clone()).collect();
        let (records, failures) = self.collect(&addresses).await;

        let mut profiles = fuse_batch(candidates, &records);
        let mut scores = Vec::with_capacity(profiles.len());
        for profile in &mut profiles {
            let signals = PreliminarySignals::from_profile(profile, self.scorer.caps());
            let score = self.scorer.score(&profile.address, &signals);
            profile.conviction_score = score.score;
            profile.analysis_tier = score.depth;
            scores.push(score);
        }

        let assignments: Vec<(Pubkey, AnalysisDepth)> =
            scores.iter().map(|s| (s.address.clone(), s.depth)).collect();
        let plan = plan_routes(&assignments, &self.config);

        info!(
            "Free tier routed {} tokens ({} skipped), estimated saving {:.1}%",
            plan.routed_count(),
            plan.skipped.len(),
            plan.cost_saving_percent
        );

        FreeTierReport {
            profiles,
            scores,
            plan,
            failures,
        }
    }
}
