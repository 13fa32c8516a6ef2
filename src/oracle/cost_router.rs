//! Final conviction score, tier assignment and batch planning.

use crate::oracle::config::PipelineConfig;
use crate::oracle::free_tier::PreliminaryScore;
use crate::oracle::types::{
    AnalysisDepth, ConfidenceAssessment, ConvictionAlert, FusedTokenProfile, PriorityTier, RoutingPlan,
    TierQueue,
};
use crate::oracle::velocity::VelocityScore;
use crate::types::Pubkey;
use chrono::{DateTime, Utc};
use nonempty::NonEmpty;
use std::sync::Arc;
use tracing::debug;

/// Split depth assignments into capped batches with pacing and cost figures.
///
/// Queues come out deepest first; skipped addresses keep their input order.
pub fn plan_routes(assignments: &[(Pubkey, AnalysisDepth)], config: &PipelineConfig) -> RoutingPlan {
    let sustained = config.gateway.sustained_interval();
    let mut plan = RoutingPlan::default();

    for depth in AnalysisDepth::billable() {
        let members: Vec<Pubkey> = assignments
            .iter()
            .filter(|(_, d)| *d == depth)
            .map(|(address, _)| address.clone())
            .collect();
        if members.is_empty() {
            continue;
        }
        let cap = config
            .batch_size_limits
            .for_depth(depth)
            .min(config.expensive_batch_limit)
            .max(1);
        plan.queues.push(TierQueue {
            depth,
            batch_size_cap: cap,
            batches: members.chunks(cap).filter_map(NonEmpty::from_slice).collect(),
            inter_batch_delay: sustained * depth.calls_per_batch(),
        });
    }

    plan.skipped = assignments
        .iter()
        .filter(|(_, d)| *d == AnalysisDepth::Skip)
        .map(|(address, _)| address.clone())
        .collect();

    plan.estimated_cost = assignments
        .iter()
        .map(|(_, depth)| config.pricing.cost_of(*depth))
        .sum();
    plan.baseline_cost = assignments.len() as f64 * config.pricing.comprehensive;
    plan.cost_saving_percent = if plan.baseline_cost > 0.0 {
        ((1.0 - plan.estimated_cost / plan.baseline_cost) * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };
    plan
}

/// Final verdict for one token.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvictionVerdict {
    pub address: Pubkey,
    pub preliminary_score: f64,
    pub velocity: VelocityScore,
    pub confidence: ConfidenceAssessment,
    /// 0-100
    pub conviction_score: f64,
    pub priority: PriorityTier,
    pub depth: AnalysisDepth,
    /// Alert threshold after the confidence adjustment
    pub alert_threshold: f64,
    pub is_alert: bool,
    pub is_high_conviction: bool,
    pub reasons: Vec<String>,
}

impl ConvictionVerdict {
    pub fn to_alert(&self, timestamp: DateTime<Utc>) -> ConvictionAlert {
        ConvictionAlert {
            address: self.address.clone(),
            conviction_score: self.conviction_score,
            priority_tier: self.priority,
            reasons: self.reasons.clone(),
            recommended_depth: self.depth,
            confidence: self.confidence.level,
            coverage: self.confidence.coverage,
            timestamp,
        }
    }
}

/// Blends the scores and routes on the confidence-adjusted thresholds.
pub struct CostRouter {
    config: Arc<PipelineConfig>,
}

impl CostRouter {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }

    /// clamp(w_p * preliminary + w_v * velocity * 100 * coverage, 0, 100)
    pub fn conviction_score(&self, preliminary: f64, velocity: f64, coverage: f64) -> f64 {
        let weights = &self.config.conviction;
        let preliminary = preliminary.clamp(0.0, 100.0);
        let velocity_points = velocity.clamp(0.0, 1.0) * 100.0 * coverage.clamp(0.0, 1.0);
        (weights.preliminary * preliminary + weights.velocity * velocity_points).clamp(0.0, 100.0)
    }

    /// Score one token and write the result back into its profile.
    ///
    /// The confidence multiplier scales the thresholds the score is compared
    /// against; the score itself stays within 0-100.
    pub fn evaluate(
        &self,
        profile: &mut FusedTokenProfile,
        preliminary: &PreliminaryScore,
        velocity: &VelocityScore,
        confidence: &ConfidenceAssessment,
        mut reasons: Vec<String>,
    ) -> ConvictionVerdict {
        let multiplier = confidence.threshold_multiplier;
        let score = self.conviction_score(preliminary.score, velocity.signal(), confidence.coverage);
        let priority = self.config.thresholds.scaled(multiplier).priority_for(score);
        let depth = priority.recommended_depth();
        let alert_threshold = self.config.alert_score_threshold * multiplier;
        let high_threshold = self.config.high_conviction_threshold * multiplier;

        profile.conviction_score = score;
        profile.analysis_tier = depth;

        let mut all_reasons = preliminary.reasons.clone();
        all_reasons.append(&mut reasons);
        all_reasons.push(format!(
            "conviction {:.1} vs alert threshold {:.1}",
            score, alert_threshold
        ));

        debug!(
            address = %profile.address,
            "conviction {:.1} (preliminary {:.1}, velocity {:.2}, coverage {:.2}, x{:.2}) -> {}",
            score,
            preliminary.score,
            velocity.score,
            confidence.coverage,
            multiplier,
            depth.as_str()
        );

        ConvictionVerdict {
            address: profile.address.clone(),
            preliminary_score: preliminary.score,
            velocity: velocity.clone(),
            confidence: confidence.clone(),
            conviction_score: score,
            priority,
            depth,
            alert_threshold,
            is_alert: score >= alert_threshold,
            is_high_conviction: score >= high_threshold,
            reasons: all_reasons,
        }
    }

    /// Per-tier queues for the expensive provider.
    pub fn route(&self, verdicts: &[ConvictionVerdict]) -> RoutingPlan {
        let assignments: Vec<(Pubkey, AnalysisDepth)> =
            verdicts.iter().map(|v| (v.address.clone(), v.depth)).collect();
        plan_routes(&assignments, &self.config)
    }
}
