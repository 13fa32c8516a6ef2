//! Multi-timeframe velocity score and coverage-based confidence.
//!
//! Timeframes are compared pairwise, each one against the next longer one,
//! using per-minute rates so windows of different length are comparable. A
//! comparison with a missing value or a zero denominator is skipped.

use crate::oracle::config::{ConfidenceConfig, PipelineConfig, VelocityConfig};
use crate::oracle::types::{ConfidenceAssessment, ConfidenceLevel, FusedTokenProfile, TimeframeSeries};
use crate::types::Timeframe;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Share of the momentum sub-score given to positive consistency.
const CONSISTENCY_SHARE: f64 = 0.6;
/// Share of the activity sub-score given to trade-rate growth.
const GROWTH_SHARE: f64 = 0.6;
/// Ratio at or above which a rate comparison counts as holding steady.
const STEADY_RATIO: f64 = 0.8;

/// Velocity score with its parts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityScore {
    pub volume: f64,
    pub momentum: f64,
    pub activity: f64,
    /// clamp(base + volume + momentum + activity, 0, 1)
    pub score: f64,
}

impl VelocityScore {
    /// Score counted toward conviction. The base offset alone is not movement.
    pub fn signal(&self) -> f64 {
        if self.volume == 0.0 && self.momentum == 0.0 && self.activity == 0.0 {
            0.0
        } else {
            self.score
        }
    }
}

/// Scores momentum across the configured timeframes.
#[derive(Debug, Clone)]
pub struct VelocityScorer {
    velocity: VelocityConfig,
    confidence: ConfidenceConfig,
    /// Shortest first
    timeframes: Vec<Timeframe>,
}

/// Per-minute rates of adjacent timeframe pairs where both values exist.
fn rate_pairs(series: &TimeframeSeries, timeframes: &[Timeframe]) -> Vec<(f64, f64)> {
    timeframes
        .windows(2)
        .filter_map(|pair| {
            let short = series.get(pair[0])? / pair[0].minutes();
            let long = series.get(pair[1])? / pair[1].minutes();
            Some((short, long))
        })
        .collect()
}

impl VelocityScorer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            velocity: config.velocity.clone(),
            confidence: config.confidence.clone(),
            timeframes: config.sorted_timeframes(),
        }
    }

    pub fn timeframes(&self) -> &[Timeframe] {
        &self.timeframes
    }

    /// Rewards volume rates that grow toward the short end.
    pub fn volume_acceleration(&self, profile: &FusedTokenProfile) -> f64 {
        let cfg = &self.velocity;
        let points: Vec<f64> = rate_pairs(&profile.volume, &self.timeframes)
            .into_iter()
            .filter(|(_, long)| *long > 0.0)
            .map(|(short, long)| {
                let ratio = short / long;
                if ratio >= cfg.strong_ratio {
                    1.0
                } else if ratio >= cfg.mild_ratio {
                    0.6
                } else if ratio >= STEADY_RATIO {
                    0.2
                } else if ratio < cfg.decline_ratio {
                    -0.5
                } else {
                    0.0
                }
            })
            .collect();
        if points.is_empty() {
            return 0.0;
        }
        let average = points.iter().sum::<f64>() / points.len() as f64;
        average * cfg.volume_max
    }

    /// Rewards positive price change that holds across timeframes and
    /// runs faster in the shorter ones.
    pub fn momentum_cascade(&self, profile: &FusedTokenProfile) -> f64 {
        let present: Vec<f64> = self
            .timeframes
            .iter()
            .filter_map(|tf| profile.price_change.get(*tf))
            .collect();
        if present.is_empty() {
            return 0.0;
        }
        let consistency = present.iter().filter(|c| **c > 0.0).count() as f64 / present.len() as f64;

        let pairs = rate_pairs(&profile.price_change, &self.timeframes);
        let accelerating = if pairs.is_empty() {
            0.0
        } else {
            pairs
                .iter()
                .filter(|(short, long)| *short > 0.0 && short > long)
                .count() as f64
                / pairs.len() as f64
        };

        (CONSISTENCY_SHARE * consistency + (1.0 - CONSISTENCY_SHARE) * accelerating)
            * self.velocity.momentum_max
    }

    /// Rewards trade-rate growth and a large crowd of unique traders.
    pub fn activity_surge(&self, profile: &FusedTokenProfile) -> f64 {
        let pairs: Vec<(f64, f64)> = rate_pairs(&profile.trades, &self.timeframes)
            .into_iter()
            .filter(|(_, long)| *long > 0.0)
            .collect();
        let growth = if pairs.is_empty() {
            0.0
        } else {
            pairs.iter().filter(|(short, long)| short > long).count() as f64 / pairs.len() as f64
        };
        let crowd = profile
            .unique_traders
            .measured()
            .map(|n| (n / self.velocity.unique_trader_baseline).clamp(0.0, 1.0))
            .unwrap_or(0.0);

        (GROWTH_SHARE * growth + (1.0 - GROWTH_SHARE) * crowd) * self.velocity.activity_max
    }

    pub fn score(&self, profile: &FusedTokenProfile) -> VelocityScore {
        let volume = self.volume_acceleration(profile);
        let momentum = self.momentum_cascade(profile);
        let activity = self.activity_surge(profile);
        let score = (self.velocity.base_offset + volume + momentum + activity).clamp(0.0, 1.0);
        debug!(
            address = %profile.address,
            "velocity {:.3} (volume {:.3}, momentum {:.3}, activity {:.3})",
            score, volume, momentum, activity
        );
        VelocityScore {
            volume,
            momentum,
            activity,
            score,
        }
    }

    /// Positive price change in one of the two shortest timeframes.
    fn has_short_momentum(&self, profile: &FusedTokenProfile) -> bool {
        self.timeframes
            .iter()
            .take(2)
            .any(|tf| profile.price_change.get(*tf).is_some_and(|c| c > 0.0))
    }

    /// Coverage bucket and threshold multiplier.
    ///
    /// `age_minutes` is `None` when neither a pair creation time nor a
    /// first-seen time is known; such tokens get neither the early bonus
    /// nor the mature penalty.
    pub fn assess_confidence(&self, profile: &FusedTokenProfile, age_minutes: Option<f64>) -> ConfidenceAssessment {
        let cfg = &self.confidence;
        let total = self.timeframes.len();
        let populated = self
            .timeframes
            .iter()
            .filter(|tf| profile.timeframe_populated(**tf))
            .count();
        let coverage = if total == 0 { 0.0 } else { populated as f64 / total as f64 };

        let early = age_minutes.is_some_and(|age| age < cfg.ultra_early_age_minutes)
            && self.has_short_momentum(profile);

        let (level, mut multiplier) = if early {
            (ConfidenceLevel::EarlyDetection, cfg.early_detection_multiplier)
        } else if coverage >= cfg.high_coverage {
            (ConfidenceLevel::High, cfg.high_multiplier)
        } else if coverage >= cfg.medium_coverage {
            (ConfidenceLevel::Medium, cfg.medium_multiplier)
        } else if coverage >= cfg.low_coverage {
            (ConfidenceLevel::Low, cfg.low_multiplier)
        } else {
            (ConfidenceLevel::VeryLow, cfg.very_low_multiplier)
        };

        let mature = age_minutes.is_some_and(|age| age > cfg.mature_age_minutes);
        if !early && mature && coverage < cfg.medium_coverage {
            multiplier = multiplier.max(cfg.mature_sparse_multiplier);
        }

        ConfidenceAssessment {
            coverage,
            populated,
            total,
            level,
            threshold_multiplier: multiplier,
        }
    }

    /// Human-readable notes on what drove the velocity score.
    pub fn reasons(&self, velocity: &VelocityScore, confidence: &ConfidenceAssessment) -> Vec<String> {
        let mut reasons = Vec::new();
        if velocity.volume >= self.velocity.volume_max * 0.5 {
            reasons.push("volume accelerating".to_string());
        } else if velocity.volume < 0.0 {
            reasons.push("volume declining".to_string());
        }
        if velocity.momentum >= self.velocity.momentum_max * 0.6 {
            reasons.push("momentum cascade".to_string());
        }
        if velocity.activity >= self.velocity.activity_max * 0.6 {
            reasons.push("activity surge".to_string());
        }
        match confidence.level {
            ConfidenceLevel::EarlyDetection => reasons.push("early detection".to_string()),
            level => reasons.push(format!(
                "{} confidence ({}/{} timeframes)",
                level.as_str(),
                confidence.populated,
                confidence.total
            )),
        }
        reasons
    }
}
