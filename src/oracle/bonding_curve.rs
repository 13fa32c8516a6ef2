//! Bonding-curve progression tracking and graduation prediction.
//!
//! Each address owns a bounded, time-ordered market-cap history. Velocity is
//! the first-to-last change over a lookback window, acceleration compares the
//! two halves of that window, and graduation timing extrapolates from both.

use crate::oracle::config::CurveConfig;
use crate::oracle::errors::CurveError;
use crate::oracle::types::TraderProfile;
use crate::types::Pubkey;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

/// Upper progress bound of every stage but the last, as a fraction of the
/// graduation threshold.
const STAGE_BOUNDS: [f64; 6] = [0.10, 0.25, 0.45, 0.65, 0.80, 0.94];

/// Hour limits for IMMINENT, LIKELY and POSSIBLE.
const IMMINENT_HOURS: f64 = 1.0;
const LIKELY_HOURS: f64 = 6.0;
const POSSIBLE_HOURS: f64 = 24.0;

/// Acceleration can shorten or stretch a prediction by at most this share.
const MAX_ACCELERATION_ADJUSTMENT: f64 = 0.5;

/// One market-cap observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveSample {
    pub address: Pubkey,
    pub timestamp: DateTime<Utc>,
    pub market_cap: f64,
}

/// Market-cap change rate over a window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CurveVelocity {
    pub usd_per_hour: f64,
    /// 0..=1, grows with the number of samples in the window
    pub confidence: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GraduationLikelihood {
    Graduated,
    Imminent,
    Likely,
    Possible,
    Unlikely,
    Stalled,
}

impl GraduationLikelihood {
    fn from_hours(hours: f64) -> Self {
        if hours <= IMMINENT_HOURS {
            GraduationLikelihood::Imminent
        } else if hours <= LIKELY_HOURS {
            GraduationLikelihood::Likely
        } else if hours <= POSSIBLE_HOURS {
            GraduationLikelihood::Possible
        } else {
            GraduationLikelihood::Unlikely
        }
    }
}

/// Named progress stages, launch to imminent graduation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveStage {
    Launch,
    Momentum,
    Growth,
    Expansion,
    Maturation,
    PreGraduation,
    Imminent,
}

impl CurveStage {
    const ALL: [CurveStage; 7] = [
        CurveStage::Launch,
        CurveStage::Momentum,
        CurveStage::Growth,
        CurveStage::Expansion,
        CurveStage::Maturation,
        CurveStage::PreGraduation,
        CurveStage::Imminent,
    ];

    /// Stage of a progress fraction (market cap / graduation threshold).
    pub fn from_progress(progress: f64) -> Self {
        STAGE_BOUNDS
            .iter()
            .position(|bound| progress < *bound)
            .map(|i| CurveStage::ALL[i])
            .unwrap_or(CurveStage::Imminent)
    }

    pub fn profit_potential(&self) -> &'static str {
        match self {
            CurveStage::Launch => "very high",
            CurveStage::Momentum | CurveStage::Growth => "high",
            CurveStage::Expansion | CurveStage::Maturation => "moderate",
            CurveStage::PreGraduation => "low",
            CurveStage::Imminent => "minimal",
        }
    }

    pub fn risk_level(&self) -> &'static str {
        match self {
            CurveStage::Launch => "extreme",
            CurveStage::Momentum => "very high",
            CurveStage::Growth => "high",
            CurveStage::Expansion | CurveStage::Maturation => "moderate",
            CurveStage::PreGraduation | CurveStage::Imminent => "low",
        }
    }

    /// Recommended position size, percent of bankroll.
    pub fn position_size_percent(&self, profile: TraderProfile) -> f64 {
        // launch, momentum, growth, expansion, maturation, pre-graduation, imminent
        let table: [f64; 7] = match profile {
            TraderProfile::Conservative => [0.5, 1.0, 1.5, 1.0, 0.5, 0.25, 0.0],
            TraderProfile::Balanced => [1.0, 2.0, 3.0, 2.0, 1.0, 0.5, 0.25],
            TraderProfile::Aggressive => [2.0, 4.0, 5.0, 4.0, 2.0, 1.0, 0.5],
        };
        table[*self as usize]
    }
}

/// Stage playbook entry for one trader profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageProfile {
    pub stage: CurveStage,
    pub profit_potential: String,
    pub risk_level: String,
    pub position_size_percent: f64,
}

impl StageProfile {
    pub fn new(stage: CurveStage, profile: TraderProfile) -> Self {
        Self {
            stage,
            profit_potential: stage.profit_potential().to_string(),
            risk_level: stage.risk_level().to_string(),
            position_size_percent: stage.position_size_percent(profile),
        }
    }
}

/// Graduation forecast for one address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraduationPrediction {
    pub address: Pubkey,
    pub current_market_cap: f64,
    pub remaining_usd: f64,
    /// Fraction of the threshold reached
    pub progress: f64,
    pub velocity: CurveVelocity,
    pub acceleration: Option<f64>,
    /// 0 once graduated, infinite when stalled
    pub predicted_hours: f64,
    pub likelihood: GraduationLikelihood,
    pub stage: CurveStage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveAlertKind {
    /// Crossed the warning boundary
    Approaching,
    /// Crossed the urgent boundary
    Urgent,
    VelocitySpike,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertUrgency {
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveAlert {
    pub address: Pubkey,
    pub kind: CurveAlertKind,
    pub urgency: AlertUrgency,
    pub market_cap: f64,
    pub progress: f64,
    pub velocity_usd_per_hour: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Boundary {
    Warning,
    Urgent,
}

#[derive(Debug, Default)]
struct CurveHistory {
    samples: VecDeque<CurveSample>,
    /// Highest boundary already alerted; never alerted twice
    alerted: Option<Boundary>,
    spiking: bool,
    graduated: bool,
}

impl CurveHistory {
    fn last(&self) -> Option<&CurveSample> {
        self.samples.back()
    }

    /// Samples within `lookback` of the newest one, oldest first.
    fn window(&self, lookback: ChronoDuration) -> Vec<&CurveSample> {
        let Some(last) = self.last() else {
            return Vec::new();
        };
        let start = last.timestamp - lookback;
        self.samples.iter().filter(|s| s.timestamp >= start).collect()
    }
}

/// Change per hour between the first and last sample; zero over a zero span.
fn rate_per_hour(first: &CurveSample, last: &CurveSample) -> f64 {
    let hours = (last.timestamp - first.timestamp).num_milliseconds() as f64 / 3_600_000.0;
    if hours <= 0.0 {
        0.0
    } else {
        (last.market_cap - first.market_cap) / hours
    }
}

/// Tracks every address under observation.
pub struct BondingCurveTracker {
    config: CurveConfig,
    histories: HashMap<Pubkey, CurveHistory>,
}

impl BondingCurveTracker {
    pub fn new(config: CurveConfig) -> Self {
        Self {
            config,
            histories: HashMap::new(),
        }
    }

    pub fn config(&self) -> &CurveConfig {
        &self.config
    }

    pub fn default_lookback(&self) -> ChronoDuration {
        ChronoDuration::minutes(self.config.lookback_minutes)
    }

    pub fn tracked_count(&self) -> usize {
        self.histories.len()
    }

    pub fn is_tracked(&self, address: &str) -> bool {
        self.histories.contains_key(address)
    }

    pub fn history(&self, address: &str) -> Vec<CurveSample> {
        self.histories
            .get(address)
            .map(|h| h.samples.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn progress(&self, market_cap: f64) -> f64 {
        market_cap / self.config.graduation_threshold_usd
    }

    fn boundary_for(&self, progress: f64) -> Option<Boundary> {
        if progress >= self.config.urgent_fraction {
            Some(Boundary::Urgent)
        } else if progress >= self.config.warning_fraction {
            Some(Boundary::Warning)
        } else {
            None
        }
    }

    /// Append a sample and return any alerts it triggers.
    ///
    /// Samples must arrive in non-decreasing timestamp order per address.
    pub fn track(
        &mut self,
        address: &str,
        market_cap: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<CurveAlert>, CurveError> {
        if !market_cap.is_finite() || market_cap < 0.0 {
            return Err(CurveError::InvalidMarketCap(market_cap));
        }
        if let Some(last) = self.histories.get(address).and_then(CurveHistory::last) {
            if timestamp < last.timestamp {
                return Err(CurveError::OutOfOrder {
                    address: address.to_string(),
                    timestamp: timestamp.timestamp_millis(),
                    last: last.timestamp.timestamp_millis(),
                });
            }
        }

        let max_history = self.config.max_history;
        let history = self.histories.entry(address.to_string()).or_default();
        history.samples.push_back(CurveSample {
            address: address.to_string(),
            timestamp,
            market_cap,
        });
        while history.samples.len() > max_history {
            history.samples.pop_front();
        }

        let progress = self.progress(market_cap);
        let velocity = self.velocity(address, self.default_lookback());
        let boundary = self.boundary_for(progress);
        let spike = velocity.usd_per_hour > self.config.velocity_spike_usd_per_hour;
        let graduated = progress >= 1.0;

        let mut alerts = Vec::new();
        let alert = |kind, urgency| CurveAlert {
            address: address.to_string(),
            kind,
            urgency,
            market_cap,
            progress,
            velocity_usd_per_hour: velocity.usd_per_hour,
            timestamp,
        };

        let Some(history) = self.histories.get_mut(address) else {
            return Ok(alerts);
        };

        if let Some(boundary) = boundary {
            if history.alerted.map_or(true, |done| boundary > done) {
                // Jumping past both boundaries at once only raises the urgent one
                alerts.push(match boundary {
                    Boundary::Warning => alert(CurveAlertKind::Approaching, AlertUrgency::High),
                    Boundary::Urgent => alert(CurveAlertKind::Urgent, AlertUrgency::Critical),
                });
                history.alerted = Some(boundary);
            }
        }

        if spike && !history.spiking {
            alerts.push(alert(CurveAlertKind::VelocitySpike, AlertUrgency::Medium));
        }
        history.spiking = spike;

        if graduated && !history.graduated {
            info!("{} reached the graduation threshold at ${:.0}", address, market_cap);
            history.graduated = true;
        }

        for a in &alerts {
            debug!("Curve alert {:?} for {} at {:.1}%", a.kind, address, progress * 100.0);
        }
        Ok(alerts)
    }

    /// Seed an address with stored samples without raising alerts.
    ///
    /// Boundaries already passed by the newest sample count as alerted.
    pub fn restore(&mut self, address: &str, mut samples: Vec<CurveSample>) {
        samples.retain(|s| s.market_cap.is_finite() && s.market_cap >= 0.0);
        samples.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        let keep_from = samples.len().saturating_sub(self.config.max_history);
        let samples: VecDeque<CurveSample> = samples.into_iter().skip(keep_from).collect();
        let Some(last) = samples.back() else {
            return;
        };

        let progress = self.progress(last.market_cap);
        let history = CurveHistory {
            alerted: self.boundary_for(progress),
            graduated: progress >= 1.0,
            spiking: false,
            samples,
        };
        self.histories.insert(address.to_string(), history);
    }

    /// Linear market-cap change per hour over samples within `lookback`.
    ///
    /// Fewer than two samples give zero velocity with zero confidence.
    pub fn velocity(&self, address: &str, lookback: ChronoDuration) -> CurveVelocity {
        let Some(history) = self.histories.get(address) else {
            return CurveVelocity::default();
        };
        let window = history.window(lookback);
        let (Some(first), Some(last)) = (window.first(), window.last()) else {
            return CurveVelocity::default();
        };
        if window.len() < 2 {
            return CurveVelocity {
                samples: window.len(),
                ..CurveVelocity::default()
            };
        }
        CurveVelocity {
            usd_per_hour: rate_per_hour(first, last),
            confidence: (window.len() as f64 / self.config.min_samples_full_confidence as f64).min(1.0),
            samples: window.len(),
        }
    }

    /// Late-half velocity minus early-half velocity over the default window.
    ///
    /// The halves share the middle sample. Needs at least three samples.
    pub fn acceleration(&self, address: &str) -> Option<f64> {
        let history = self.histories.get(address)?;
        let window = history.window(self.default_lookback());
        if window.len() < 3 {
            return None;
        }
        let mid = window.len() / 2;
        let early = rate_per_hour(window[0], window[mid]);
        let late = rate_per_hour(window[mid], window[window.len() - 1]);
        Some(late - early)
    }

    pub fn predict_graduation(&self, address: &str) -> Option<GraduationPrediction> {
        let last = self.histories.get(address)?.last()?;
        let current = last.market_cap;
        let remaining = self.config.graduation_threshold_usd - current;
        let progress = self.progress(current);
        let velocity = self.velocity(address, self.default_lookback());
        let acceleration = self.acceleration(address);

        let (predicted_hours, likelihood) = if remaining <= 0.0 {
            (0.0, GraduationLikelihood::Graduated)
        } else if velocity.usd_per_hour <= 0.0 {
            (f64::INFINITY, GraduationLikelihood::Stalled)
        } else {
            let mut hours = remaining / velocity.usd_per_hour;
            if let Some(accel) = acceleration {
                let adjustment = (accel / velocity.usd_per_hour)
                    .clamp(-MAX_ACCELERATION_ADJUSTMENT, MAX_ACCELERATION_ADJUSTMENT);
                hours /= 1.0 + adjustment;
            }
            (hours, GraduationLikelihood::from_hours(hours))
        };

        Some(GraduationPrediction {
            address: address.to_string(),
            current_market_cap: current,
            remaining_usd: remaining.max(0.0),
            progress,
            velocity,
            acceleration,
            predicted_hours,
            likelihood,
            stage: CurveStage::from_progress(progress),
        })
    }

    /// Stage of the newest sample with the playbook for `profile`.
    pub fn stage_profile(&self, address: &str, profile: TraderProfile) -> Option<StageProfile> {
        let last = self.histories.get(address)?.last()?;
        Some(StageProfile::new(
            CurveStage::from_progress(self.progress(last.market_cap)),
            profile,
        ))
    }

    /// Release graduated addresses and those without a sample for the stale period.
    pub fn prune(&mut self, now: DateTime<Utc>) -> Vec<Pubkey> {
        let stale_after = ChronoDuration::minutes(self.config.stale_after_minutes);
        let mut released: Vec<Pubkey> = self
            .histories
            .iter()
            .filter(|(_, h)| {
                h.graduated || h.last().map_or(true, |s| now - s.timestamp > stale_after)
            })
            .map(|(address, _)| address.clone())
            .collect();
        released.sort();
        for address in &released {
            self.histories.remove(address);
        }
        if !released.is_empty() {
            debug!("Released {} curve histories", released.len());
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_tracker() -> BondingCurveTracker {
        BondingCurveTracker::new(CurveConfig::default())
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_two_samples_predict_sixteen_hours() {
        let mut tracker = create_test_tracker();
        tracker.track("Mint", 1_000.0, t0()).unwrap();
        tracker
            .track("Mint", 5_000.0, t0() + ChronoDuration::seconds(3600))
            .unwrap();

        let velocity = tracker.velocity("Mint", tracker.default_lookback());
        assert!((velocity.usd_per_hour - 4_000.0).abs() < 1e-9);
        assert_eq!(velocity.samples, 2);

        let prediction = tracker.predict_graduation("Mint").unwrap();
        assert!((prediction.remaining_usd - 64_000.0).abs() < 1e-9);
        assert!((prediction.predicted_hours - 16.0).abs() < 1e-9);
        assert_eq!(prediction.likelihood, GraduationLikelihood::Possible);
        assert!(prediction.acceleration.is_none());
    }

    #[test]
    fn test_single_sample_has_no_velocity() {
        let mut tracker = create_test_tracker();
        tracker.track("Mint", 1_000.0, t0()).unwrap();

        let velocity = tracker.velocity("Mint", tracker.default_lookback());
        assert_eq!(velocity.usd_per_hour, 0.0);
        assert_eq!(velocity.confidence, 0.0);

        let prediction = tracker.predict_graduation("Mint").unwrap();
        assert_eq!(prediction.likelihood, GraduationLikelihood::Stalled);
        assert!(prediction.predicted_hours.is_infinite());
    }

    #[test]
    fn test_graduated_predicts_zero_hours() {
        let mut tracker = create_test_tracker();
        tracker.track("Mint", 60_000.0, t0()).unwrap();
        tracker.track("Mint", 70_000.0, t0() + ChronoDuration::minutes(5)).unwrap();

        let prediction = tracker.predict_graduation("Mint").unwrap();
        assert_eq!(prediction.predicted_hours, 0.0);
        assert_eq!(prediction.likelihood, GraduationLikelihood::Graduated);
        assert_eq!(prediction.remaining_usd, 0.0);
    }

    #[test]
    fn test_declining_curve_is_stalled() {
        let mut tracker = create_test_tracker();
        tracker.track("Mint", 9_000.0, t0()).unwrap();
        tracker.track("Mint", 8_000.0, t0() + ChronoDuration::minutes(10)).unwrap();

        let prediction = tracker.predict_graduation("Mint").unwrap();
        assert_eq!(prediction.likelihood, GraduationLikelihood::Stalled);
        assert_eq!(prediction.predicted_hours, f64::INFINITY);
    }

    #[test]
    fn test_acceleration_shortens_prediction() {
        let mut tracker = create_test_tracker();
        // +1000 in the first half hour, +3000 in the second
        tracker.track("Mint", 10_000.0, t0()).unwrap();
        tracker.track("Mint", 11_000.0, t0() + ChronoDuration::minutes(30)).unwrap();
        tracker.track("Mint", 14_000.0, t0() + ChronoDuration::minutes(60)).unwrap();

        let accel = tracker.acceleration("Mint").unwrap();
        assert!((accel - 4_000.0).abs() < 1e-9);

        let prediction = tracker.predict_graduation("Mint").unwrap();
        // 55000 / 4000 = 13.75h, shortened by the capped +50% adjustment
        assert!((prediction.predicted_hours - 13.75 / 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_order_sample_rejected() {
        let mut tracker = create_test_tracker();
        tracker.track("Mint", 1_000.0, t0()).unwrap();
        let err = tracker
            .track("Mint", 2_000.0, t0() - ChronoDuration::seconds(1))
            .unwrap_err();
        assert!(matches!(err, CurveError::OutOfOrder { .. }));
        assert!(tracker.track("Mint", f64::NAN, t0()).is_err());
        // Equal timestamps are allowed
        assert!(tracker.track("Mint", 1_500.0, t0()).is_ok());
        assert_eq!(tracker.history("Mint").len(), 2);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut tracker = BondingCurveTracker::new(CurveConfig {
            max_history: 5,
            ..CurveConfig::default()
        });
        for i in 0..12 {
            tracker
                .track("Mint", 1_000.0 + i as f64, t0() + ChronoDuration::seconds(i))
                .unwrap();
        }
        let history = tracker.history("Mint");
        assert_eq!(history.len(), 5);
        assert_eq!(history[0].market_cap, 1_007.0);
    }

    #[test]
    fn test_boundary_alerts_fire_once() {
        let mut tracker = create_test_tracker();
        let mut at = t0();
        let mut step = |tracker: &mut BondingCurveTracker, cap: f64| {
            at += ChronoDuration::hours(1);
            tracker.track("Mint", cap, at).unwrap()
        };

        assert!(step(&mut tracker, 50_000.0).is_empty());
        let warning = step(&mut tracker, 56_000.0);
        assert_eq!(warning.len(), 1);
        assert_eq!(warning[0].kind, CurveAlertKind::Approaching);

        // Dip and recross: nothing new
        assert!(step(&mut tracker, 54_000.0).is_empty());
        assert!(step(&mut tracker, 57_000.0).is_empty());

        let urgent = step(&mut tracker, 65_500.0);
        assert_eq!(urgent.len(), 1);
        assert_eq!(urgent[0].kind, CurveAlertKind::Urgent);
        assert_eq!(urgent[0].urgency, AlertUrgency::Critical);
        assert!(step(&mut tracker, 66_000.0).is_empty());
    }

    #[test]
    fn test_jump_past_both_boundaries_raises_urgent_only() {
        let mut tracker = create_test_tracker();
        tracker.track("Mint", 10_000.0, t0()).unwrap();
        let alerts = tracker
            .track("Mint", 66_000.0, t0() + ChronoDuration::hours(5))
            .unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, CurveAlertKind::Urgent);
    }

    #[test]
    fn test_velocity_spike_rearms() {
        let mut tracker = create_test_tracker();
        tracker.track("Mint", 1_000.0, t0()).unwrap();
        let spike = tracker
            .track("Mint", 13_000.0, t0() + ChronoDuration::minutes(30))
            .unwrap();
        assert!(spike.iter().any(|a| a.kind == CurveAlertKind::VelocitySpike));

        // Still spiking: no repeat
        let again = tracker
            .track("Mint", 25_000.0, t0() + ChronoDuration::minutes(60))
            .unwrap();
        assert!(again.iter().all(|a| a.kind != CurveAlertKind::VelocitySpike));
    }

    #[test]
    fn test_stage_classification_and_playbook() {
        assert_eq!(CurveStage::from_progress(0.0), CurveStage::Launch);
        assert_eq!(CurveStage::from_progress(0.10), CurveStage::Momentum);
        assert_eq!(CurveStage::from_progress(0.50), CurveStage::Expansion);
        assert_eq!(CurveStage::from_progress(0.93), CurveStage::PreGraduation);
        assert_eq!(CurveStage::from_progress(0.94), CurveStage::Imminent);
        assert_eq!(CurveStage::from_progress(1.5), CurveStage::Imminent);

        let mut tracker = create_test_tracker();
        tracker.track("Mint", 20_000.0, t0()).unwrap();
        let playbook = tracker.stage_profile("Mint", TraderProfile::Aggressive).unwrap();
        assert_eq!(playbook.stage, CurveStage::Growth);
        assert_eq!(playbook.position_size_percent, 5.0);
        assert_eq!(playbook.risk_level, "high");
        assert!(
            CurveStage::Growth.position_size_percent(TraderProfile::Conservative)
                < CurveStage::Growth.position_size_percent(TraderProfile::Balanced)
        );
    }

    #[test]
    fn test_prune_releases_graduated_and_stale() {
        let mut tracker = create_test_tracker();
        tracker.track("Grad", 70_000.0, t0()).unwrap();
        tracker.track("Stale", 5_000.0, t0()).unwrap();
        tracker
            .track("Live", 5_000.0, t0() + ChronoDuration::minutes(100))
            .unwrap();

        let released = tracker.prune(t0() + ChronoDuration::minutes(150));
        assert_eq!(released, vec!["Grad".to_string(), "Stale".to_string()]);
        assert!(tracker.is_tracked("Live"));
        assert_eq!(tracker.tracked_count(), 1);
    }

    #[test]
    fn test_restore_marks_passed_boundaries() {
        let mut tracker = create_test_tracker();
        tracker.restore(
            "Mint",
            vec![
                CurveSample {
                    address: "Mint".to_string(),
                    timestamp: t0() + ChronoDuration::minutes(10),
                    market_cap: 57_000.0,
                },
                CurveSample {
                    address: "Mint".to_string(),
                    timestamp: t0(),
                    market_cap: 40_000.0,
                },
            ],
        );

        let history = tracker.history("Mint");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].market_cap, 40_000.0);

        // Warning already passed before restart
        let alerts = tracker
            .track("Mint", 57_500.0, t0() + ChronoDuration::minutes(20))
            .unwrap();
        assert!(alerts.iter().all(|a| a.kind != CurveAlertKind::Approaching));
    }
}
