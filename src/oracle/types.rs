//! Data model shared by the scoring and routing stages.

use crate::types::{Pubkey, Timeframe};
use chrono::{DateTime, Utc};
use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// A value that was either observed or not observed at all.
///
/// Keeps "the provider reported 0" apart from "no provider reported anything".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Reading<T> {
    Measured(T),
    #[default]
    Absent,
}

impl<T: Copy> Reading<T> {
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Reading::Measured(v),
            None => Reading::Absent,
        }
    }

    pub fn measured(&self) -> Option<T> {
        match self {
            Reading::Measured(v) => Some(*v),
            Reading::Absent => None,
        }
    }

    pub fn is_measured(&self) -> bool {
        matches!(self, Reading::Measured(_))
    }

    pub fn value_or(&self, default: T) -> T {
        self.measured().unwrap_or(default)
    }
}

impl Reading<f64> {
    /// Numeric value, with absent readings scored as zero.
    pub fn value_or_zero(&self) -> f64 {
        self.value_or(0.0)
    }
}

/// Security verdict from a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    Safe,
    Risky,
    #[default]
    Unknown,
}

/// One value per timeframe, with explicit gaps.
///
/// Indexed by the timeframe discriminant so every profile carries the same
/// fixed key set.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeframeSeries {
    values: [Option<f64>; Timeframe::COUNT],
}

impl TimeframeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, timeframe: Timeframe) -> Option<f64> {
        self.values[timeframe as usize]
    }

    /// Store a value. Non-finite values are treated as missing.
    pub fn set(&mut self, timeframe: Timeframe, value: f64) {
        self.values[timeframe as usize] = value.is_finite().then_some(value);
    }

    pub fn with(mut self, timeframe: Timeframe, value: f64) -> Self {
        self.set(timeframe, value);
        self
    }

    pub fn is_measured(&self, timeframe: Timeframe) -> bool {
        self.get(timeframe).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    /// Iterate shortest timeframe first.
    pub fn iter(&self) -> impl Iterator<Item = (Timeframe, Option<f64>)> + '_ {
        Timeframe::all().into_iter().map(move |tf| (tf, self.get(tf)))
    }

    pub fn populated_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Ordered map view, absent keys included.
    pub fn to_map(&self) -> BTreeMap<Timeframe, Option<f64>> {
        self.iter().collect()
    }
}

/// The provider family a record came from.
///
/// The declaration order is the canonical fusion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Batched pair/market metadata
    BatchMetadata,
    /// Social links and profile listings
    SocialProfile,
    /// Paid boosts and promotions
    Boost,
    /// Per-address pair and liquidity analysis
    Liquidity,
    /// Security scan
    Security,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::BatchMetadata => "batch_metadata",
            SourceKind::SocialProfile => "social_profile",
            SourceKind::Boost => "boost",
            SourceKind::Liquidity => "liquidity",
            SourceKind::Security => "security",
        }
    }
}

/// One provider's raw snapshot for one address. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub address: Pubkey,
    pub kind: SourceKind,
    /// When the provider answered
    pub fetched_at: DateTime<Utc>,
    pub symbol: Option<String>,
    pub name: Option<String>,
    /// 0..=security_max, higher is safer
    pub security_score: Option<f64>,
    pub risk_flag: Option<RiskFlag>,
    /// 0..=social_max
    pub social_score: Option<f64>,
    pub social_links: Vec<String>,
    /// Total paid boost amount
    pub boost_amount: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub market_cap: Option<f64>,
    pub volume: TimeframeSeries,
    pub price_change: TimeframeSeries,
    pub trades: TimeframeSeries,
    pub unique_traders: Option<f64>,
    pub pair_created_at: Option<DateTime<Utc>>,
}

impl SourceRecord {
    pub fn new(address: impl Into<Pubkey>, kind: SourceKind, fetched_at: DateTime<Utc>) -> Self {
        Self {
            address: address.into(),
            kind,
            fetched_at,
            symbol: None,
            name: None,
            security_score: None,
            risk_flag: None,
            social_score: None,
            social_links: Vec::new(),
            boost_amount: None,
            liquidity_usd: None,
            market_cap: None,
            volume: TimeframeSeries::new(),
            price_change: TimeframeSeries::new(),
            trades: TimeframeSeries::new(),
            unique_traders: None,
            pair_created_at: None,
        }
    }

    pub fn with_security(mut self, score: f64, flag: RiskFlag) -> Self {
        self.security_score = Some(score);
        self.risk_flag = Some(flag);
        self
    }

    pub fn with_social(mut self, score: f64) -> Self {
        self.social_score = Some(score);
        self
    }

    pub fn with_boost(mut self, amount: f64) -> Self {
        self.boost_amount = Some(amount);
        self
    }

    pub fn with_liquidity(mut self, usd: f64) -> Self {
        self.liquidity_usd = Some(usd);
        self
    }
}

/// Canonical per-address profile built from the latest records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedTokenProfile {
    pub address: Pubkey,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub volume: TimeframeSeries,
    pub price_change: TimeframeSeries,
    pub trades: TimeframeSeries,
    pub unique_traders: Reading<f64>,
    pub liquidity_usd: Reading<f64>,
    pub market_cap: Reading<f64>,
    pub security_score: Reading<f64>,
    pub risk_flag: RiskFlag,
    pub social_score: Reading<f64>,
    pub social_links: Vec<String>,
    pub boost_amount: Reading<f64>,
    pub pair_created_at: Option<DateTime<Utc>>,
    /// Source families that contributed at least one field, canonical order
    pub sources: Vec<SourceKind>,
    /// 0-100, filled in by the routers
    pub conviction_score: f64,
    pub analysis_tier: AnalysisDepth,
}

impl FusedTokenProfile {
    /// Profile with nothing measured.
    pub fn empty(address: impl Into<Pubkey>) -> Self {
        Self {
            address: address.into(),
            symbol: None,
            name: None,
            volume: TimeframeSeries::new(),
            price_change: TimeframeSeries::new(),
            trades: TimeframeSeries::new(),
            unique_traders: Reading::Absent,
            liquidity_usd: Reading::Absent,
            market_cap: Reading::Absent,
            security_score: Reading::Absent,
            risk_flag: RiskFlag::Unknown,
            social_score: Reading::Absent,
            social_links: Vec::new(),
            boost_amount: Reading::Absent,
            pair_created_at: None,
            sources: Vec::new(),
            conviction_score: 0.0,
            analysis_tier: AnalysisDepth::Skip,
        }
    }

    /// Whether any timeframe reading exists for `timeframe`.
    pub fn timeframe_populated(&self, timeframe: Timeframe) -> bool {
        self.volume.is_measured(timeframe)
            || self.price_change.is_measured(timeframe)
            || self.trades.is_measured(timeframe)
    }

    /// Age in minutes at `now`, from the pair creation or first sighting.
    pub fn age_minutes(&self, now: DateTime<Utc>, first_seen: Option<DateTime<Utc>>) -> Option<f64> {
        let born = match (self.pair_created_at, first_seen) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }?;
        Some(((now - born).num_seconds() as f64 / 60.0).max(0.0))
    }
}

/// Priority bucket of a 0-100 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriorityTier {
    Low,
    Medium,
    High,
    Critical,
}

impl PriorityTier {
    pub fn recommended_depth(&self) -> AnalysisDepth {
        match self {
            PriorityTier::Critical => AnalysisDepth::Comprehensive,
            PriorityTier::High => AnalysisDepth::Standard,
            PriorityTier::Medium => AnalysisDepth::Basic,
            PriorityTier::Low => AnalysisDepth::Skip,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityTier::Low => "LOW",
            PriorityTier::Medium => "MEDIUM",
            PriorityTier::High => "HIGH",
            PriorityTier::Critical => "CRITICAL",
        }
    }
}

/// How much expensive analysis a token receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisDepth {
    #[default]
    Skip,
    Basic,
    Standard,
    Comprehensive,
}

impl AnalysisDepth {
    /// Deepest first, the order queues are dispatched in.
    pub fn billable() -> [AnalysisDepth; 3] {
        [
            AnalysisDepth::Comprehensive,
            AnalysisDepth::Standard,
            AnalysisDepth::Basic,
        ]
    }

    /// Provider calls one batch of this depth costs.
    pub fn calls_per_batch(&self) -> u32 {
        match self {
            AnalysisDepth::Comprehensive => 3,
            AnalysisDepth::Standard => 2,
            AnalysisDepth::Basic => 1,
            AnalysisDepth::Skip => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisDepth::Skip => "skip",
            AnalysisDepth::Basic => "basic",
            AnalysisDepth::Standard => "standard",
            AnalysisDepth::Comprehensive => "comprehensive",
        }
    }
}

/// Qualitative data-coverage bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    VeryLow,
    Low,
    Medium,
    High,
    EarlyDetection,
}

impl ConfidenceLevel {
    /// Comparable strength; early detection counts as high.
    pub fn rank(&self) -> u8 {
        match self {
            ConfidenceLevel::VeryLow => 0,
            ConfidenceLevel::Low => 1,
            ConfidenceLevel::Medium => 2,
            ConfidenceLevel::High | ConfidenceLevel::EarlyDetection => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::VeryLow => "VERY_LOW",
            ConfidenceLevel::Low => "LOW",
            ConfidenceLevel::Medium => "MEDIUM",
            ConfidenceLevel::High => "HIGH",
            ConfidenceLevel::EarlyDetection => "EARLY_DETECTION",
        }
    }
}

/// Coverage-based confidence of a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceAssessment {
    /// populated / total timeframes
    pub coverage: f64,
    pub populated: usize,
    pub total: usize,
    pub level: ConfidenceLevel,
    /// Applied to alert and tier thresholds, never to the score
    pub threshold_multiplier: f64,
}

/// Position-sizing appetite of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraderProfile {
    Conservative,
    Balanced,
    Aggressive,
}

/// Alert payload handed to the messaging collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvictionAlert {
    pub address: Pubkey,
    pub conviction_score: f64,
    pub priority_tier: PriorityTier,
    pub reasons: Vec<String>,
    pub recommended_depth: AnalysisDepth,
    pub confidence: ConfidenceLevel,
    pub coverage: f64,
    pub timestamp: DateTime<Utc>,
}

/// Addresses of one depth, split into provider-sized batches.
#[derive(Debug, Clone)]
pub struct TierQueue {
    pub depth: AnalysisDepth,
    pub batch_size_cap: usize,
    pub batches: Vec<NonEmpty<Pubkey>>,
    /// Pause between two batches of this queue
    pub inter_batch_delay: Duration,
}

impl TierQueue {
    pub fn token_count(&self) -> usize {
        self.batches.iter().map(NonEmpty::len).sum()
    }
}

/// Where each token goes next and what it costs.
#[derive(Debug, Clone, Default)]
pub struct RoutingPlan {
    /// Billable queues, deepest first; empty queues are omitted
    pub queues: Vec<TierQueue>,
    pub skipped: Vec<Pubkey>,
    pub estimated_cost: f64,
    /// Cost if every token were analysed comprehensively
    pub baseline_cost: f64,
    /// Saving versus the baseline, 0-100
    pub cost_saving_percent: f64,
}

impl RoutingPlan {
    pub fn queue(&self, depth: AnalysisDepth) -> Option<&TierQueue> {
        self.queues.iter().find(|q| q.depth == depth)
    }

    pub fn routed_count(&self) -> usize {
        self.queues.iter().map(TierQueue::token_count).sum()
    }
}
