//! Core types shared across the conviction oracle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A simple public key representation (base58 string, no on-chain parsing needed)
pub type Pubkey = String;

/// A newly discovered token waiting to be evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenCandidate {
    /// Mint address, unique key for the token
    pub address: Pubkey,
    /// Ticker symbol, if the discovery source knew it
    pub symbol: Option<String>,
    /// Display name, if the discovery source knew it
    pub name: Option<String>,
    /// Where the candidate came from (e.g. "pump.fun", "dex_profiles")
    pub discovery_source: Option<String>,
    /// When the candidate was first seen
    pub first_seen: Option<DateTime<Utc>>,
}

impl TokenCandidate {
    /// Candidate known only by its address.
    pub fn new(address: impl Into<Pubkey>) -> Self {
        Self {
            address: address.into(),
            symbol: None,
            name: None,
            discovery_source: None,
            first_seen: None,
        }
    }

    pub fn with_discovery(mut self, source: impl Into<String>, first_seen: DateTime<Utc>) -> Self {
        self.discovery_source = Some(source.into());
        self.first_seen = Some(first_seen);
        self
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }
}

/// Fixed set of observation windows used for multi-timeframe signals.
///
/// Ordered from shortest to longest; the discriminant doubles as an index
/// into [`crate::oracle::types::TimeframeSeries`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "6h")]
    H6,
    #[serde(rename = "24h")]
    H24,
}

impl Timeframe {
    pub const COUNT: usize = 6;

    /// Returns the string representation used in payloads and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H6 => "6h",
            Timeframe::H24 => "24h",
        }
    }

    /// Window length in minutes.
    pub fn minutes(&self) -> f64 {
        match self {
            Timeframe::M5 => 5.0,
            Timeframe::M15 => 15.0,
            Timeframe::M30 => 30.0,
            Timeframe::H1 => 60.0,
            Timeframe::H6 => 360.0,
            Timeframe::H24 => 1440.0,
        }
    }

    /// Returns all timeframes, shortest first.
    pub fn all() -> [Timeframe; Timeframe::COUNT] {
        [
            Timeframe::M5,
            Timeframe::M15,
            Timeframe::M30,
            Timeframe::H1,
            Timeframe::H6,
            Timeframe::H24,
        ]
    }

    /// Parse the short label ("5m", "1h", ...).
    pub fn parse(label: &str) -> Option<Timeframe> {
        Timeframe::all().into_iter().find(|tf| tf.as_str() == label)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframes_ordered_shortest_first() {
        let all = Timeframe::all();
        for pair in all.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].minutes() < pair[1].minutes());
        }
    }

    #[test]
    fn test_timeframe_parse_roundtrip_labels() {
        assert_eq!(Timeframe::parse("6h"), Some(Timeframe::H6));
        assert_eq!(Timeframe::parse("2h"), None);
        let json = serde_json::to_string(&Timeframe::M15).unwrap();
        assert_eq!(json, "\"15m\"");
    }

    #[test]
    fn test_candidate_builders() {
        let now = Utc::now();
        let candidate = TokenCandidate::new("Mint111")
            .with_symbol("CAT")
            .with_discovery("pump.fun", now);

        assert_eq!(candidate.address, "Mint111");
        assert_eq!(candidate.symbol.as_deref(), Some("CAT"));
        assert_eq!(candidate.first_seen, Some(now));
    }
}
