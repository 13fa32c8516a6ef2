//! Merge per-source records into one canonical profile per address.
//!
//! This is the only place absent values are resolved. Records are applied in
//! a canonical order and a field is overwritten only when the incoming source
//! provides it and is at least as specific for that field as the source that
//! filled it, so the result does not depend on arrival order and fusing the
//! same records twice gives the same profile.

use crate::oracle::types::{FusedTokenProfile, Reading, SourceKind, SourceRecord, TimeframeSeries};
use crate::types::{Pubkey, Timeframe, TokenCandidate};
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    Identity,
    Volume(Timeframe),
    PriceChange(Timeframe),
    Trades(Timeframe),
    UniqueTraders,
    Liquidity,
    MarketCap,
    Security,
    Social,
    Boost,
    PairCreated,
}

/// How authoritative `kind` is for `field`. Higher wins.
fn specificity(kind: SourceKind, field: Field) -> u8 {
    use SourceKind::*;
    match (field, kind) {
        (Field::Identity, BatchMetadata) => 3,
        (Field::Identity, Liquidity) => 2,
        (Field::Volume(_) | Field::PriceChange(_) | Field::Trades(_), BatchMetadata) => 3,
        (Field::Volume(_) | Field::PriceChange(_) | Field::Trades(_), Liquidity) => 2,
        (Field::UniqueTraders, BatchMetadata) => 3,
        (Field::UniqueTraders, Liquidity) => 2,
        (Field::Liquidity | Field::MarketCap | Field::PairCreated, Liquidity) => 3,
        (Field::Liquidity | Field::MarketCap | Field::PairCreated, BatchMetadata) => 2,
        (Field::Security, Security) => 3,
        (Field::Social, SocialProfile) => 3,
        (Field::Boost, Boost) => 3,
        _ => 1,
    }
}

/// Rank of the source currently holding each field.
#[derive(Default)]
struct Provenance {
    ranks: HashMap<Field, u8>,
}

impl Provenance {
    /// Whether a value from `kind` may replace the current one, recording it if so.
    fn accept(&mut self, field: Field, kind: SourceKind) -> bool {
        let rank = specificity(kind, field);
        match self.ranks.get(&field) {
            Some(&held) if held > rank => false,
            _ => {
                self.ranks.insert(field, rank);
                true
            }
        }
    }
}

/// Absent sorts first; present values use the IEEE total order.
fn value_order(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (a, b) => a.is_some().cmp(&b.is_some()),
    }
}

fn series_order(a: &TimeframeSeries, b: &TimeframeSeries) -> Ordering {
    a.iter()
        .zip(b.iter())
        .map(|((_, x), (_, y))| value_order(x, y))
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Total order over records: source, answer time, then content.
fn canonical_order(a: &SourceRecord, b: &SourceRecord) -> Ordering {
    a.kind
        .cmp(&b.kind)
        .then(a.fetched_at.cmp(&b.fetched_at))
        .then_with(|| a.symbol.cmp(&b.symbol))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| value_order(a.security_score, b.security_score))
        .then_with(|| a.risk_flag.cmp(&b.risk_flag))
        .then_with(|| value_order(a.social_score, b.social_score))
        .then_with(|| a.social_links.cmp(&b.social_links))
        .then_with(|| value_order(a.boost_amount, b.boost_amount))
        .then_with(|| value_order(a.liquidity_usd, b.liquidity_usd))
        .then_with(|| value_order(a.market_cap, b.market_cap))
        .then_with(|| series_order(&a.volume, &b.volume))
        .then_with(|| series_order(&a.price_change, &b.price_change))
        .then_with(|| series_order(&a.trades, &b.trades))
        .then_with(|| value_order(a.unique_traders, b.unique_traders))
        .then_with(|| a.pair_created_at.cmp(&b.pair_created_at))
}

fn merge_series(
    target: &mut TimeframeSeries,
    incoming: &TimeframeSeries,
    kind: SourceKind,
    provenance: &mut Provenance,
    field: fn(Timeframe) -> Field,
) {
    for (tf, value) in incoming.iter() {
        if let Some(v) = value {
            if provenance.accept(field(tf), kind) {
                target.set(tf, v);
            }
        }
    }
}

fn merge_reading(
    target: &mut Reading<f64>,
    incoming: Option<f64>,
    kind: SourceKind,
    provenance: &mut Provenance,
    field: Field,
) {
    if let Some(v) = incoming.filter(|v| v.is_finite()) {
        if provenance.accept(field, kind) {
            *target = Reading::Measured(v);
        }
    }
}

/// Fuse every record for `candidate` into one profile.
///
/// Records for other addresses are ignored. With no records at all the
/// profile is empty, with every reading marked absent.
pub fn fuse_profile(candidate: &TokenCandidate, records: &[SourceRecord]) -> FusedTokenProfile {
    let mut ordered: Vec<&SourceRecord> = records
        .iter()
        .filter(|r| r.address == candidate.address)
        .collect();
    ordered.sort_by(|a, b| canonical_order(a, b));

    let mut profile = FusedTokenProfile::empty(candidate.address.clone());
    profile.symbol = candidate.symbol.clone();
    profile.name = candidate.name.clone();

    let mut provenance = Provenance::default();
    let mut links: Vec<String> = Vec::new();

    for record in ordered {
        let kind = record.kind;
        let before = profile.clone();

        if record.symbol.is_some() || record.name.is_some() {
            if provenance.accept(Field::Identity, kind) {
                profile.symbol = record.symbol.clone().or(profile.symbol);
                profile.name = record.name.clone().or(profile.name);
            }
        }

        merge_series(&mut profile.volume, &record.volume, kind, &mut provenance, Field::Volume);
        merge_series(
            &mut profile.price_change,
            &record.price_change,
            kind,
            &mut provenance,
            Field::PriceChange,
        );
        merge_series(&mut profile.trades, &record.trades, kind, &mut provenance, Field::Trades);

        merge_reading(&mut profile.unique_traders, record.unique_traders, kind, &mut provenance, Field::UniqueTraders);
        merge_reading(&mut profile.liquidity_usd, record.liquidity_usd, kind, &mut provenance, Field::Liquidity);
        merge_reading(&mut profile.market_cap, record.market_cap, kind, &mut provenance, Field::MarketCap);
        merge_reading(&mut profile.social_score, record.social_score, kind, &mut provenance, Field::Social);
        merge_reading(&mut profile.boost_amount, record.boost_amount, kind, &mut provenance, Field::Boost);

        if record.security_score.is_some() || record.risk_flag.is_some() {
            if provenance.accept(Field::Security, kind) {
                if let Some(score) = record.security_score.filter(|s| s.is_finite()) {
                    profile.security_score = Reading::Measured(score);
                }
                if let Some(flag) = record.risk_flag {
                    profile.risk_flag = flag;
                }
            }
        }

        if let Some(created) = record.pair_created_at {
            if provenance.accept(Field::PairCreated, kind) {
                profile.pair_created_at = Some(created);
            }
        }

        links.extend(record.social_links.iter().cloned());

        if profile != before || !record.social_links.is_empty() {
            profile.sources.push(kind);
        }
    }

    links.sort();
    links.dedup();
    profile.social_links = links;
    profile.sources.sort();
    profile.sources.dedup();
    profile
}

/// Fuse a whole batch. Every candidate gets exactly one profile, in input order.
pub fn fuse_batch(candidates: &[TokenCandidate], records: &[SourceRecord]) -> Vec<FusedTokenProfile> {
    let mut by_address: HashMap<&Pubkey, Vec<SourceRecord>> = HashMap::new();
    for record in records {
        by_address.entry(&record.address).or_default().push(record.clone());
    }
    candidates
        .iter()
        .map(|candidate| {
            let own = by_address
                .get(&candidate.address)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            fuse_profile(candidate, own)
        })
        .collect()
}
