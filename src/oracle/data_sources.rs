//! Provider adapters.
//!
//! Each free provider sits behind [`SignalSource`] and turns its payload into
//! explicit optional-field [`SourceRecord`]s. All HTTP traffic goes through
//! the shared [`RequestGateway`], so the rate budget is respected no matter
//! how many sources run at once. The expensive provider sits behind
//! [`DeepAnalyzer`].

use crate::oracle::config::{PipelineConfig, SourceEndpoints};
use crate::oracle::errors::CallError;
use crate::oracle::gateway::RequestGateway;
use crate::oracle::types::{AnalysisDepth, RiskFlag, SourceKind, SourceRecord, TimeframeSeries};
use crate::types::{Pubkey, Timeframe};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use nonempty::NonEmpty;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

/// A low-cost provider of per-address signals.
#[async_trait]
pub trait SignalSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Endpoint name used for rate limiting and statistics.
    fn name(&self) -> &str;

    /// Fetch records for `addresses`. Addresses the provider knows nothing
    /// about are simply missing from the result.
    async fn fetch(&self, addresses: &[Pubkey]) -> Result<Vec<SourceRecord>, CallError>;
}

/// Result of an expensive analysis call for one address.
#[derive(Debug, Clone, PartialEq)]
pub struct DeepAnalysis {
    pub address: Pubkey,
    pub depth: AnalysisDepth,
    /// Raw provider sections keyed by section name
    pub sections: serde_json::Map<String, serde_json::Value>,
}

/// The expensive, batched analysis provider.
#[async_trait]
pub trait DeepAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        depth: AnalysisDepth,
        addresses: &NonEmpty<Pubkey>,
    ) -> Result<Vec<DeepAnalysis>, CallError>;
}

/// GET `url` and decode its JSON body.
///
/// Non-success statuses become tagged [`CallError`]s; a `Retry-After` header
/// in seconds is carried on 429 responses.
pub async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    query: &[(&str, String)],
    headers: &[(&'static str, String)],
) -> Result<T, CallError> {
    let mut request = client.get(url).query(query);
    for (name, value) in headers {
        request = request.header(*name, value);
    }
    let response = request.send().await?;

    let status = response.status();
    if !status.is_success() {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(CallError::from_status(status, retry_after));
    }

    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

// --- DEX pair payloads ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DexPair {
    pub base_token: DexToken,
    pub liquidity: Option<DexLiquidity>,
    pub market_cap: Option<f64>,
    pub fdv: Option<f64>,
    pub volume: Option<WindowValues>,
    pub price_change: Option<WindowValues>,
    pub txns: Option<WindowTxns>,
    /// Milliseconds since the epoch
    pub pair_created_at: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DexToken {
    pub address: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DexLiquidity {
    pub usd: Option<f64>,
}

/// Values reported per window. The provider only knows these four.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WindowValues {
    pub m5: Option<f64>,
    pub h1: Option<f64>,
    pub h6: Option<f64>,
    pub h24: Option<f64>,
}

impl WindowValues {
    fn to_series(&self) -> TimeframeSeries {
        let mut series = TimeframeSeries::new();
        for (tf, value) in [
            (Timeframe::M5, self.m5),
            (Timeframe::H1, self.h1),
            (Timeframe::H6, self.h6),
            (Timeframe::H24, self.h24),
        ] {
            if let Some(v) = value {
                series.set(tf, v);
            }
        }
        series
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TxnCount {
    #[serde(default)]
    pub buys: u64,
    #[serde(default)]
    pub sells: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WindowTxns {
    pub m5: Option<TxnCount>,
    pub h1: Option<TxnCount>,
    pub h6: Option<TxnCount>,
    pub h24: Option<TxnCount>,
}

impl WindowTxns {
    fn to_series(&self) -> TimeframeSeries {
        let total = |c: Option<TxnCount>| c.map(|c| (c.buys + c.sells) as f64);
        WindowValues {
            m5: total(self.m5),
            h1: total(self.h1),
            h6: total(self.h6),
            h24: total(self.h24),
        }
        .to_series()
    }
}

impl DexPair {
    fn liquidity_usd(&self) -> Option<f64> {
        self.liquidity.as_ref().and_then(|l| l.usd)
    }

    fn to_record(&self, kind: SourceKind, fetched_at: DateTime<Utc>) -> SourceRecord {
        let mut record = SourceRecord::new(self.base_token.address.clone(), kind, fetched_at);
        record.symbol = self.base_token.symbol.clone();
        record.name = self.base_token.name.clone();
        record.liquidity_usd = self.liquidity_usd();
        record.market_cap = self.market_cap.or(self.fdv);
        record.pair_created_at = self.pair_created_at.and_then(millis_to_datetime);
        if let Some(volume) = &self.volume {
            record.volume = volume.to_series();
        }
        if let Some(change) = &self.price_change {
            record.price_change = change.to_series();
        }
        if let Some(txns) = &self.txns {
            record.trades = txns.to_series();
        }
        record
    }
}

/// Keep the most liquid pair per base token.
fn deepest_pairs(pairs: Vec<DexPair>) -> BTreeMap<String, DexPair> {
    let mut best: BTreeMap<String, DexPair> = BTreeMap::new();
    for pair in pairs {
        let liquidity = pair.liquidity_usd().unwrap_or(0.0);
        match best.get(&pair.base_token.address) {
            Some(current) if current.liquidity_usd().unwrap_or(0.0) >= liquidity => {}
            _ => {
                best.insert(pair.base_token.address.clone(), pair);
            }
        }
    }
    best
}

/// Merge the parts of a chunked request. Failed parts are logged and
/// skipped; the call fails only when no part succeeded.
fn keep_partial<T>(endpoint: &str, parts: Vec<Result<Vec<T>, CallError>>) -> Result<Vec<T>, CallError> {
    let mut kept = Vec::new();
    let mut any_succeeded = false;
    let mut last_error = None;
    for part in parts {
        match part {
            Ok(items) => {
                any_succeeded = true;
                kept.extend(items);
            }
            Err(e) => {
                warn!("{} chunk failed, keeping the rest: {}", endpoint, e);
                last_error = Some(e);
            }
        }
    }
    match last_error {
        Some(e) if !any_succeeded => Err(e),
        _ => Ok(kept),
    }
}

/// One gateway call per address, run concurrently. Results keep the input order.
async fn lookup_each<T, F, Fut>(
    gateway: &Arc<RequestGateway>,
    endpoint: &str,
    addresses: &[Pubkey],
    call: F,
) -> Vec<(Pubkey, Result<T, CallError>)>
where
    T: Send + 'static,
    F: Fn(Pubkey) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<T, CallError>> + Send + 'static,
{
    let mut tasks = JoinSet::new();
    for (index, address) in addresses.iter().cloned().enumerate() {
        let gateway = gateway.clone();
        let endpoint = endpoint.to_string();
        let call = call.clone();
        tasks.spawn(async move {
            let outcome = gateway.execute(&endpoint, || call(address.clone())).await;
            (index, address, outcome.result)
        });
    }

    let mut results = Vec::with_capacity(addresses.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => warn!("{} lookup task failed: {}", endpoint, e),
        }
    }
    results.sort_by_key(|(index, _, _)| *index);
    results
        .into_iter()
        .map(|(_, address, result)| (address, result))
        .collect()
}

// --- Batch market metadata ---

/// Batched pair metadata: comma-joined addresses, bounded per call.
pub struct MarketBatchSource {
    gateway: Arc<RequestGateway>,
    client: Client,
    url: String,
    batch_limit: usize,
}

impl MarketBatchSource {
    pub fn new(gateway: Arc<RequestGateway>, client: Client, url: String, batch_limit: usize) -> Self {
        Self {
            gateway,
            client,
            url,
            batch_limit: batch_limit.max(1),
        }
    }
}

#[async_trait]
impl SignalSource for MarketBatchSource {
    fn kind(&self) -> SourceKind {
        SourceKind::BatchMetadata
    }

    fn name(&self) -> &str {
        "market_batch"
    }

    #[instrument(skip(self, addresses), fields(count = addresses.len()))]
    async fn fetch(&self, addresses: &[Pubkey]) -> Result<Vec<SourceRecord>, CallError> {
        let mut chunks = Vec::new();
        for chunk in addresses.chunks(self.batch_limit) {
            let url = format!("{}/{}", self.url, chunk.join(","));
            let outcome = self
                .gateway
                .execute(self.name(), || get_json::<Vec<DexPair>>(&self.client, &url, &[], &[]))
                .await;
            let fetched_at = Utc::now();
            chunks.push(outcome.result.map(|pairs| {
                deepest_pairs(pairs)
                    .values()
                    .map(|pair| pair.to_record(SourceKind::BatchMetadata, fetched_at))
                    .collect::<Vec<_>>()
            }));
        }
        let records = keep_partial(self.name(), chunks)?;
        debug!("Market batch returned {} records", records.len());
        Ok(records)
    }
}

// --- Social profiles ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileListing {
    pub token_address: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub links: Vec<ProfileLink>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileLink {
    #[serde(rename = "type")]
    pub link_type: Option<String>,
    pub url: Option<String>,
}

/// Number of distinct links that counts as full social presence.
const FULL_SOCIAL_LINKS: f64 = 3.0;

impl ProfileListing {
    /// 0..=1 presence score from links and description.
    fn social_score(&self) -> f64 {
        let mut kinds: HashSet<&str> = HashSet::new();
        for link in &self.links {
            kinds.insert(link.link_type.as_deref().unwrap_or("website"));
        }
        let link_part = (kinds.len() as f64 / FULL_SOCIAL_LINKS).min(1.0) * 0.8;
        let description_part = match &self.description {
            Some(d) if !d.trim().is_empty() => 0.2,
            _ => 0.0,
        };
        link_part + description_part
    }
}

/// Latest social profile listings, matched against the batch.
pub struct ProfileSource {
    gateway: Arc<RequestGateway>,
    client: Client,
    url: String,
}

impl ProfileSource {
    pub fn new(gateway: Arc<RequestGateway>, client: Client, url: String) -> Self {
        Self { gateway, client, url }
    }
}

#[async_trait]
impl SignalSource for ProfileSource {
    fn kind(&self) -> SourceKind {
        SourceKind::SocialProfile
    }

    fn name(&self) -> &str {
        "profiles"
    }

    async fn fetch(&self, addresses: &[Pubkey]) -> Result<Vec<SourceRecord>, CallError> {
        let wanted: HashSet<&str> = addresses.iter().map(String::as_str).collect();
        let listings = self
            .gateway
            .execute(self.name(), || {
                get_json::<Vec<ProfileListing>>(&self.client, &self.url, &[], &[])
            })
            .await
            .result?;

        let fetched_at = Utc::now();
        let mut seen = HashSet::new();
        let records = listings
            .into_iter()
            .filter(|l| wanted.contains(l.token_address.as_str()))
            .filter(|l| seen.insert(l.token_address.clone()))
            .map(|listing| {
                let mut record =
                    SourceRecord::new(listing.token_address.clone(), SourceKind::SocialProfile, fetched_at)
                        .with_social(listing.social_score());
                record.social_links = listing.links.iter().filter_map(|l| l.url.clone()).collect();
                record
            })
            .collect();
        Ok(records)
    }
}

// --- Boosts ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostListing {
    pub token_address: String,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub total_amount: Option<f64>,
}

/// Paid boost listings, summed per address.
pub struct BoostSource {
    gateway: Arc<RequestGateway>,
    client: Client,
    url: String,
}

impl BoostSource {
    pub fn new(gateway: Arc<RequestGateway>, client: Client, url: String) -> Self {
        Self { gateway, client, url }
    }
}

#[async_trait]
impl SignalSource for BoostSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Boost
    }

    fn name(&self) -> &str {
        "boosts"
    }

    async fn fetch(&self, addresses: &[Pubkey]) -> Result<Vec<SourceRecord>, CallError> {
        let wanted: HashSet<&str> = addresses.iter().map(String::as_str).collect();
        let listings = self
            .gateway
            .execute(self.name(), || {
                get_json::<Vec<BoostListing>>(&self.client, &self.url, &[], &[])
            })
            .await
            .result?;

        let mut totals: BTreeMap<String, f64> = BTreeMap::new();
        for listing in listings {
            if !wanted.contains(listing.token_address.as_str()) {
                continue;
            }
            let amount = listing.total_amount.or(listing.amount).unwrap_or(0.0);
            *totals.entry(listing.token_address).or_insert(0.0) += amount;
        }

        let fetched_at = Utc::now();
        Ok(totals
            .into_iter()
            .map(|(address, amount)| {
                SourceRecord::new(address, SourceKind::Boost, fetched_at).with_boost(amount)
            })
            .collect())
    }
}

// --- Per-address liquidity ---

#[derive(Debug, Deserialize)]
pub struct PairLookupResponse {
    #[serde(default)]
    pub pairs: Option<Vec<DexPair>>,
}

/// Per-address pair lookups, capped to the first N addresses of a batch.
pub struct LiquiditySource {
    gateway: Arc<RequestGateway>,
    client: Client,
    url: String,
    item_cap: usize,
}

impl LiquiditySource {
    pub fn new(gateway: Arc<RequestGateway>, client: Client, url: String, item_cap: usize) -> Self {
        Self {
            gateway,
            client,
            url,
            item_cap,
        }
    }
}

#[async_trait]
impl SignalSource for LiquiditySource {
    fn kind(&self) -> SourceKind {
        SourceKind::Liquidity
    }

    fn name(&self) -> &str {
        "liquidity"
    }

    #[instrument(skip(self, addresses), fields(count = addresses.len()))]
    async fn fetch(&self, addresses: &[Pubkey]) -> Result<Vec<SourceRecord>, CallError> {
        let capped = &addresses[..addresses.len().min(self.item_cap)];
        let client = self.client.clone();
        let base_url = self.url.clone();
        let lookups = lookup_each(&self.gateway, self.name(), capped, move |address| {
            let client = client.clone();
            let url = format!("{}/{}", base_url, address);
            async move { get_json::<PairLookupResponse>(&client, &url, &[], &[]).await }
        })
        .await;

        let mut records = Vec::new();
        for (address, result) in lookups {
            match result {
                Ok(response) => {
                    let pairs = response.pairs.unwrap_or_default();
                    if let Some(pair) = deepest_pairs(pairs).remove(&address) {
                        records.push(pair.to_record(SourceKind::Liquidity, Utc::now()));
                    }
                }
                Err(e) => warn!("Liquidity lookup failed for {}: {}", address, e),
            }
        }
        if addresses.len() > self.item_cap {
            debug!(
                "Liquidity lookups capped at {} of {} addresses",
                self.item_cap,
                addresses.len()
            );
        }
        Ok(records)
    }
}

// --- Per-address security ---

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityReport {
    /// 0-100, higher means riskier
    #[serde(default)]
    pub score_normalised: Option<f64>,
    #[serde(default)]
    pub risks: Vec<SecurityRisk>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityRisk {
    pub name: String,
    #[serde(default)]
    pub level: Option<String>,
}

impl SecurityReport {
    fn to_record(&self, address: &str, fetched_at: DateTime<Utc>) -> SourceRecord {
        let mut record = SourceRecord::new(address, SourceKind::Security, fetched_at);
        record.security_score = self
            .score_normalised
            .map(|risk| (100.0 - risk).clamp(0.0, 100.0));
        let dangerous = self
            .risks
            .iter()
            .any(|r| r.level.as_deref() == Some("danger"));
        record.risk_flag = Some(if dangerous { RiskFlag::Risky } else { RiskFlag::Safe });
        record
    }
}

/// Per-address security scans, capped to the first N addresses of a batch.
pub struct SecuritySource {
    gateway: Arc<RequestGateway>,
    client: Client,
    url: String,
    item_cap: usize,
}

impl SecuritySource {
    pub fn new(gateway: Arc<RequestGateway>, client: Client, url: String, item_cap: usize) -> Self {
        Self {
            gateway,
            client,
            url,
            item_cap,
        }
    }
}

#[async_trait]
impl SignalSource for SecuritySource {
    fn kind(&self) -> SourceKind {
        SourceKind::Security
    }

    fn name(&self) -> &str {
        "security"
    }

    #[instrument(skip(self, addresses), fields(count = addresses.len()))]
    async fn fetch(&self, addresses: &[Pubkey]) -> Result<Vec<SourceRecord>, CallError> {
        let capped = &addresses[..addresses.len().min(self.item_cap)];
        let client = self.client.clone();
        let base_url = self.url.clone();
        let scans = lookup_each(&self.gateway, self.name(), capped, move |address| {
            let client = client.clone();
            let url = format!("{}/{}/report/summary", base_url, address);
            async move { get_json::<SecurityReport>(&client, &url, &[], &[]).await }
        })
        .await;

        let mut records = Vec::new();
        for (address, result) in scans {
            match result {
                Ok(report) => records.push(report.to_record(&address, Utc::now())),
                Err(e) => warn!("Security scan failed for {}: {}", address, e),
            }
        }
        if addresses.len() > self.item_cap {
            debug!(
                "Security scans capped at {} of {} addresses",
                self.item_cap,
                addresses.len()
            );
        }
        Ok(records)
    }
}

// --- Expensive analysis ---

#[derive(Debug, Deserialize)]
struct KeyedResponse {
    #[serde(default)]
    data: HashMap<String, serde_json::Value>,
}

/// Sections requested per depth, cheapest first.
const DEEP_SECTIONS: [&str; 3] = ["market-data", "trade-data", "meta-data"];

/// Batched expensive analysis over HTTP.
///
/// A depth asks for as many sections as it has calls per batch; each section
/// is one comma-joined request answered with JSON keyed by address.
pub struct HttpDeepAnalyzer {
    gateway: Arc<RequestGateway>,
    client: Client,
    base_url: String,
    api_key: Option<String>,
    batch_limit: usize,
}

impl HttpDeepAnalyzer {
    pub fn new(
        gateway: Arc<RequestGateway>,
        client: Client,
        endpoints: &SourceEndpoints,
        batch_limit: usize,
    ) -> Self {
        Self {
            gateway,
            client,
            base_url: endpoints.deep_analysis_url.clone(),
            api_key: endpoints.deep_analysis_api_key.clone(),
            batch_limit: batch_limit.max(1),
        }
    }
}

#[async_trait]
impl DeepAnalyzer for HttpDeepAnalyzer {
    #[instrument(skip(self, addresses), fields(depth = depth.as_str(), count = addresses.len()))]
    async fn analyze(
        &self,
        depth: AnalysisDepth,
        addresses: &NonEmpty<Pubkey>,
    ) -> Result<Vec<DeepAnalysis>, CallError> {
        let all: Vec<Pubkey> = addresses.iter().cloned().collect();
        let headers: Vec<(&'static str, String)> = self
            .api_key
            .iter()
            .map(|key| ("X-API-KEY", key.clone()))
            .chain(std::iter::once(("x-chain", "solana".to_string())))
            .collect();

        let mut merged: BTreeMap<Pubkey, serde_json::Map<String, serde_json::Value>> = all
            .iter()
            .map(|a| (a.clone(), serde_json::Map::new()))
            .collect();

        let sections = DEEP_SECTIONS
            .iter()
            .take(depth.calls_per_batch() as usize);
        let mut parts = Vec::new();
        for section in sections {
            let url = format!("{}/{}/multiple", self.base_url, section);
            for chunk in all.chunks(self.batch_limit) {
                let query = [("list_address", chunk.join(","))];
                let outcome = self
                    .gateway
                    .execute("deep_analysis", || {
                        get_json::<KeyedResponse>(&self.client, &url, &query, &headers)
                    })
                    .await;
                parts.push(outcome.result.map(|response| {
                    response
                        .data
                        .into_iter()
                        .map(|(address, value)| (address, *section, value))
                        .collect::<Vec<_>>()
                }));
            }
        }

        for (address, section, value) in keep_partial("deep_analysis", parts)? {
            if let Some(entry) = merged.get_mut(&address) {
                entry.insert(section.to_string(), value);
            }
        }

        Ok(merged
            .into_iter()
            .filter(|(_, sections)| !sections.is_empty())
            .map(|(address, sections)| DeepAnalysis {
                address,
                depth,
                sections,
            })
            .collect())
    }
}

/// The standard set of free sources, all sharing `gateway`.
pub fn default_sources(
    gateway: Arc<RequestGateway>,
    client: Client,
    config: &PipelineConfig,
) -> Vec<Arc<dyn SignalSource>> {
    let endpoints = &config.endpoints;
    vec![
        Arc::new(MarketBatchSource::new(
            gateway.clone(),
            client.clone(),
            endpoints.market_batch_url.clone(),
            config.expensive_batch_limit,
        )),
        Arc::new(ProfileSource::new(
            gateway.clone(),
            client.clone(),
            endpoints.profiles_url.clone(),
        )),
        Arc::new(BoostSource::new(
            gateway.clone(),
            client.clone(),
            endpoints.boosts_url.clone(),
        )),
        Arc::new(LiquiditySource::new(
            gateway.clone(),
            client.clone(),
            endpoints.liquidity_url.clone(),
            config.liquidity_item_cap,
        )),
        Arc::new(SecuritySource::new(
            gateway,
            client,
            endpoints.security_url.clone(),
            config.security_item_cap,
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_payload_to_record() {
        let json = r#"[{
            "chainId": "solana",
            "baseToken": {"address": "MintA", "name": "Cat", "symbol": "CAT"},
            "liquidity": {"usd": 80000.0},
            "marketCap": 50000.0,
            "volume": {"m5": 1200.0, "h1": 9000.0, "h24": 40000.0},
            "priceChange": {"m5": 3.5, "h1": 12.0},
            "txns": {"m5": {"buys": 10, "sells": 4}},
            "pairCreatedAt": 1700000000000
        }]"#;
        let pairs: Vec<DexPair> = serde_json::from_str(json).unwrap();
        let record = pairs[0].to_record(SourceKind::BatchMetadata, Utc::now());

        assert_eq!(record.address, "MintA");
        assert_eq!(record.symbol.as_deref(), Some("CAT"));
        assert_eq!(record.liquidity_usd, Some(80000.0));
        assert_eq!(record.volume.get(Timeframe::M5), Some(1200.0));
        assert_eq!(record.volume.get(Timeframe::M15), None);
        assert_eq!(record.volume.get(Timeframe::H6), None);
        assert_eq!(record.trades.get(Timeframe::M5), Some(14.0));
        assert!(record.pair_created_at.is_some());
    }

    #[test]
    fn test_deepest_pair_wins() {
        let json = r#"[
            {"baseToken": {"address": "MintA"}, "liquidity": {"usd": 100.0}},
            {"baseToken": {"address": "MintA"}, "liquidity": {"usd": 900.0}},
            {"baseToken": {"address": "MintB"}}
        ]"#;
        let pairs: Vec<DexPair> = serde_json::from_str(json).unwrap();
        let best = deepest_pairs(pairs);

        assert_eq!(best.len(), 2);
        assert_eq!(best["MintA"].liquidity_usd(), Some(900.0));
    }

    #[test]
    fn test_profile_social_score() {
        let json = r#"{
            "tokenAddress": "MintA",
            "description": "community cat",
            "links": [{"type": "twitter", "url": "https://x.com/cat"}, {"type": "telegram", "url": "https://t.me/cat"}, {"url": "https://cat.io"}]
        }"#;
        let listing: ProfileListing = serde_json::from_str(json).unwrap();
        assert!((listing.social_score() - 1.0).abs() < 1e-9);

        let bare: ProfileListing = serde_json::from_str(r#"{"tokenAddress": "MintB"}"#).unwrap();
        assert_eq!(bare.social_score(), 0.0);
    }

    #[test]
    fn test_security_report_flags_danger() {
        let json = r#"{"score_normalised": 30.0, "risks": [{"name": "Mint authority", "level": "danger"}]}"#;
        let report: SecurityReport = serde_json::from_str(json).unwrap();
        let record = report.to_record("MintA", Utc::now());

        assert_eq!(record.security_score, Some(70.0));
        assert_eq!(record.risk_flag, Some(RiskFlag::Risky));

        let clean: SecurityReport = serde_json::from_str(r#"{"risks": []}"#).unwrap();
        let record = clean.to_record("MintB", Utc::now());
        assert_eq!(record.security_score, None);
        assert_eq!(record.risk_flag, Some(RiskFlag::Safe));
    }

    #[test]
    fn test_keyed_response_parses() {
        let json = r#"{"success": true, "data": {"MintA": {"price": 1.5}, "MintB": null}}"#;
        let response: KeyedResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.data.len(), 2);
    }

    #[test]
    fn test_failed_chunk_keeps_other_chunks() {
        let parts = vec![
            Ok(vec!["MintA", "MintB"]),
            Err(CallError::ServerError { status: 502 }),
            Ok(vec!["MintC"]),
        ];
        assert_eq!(
            keep_partial("market_batch", parts).unwrap(),
            vec!["MintA", "MintB", "MintC"]
        );

        let all_failed: Vec<Result<Vec<&str>, CallError>> = vec![
            Err(CallError::ServerError { status: 502 }),
            Err(CallError::NetworkTransient("reset".to_string())),
        ];
        let error = keep_partial("market_batch", all_failed).unwrap_err();
        assert_eq!(error.kind(), crate::oracle::errors::ErrorKind::NetworkTransient);

        assert!(keep_partial::<&str>("market_batch", Vec::new()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_slow_address_does_not_hold_back_others() {
        let gateway = Arc::new(RequestGateway::new(crate::oracle::config::GatewayConfig {
            requests_per_minute: 6000,
            min_request_interval_ms: 0,
            max_retries: 1,
            call_timeout_ms: 300,
            ..Default::default()
        }));
        let addresses: Vec<Pubkey> = ["Slow1", "Stuck", "Slow2", "Slow3"]
            .iter()
            .map(|a| a.to_string())
            .collect();

        let started = std::time::Instant::now();
        let results = lookup_each(&gateway, "security", &addresses, |address: Pubkey| async move {
            let delay = if address == "Stuck" { 10_000 } else { 150 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok::<usize, CallError>(address.len())
        })
        .await;
        let elapsed = started.elapsed();

        // Run one after another this would take at least 750ms
        assert!(elapsed < Duration::from_millis(600), "took {:?}", elapsed);
        let order: Vec<&str> = results.iter().map(|(a, _)| a.as_str()).collect();
        assert_eq!(order, vec!["Slow1", "Stuck", "Slow2", "Slow3"]);
        assert_eq!(results[0].1.as_ref().ok(), Some(&5));
        assert!(matches!(results[1].1, Err(CallError::Timeout(_))));
        assert!(results[2].1.is_ok() && results[3].1.is_ok());
    }
}
