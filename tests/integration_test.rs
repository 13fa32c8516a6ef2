//! End-to-end tests for the conviction pipeline with in-process sources

use async_trait::async_trait;
use chrono::{Duration, Utc};
use conviction_oracle::oracle::{
    AnalysisDepth, CallError, ConfidenceLevel, ErrorKind, FreeTierRouter, GatewayConfig,
    PipelineBuilder, PipelineConfig, PipelineEvent, PriorityTier, RiskFlag, SignalSource,
    SourceKind, SourceRecord, TimeframeSeries,
};
use conviction_oracle::types::{Pubkey, Timeframe, TokenCandidate};
use std::sync::Arc;
use tokio::sync::mpsc;

struct StaticSource {
    kind: SourceKind,
    records: Vec<SourceRecord>,
}

#[async_trait]
impl SignalSource for StaticSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn name(&self) -> &str {
        self.kind.as_str()
    }

    async fn fetch(&self, addresses: &[Pubkey]) -> Result<Vec<SourceRecord>, CallError> {
        Ok(self
            .records
            .iter()
            .filter(|r| addresses.contains(&r.address))
            .cloned()
            .collect())
    }
}

struct DownSource;

#[async_trait]
impl SignalSource for DownSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Liquidity
    }

    fn name(&self) -> &str {
        "liquidity"
    }

    async fn fetch(&self, _addresses: &[Pubkey]) -> Result<Vec<SourceRecord>, CallError> {
        Err(CallError::ServerError { status: 503 })
    }
}

fn create_test_config() -> PipelineConfig {
    PipelineConfig {
        gateway: GatewayConfig {
            requests_per_minute: 6000,
            min_request_interval_ms: 0,
            ..GatewayConfig::default()
        },
        ..PipelineConfig::default()
    }
}

/// Free-tier records for one token: security, social, boost and liquidity.
fn signal_sources(address: &str, security: f64, social: f64, boost: f64, liquidity: f64) -> Vec<Arc<dyn SignalSource>> {
    let now = Utc::now();
    vec![
        Arc::new(StaticSource {
            kind: SourceKind::Security,
            records: vec![SourceRecord::new(address, SourceKind::Security, now).with_security(security, RiskFlag::Safe)],
        }),
        Arc::new(StaticSource {
            kind: SourceKind::SocialProfile,
            records: vec![SourceRecord::new(address, SourceKind::SocialProfile, now).with_social(social)],
        }),
        Arc::new(StaticSource {
            kind: SourceKind::Boost,
            records: vec![SourceRecord::new(address, SourceKind::Boost, now).with_boost(boost)],
        }),
        Arc::new(StaticSource {
            kind: SourceKind::Liquidity,
            records: vec![SourceRecord::new(address, SourceKind::Liquidity, now).with_liquidity(liquidity)],
        }),
    ]
}

fn series(values: [f64; 6]) -> TimeframeSeries {
    let mut series = TimeframeSeries::new();
    for (tf, v) in Timeframe::all().into_iter().zip(values) {
        series.set(tf, v);
    }
    series
}

/// Market record with accelerating activity across all six timeframes.
fn hot_market(address: &str) -> SourceRecord {
    let mut market = SourceRecord::new(address, SourceKind::BatchMetadata, Utc::now());
    market.volume = series([5_000.0, 6_000.0, 6_000.0, 6_000.0, 18_000.0, 36_000.0]);
    market.price_change = series([8.0, 12.0, 15.0, 18.0, 25.0, 30.0]);
    market.trades = series([100.0, 200.0, 300.0, 400.0, 900.0, 1_500.0]);
    market.unique_traders = Some(120.0);
    market
}

#[tokio::test]
async fn test_strong_signals_route_comprehensive() {
    // security 85, social 0.8, boost activity 0.6 (300 of 500), liquidity 80k
    let router = FreeTierRouter::new(
        signal_sources("MintA", 85.0, 0.8, 300.0, 80_000.0),
        Arc::new(create_test_config()),
    );
    let report = router.route(&[TokenCandidate::new("MintA")]).await;

    let score = &report.scores[0];
    assert!((score.score - 78.0).abs() < 1e-9);
    assert_eq!(score.priority, PriorityTier::Critical);
    assert_eq!(score.depth, AnalysisDepth::Comprehensive);
    assert!(report.failures.is_empty());
}

#[tokio::test]
async fn test_token_without_signals_is_skipped() {
    let pipeline = PipelineBuilder::from_config(create_test_config())
        .with_sources(signal_sources("Other", 85.0, 0.8, 300.0, 80_000.0))
        .build()
        .unwrap();

    let report = pipeline.process_batch(&[TokenCandidate::new("Unknown")]).await;
    let verdict = report.verdict("Unknown").unwrap();
    assert_eq!(verdict.conviction_score, 0.0);
    assert_eq!(verdict.depth, AnalysisDepth::Skip);
    assert_eq!(report.plan.skipped, vec!["Unknown".to_string()]);
    assert_eq!(report.plan.estimated_cost, 0.0);
    assert!(report.alerts.is_empty());
}

#[tokio::test]
async fn test_flat_measured_market_scores_zero() {
    let mut flat = SourceRecord::new("Flat", SourceKind::BatchMetadata, Utc::now());
    flat.volume = series([0.0; 6]);
    flat.price_change = series([0.0; 6]);
    flat.trades = series([0.0; 6]);
    flat.unique_traders = Some(0.0);
    let sources: Vec<Arc<dyn SignalSource>> = vec![Arc::new(StaticSource {
        kind: SourceKind::BatchMetadata,
        records: vec![flat],
    })];
    let pipeline = PipelineBuilder::from_config(create_test_config())
        .with_sources(sources)
        .build()
        .unwrap();

    let report = pipeline.process_batch(&[TokenCandidate::new("Flat")]).await;
    let verdict = report.verdict("Flat").unwrap();
    assert_eq!(verdict.confidence.level, ConfidenceLevel::High);
    assert_eq!(verdict.conviction_score, 0.0);
    assert_eq!(verdict.depth, AnalysisDepth::Skip);
    assert_eq!(report.plan.skipped, vec!["Flat".to_string()]);
}

#[tokio::test]
async fn test_failing_source_degrades_gracefully() {
    let now = Utc::now();
    let sources: Vec<Arc<dyn SignalSource>> = vec![
        Arc::new(StaticSource {
            kind: SourceKind::Security,
            records: vec![SourceRecord::new("MintA", SourceKind::Security, now).with_security(100.0, RiskFlag::Safe)],
        }),
        Arc::new(DownSource),
    ];
    let pipeline = PipelineBuilder::from_config(create_test_config())
        .with_sources(sources)
        .build()
        .unwrap();

    let report = pipeline.process_batch(&[TokenCandidate::new("MintA")]).await;
    assert_eq!(report.source_failures.len(), 1);
    assert_eq!(report.source_failures[0].kind, SourceKind::Liquidity);
    assert_eq!(report.source_failures[0].error, Some(ErrorKind::ServerError));

    // Security alone: 40 preliminary points
    let verdict = report.verdict("MintA").unwrap();
    assert!((verdict.preliminary_score - 40.0).abs() < 1e-9);
    assert!((verdict.conviction_score - 28.0).abs() < 1e-9);
    assert!(verdict.conviction_score >= 0.0 && verdict.conviction_score <= 100.0);

    let profile = pipeline.cached_profile("MintA").await.unwrap();
    assert!(!profile.liquidity_usd.is_measured());
}

#[tokio::test]
async fn test_early_detection_lowers_alert_threshold() {
    let now = Utc::now();
    let mut market = SourceRecord::new("Fresh", SourceKind::BatchMetadata, now);
    market.price_change = TimeframeSeries::new()
        .with(Timeframe::M5, 6.0)
        .with(Timeframe::M15, 9.0);
    market.volume = TimeframeSeries::new()
        .with(Timeframe::M5, 2_000.0)
        .with(Timeframe::M15, 3_000.0);

    let mut sources = signal_sources("Fresh", 85.0, 0.8, 300.0, 80_000.0);
    sources.push(Arc::new(StaticSource {
        kind: SourceKind::BatchMetadata,
        records: vec![market],
    }));

    let pipeline = PipelineBuilder::from_config(create_test_config())
        .with_sources(sources)
        .build()
        .unwrap();

    let seen_late = TokenCandidate::new("Fresh");
    let seen_early = TokenCandidate::new("Fresh").with_discovery("pump.fun", now - Duration::minutes(10));

    let unknown_age = pipeline.process_batch(&[seen_late]).await;
    let early = pipeline.process_batch(&[seen_early]).await;

    let unknown_age = unknown_age.verdict("Fresh").unwrap();
    let early = early.verdict("Fresh").unwrap();
    assert_eq!(early.confidence.level, ConfidenceLevel::EarlyDetection);
    assert_eq!(unknown_age.confidence.level, ConfidenceLevel::Low);
    assert!((early.conviction_score - unknown_age.conviction_score).abs() < 1e-9);
    assert!(early.alert_threshold < unknown_age.alert_threshold);
    assert!(early.priority >= unknown_age.priority);
}

#[tokio::test]
async fn test_events_flow_through_intake_loop() {
    let mut market = hot_market("Runner");
    market.market_cap = Some(66_000.0);
    let mut sources = signal_sources("Runner", 100.0, 1.0, 500.0, 100_000.0);
    sources.push(Arc::new(StaticSource {
        kind: SourceKind::BatchMetadata,
        records: vec![market],
    }));

    let (event_tx, mut event_rx) = mpsc::channel(16);
    let pipeline = PipelineBuilder::from_config(create_test_config())
        .with_sources(sources)
        .with_events(event_tx)
        .build()
        .unwrap();

    let (candidate_tx, candidate_rx) = mpsc::channel(4);
    candidate_tx.send(TokenCandidate::new("Runner")).await.unwrap();
    drop(candidate_tx);
    pipeline.run(candidate_rx).await;
    drop(pipeline);

    let mut conviction = 0;
    let mut curve = 0;
    while let Some(event) = event_rx.recv().await {
        match event {
            PipelineEvent::Conviction(alert) => {
                assert_eq!(alert.address, "Runner");
                conviction += 1;
            }
            PipelineEvent::Curve(alert) => {
                assert!(alert.progress > 0.94);
                curve += 1;
            }
        }
    }
    assert_eq!(conviction, 1);
    assert_eq!(curve, 1);
}
