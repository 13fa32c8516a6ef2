//! Demo entry point for the conviction oracle
//!
//! Scores the token addresses given on the command line against the live
//! free-tier providers and prints the verdicts.

use anyhow::Result;
use conviction_oracle::oracle::{PipelineBuilder, PipelineEvent};
use conviction_oracle::types::TokenCandidate;
use tokio::sync::mpsc;
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("Starting conviction oracle demo");

    let candidates: Vec<TokenCandidate> = std::env::args()
        .skip(1)
        .map(|address| TokenCandidate::new(address).with_discovery("cli", chrono::Utc::now()))
        .collect();
    if candidates.is_empty() {
        warn!("No token addresses given; pass one or more mint addresses as arguments");
        return Ok(());
    }

    let (event_tx, mut event_rx) = mpsc::channel::<PipelineEvent>(100);
    let pipeline = PipelineBuilder::new().with_events(event_tx).build()?;

    let listener = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                PipelineEvent::Conviction(alert) => info!(
                    "ALERT {} conviction {:.1} [{}] {}",
                    alert.address,
                    alert.conviction_score,
                    alert.priority_tier.as_str(),
                    alert.reasons.join("; ")
                ),
                PipelineEvent::Curve(alert) => info!(
                    "CURVE {} {:?} at {:.1}% of graduation",
                    alert.address,
                    alert.kind,
                    alert.progress * 100.0
                ),
            }
        }
    });

    let report = pipeline.process_batch(&candidates).await;
    for verdict in &report.verdicts {
        info!(
            "{}: conviction {:.1} (preliminary {:.1}, velocity {:.2}, {} confidence) -> {}",
            verdict.address,
            verdict.conviction_score,
            verdict.preliminary_score,
            verdict.velocity.score,
            verdict.confidence.level.as_str(),
            verdict.depth.as_str()
        );
        if let Some(prediction) = pipeline.predict_graduation(&verdict.address).await {
            info!(
                "  curve stage {:?}, {:.1}% to graduation",
                prediction.stage,
                prediction.progress * 100.0
            );
        }
    }
    for failure in &report.source_failures {
        warn!("Source {} failed: {:?}", failure.kind.as_str(), failure.error);
    }
    info!(
        "Routing plan: {} tokens routed, {} skipped, {:.1}% cost saving",
        report.plan.routed_count(),
        report.plan.skipped.len(),
        report.plan.cost_saving_percent
    );

    pipeline.shutdown().await;
    drop(pipeline);
    listener.await?;

    Ok(())
}
