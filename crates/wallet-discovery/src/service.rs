//! Discovery orchestration: fetch candidates, evaluate, persist.

use std::time::Instant;

use rust_decimal::Decimal;
use tracing::{error, info, warn};

use polyscout_core::Result;

use crate::candidates::CandidateFetcher;
use crate::evaluation::WalletEvaluator;
use crate::persistence::WalletPersistence;

/// Per-run summary returned to the caller (and exposed by the trigger
/// surface).
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    pub candidates_found: usize,
    pub qualified: usize,
    pub rejected: usize,
    pub persisted: usize,
    pub failed: usize,
    pub duration_seconds: f64,
    pub error_samples: Vec<String>,
}

/// Full discovery pipeline, one candidate at a time.
pub struct DiscoveryService {
    fetcher: CandidateFetcher,
    evaluator: WalletEvaluator,
    persistence: WalletPersistence,
}

impl DiscoveryService {
    pub fn new(
        fetcher: CandidateFetcher,
        evaluator: WalletEvaluator,
        persistence: WalletPersistence,
    ) -> Self {
        Self {
            fetcher,
            evaluator,
            persistence,
        }
    }

    /// Run the pipeline with the given leaderboard PnL floor.
    ///
    /// A failure on one candidate never stops the run; it is counted and
    /// sampled into the report.
    pub async fn discover_and_persist(&self, min_pnl: Decimal) -> Result<DiscoveryReport> {
        let started = Instant::now();
        let mut report = DiscoveryReport::default();

        let candidates = self.fetcher.fetch_candidates(min_pnl).await?;
        report.candidates_found = candidates.len();

        if candidates.is_empty() {
            warn!("no candidates found on leaderboard");
            report.duration_seconds = started.elapsed().as_secs_f64();
            return Ok(report);
        }

        info!(candidates = candidates.len(), "processing candidates");

        for candidate in candidates {
            let wallet = candidate.short_address().to_string();
            match self.evaluator.evaluate(candidate).await {
                Ok(result) if result.passed => {
                    report.qualified += 1;
                    match self.persistence.persist_evaluation(&result).await {
                        Ok(_) => {
                            report.persisted += 1;
                            metrics::counter!("discovery_wallets_persisted_total").increment(1);
                        }
                        Err(e) => {
                            report.failed += 1;
                            if report.error_samples.len() < 5 {
                                report.error_samples.push(format!("{wallet}: {e}"));
                            }
                            error!(%wallet, error = %e, "persistence failed");
                        }
                    }
                }
                Ok(result) => {
                    report.rejected += 1;
                    info!(
                        %wallet,
                        reason = result.fail_reason.as_deref().unwrap_or("unknown"),
                        "candidate rejected"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    if report.error_samples.len() < 5 {
                        report.error_samples.push(format!("{wallet}: {e}"));
                    }
                    warn!(%wallet, error = %e, "evaluation failed");
                }
            }
        }

        report.duration_seconds = started.elapsed().as_secs_f64();
        info!(
            qualified = report.qualified,
            persisted = report.persisted,
            rejected = report.rejected,
            failed = report.failed,
            duration_secs = report.duration_seconds,
            "discovery pipeline complete"
        );

        Ok(report)
    }
}
