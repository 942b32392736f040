//! Wallet PnL scheduler.
//!
//! Bulk-loads position/market/event/trade state for every target wallet in
//! one join, then computes and upserts a `wallet_pnl` row per
//! (wallet, period) across a bounded worker pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use polyscout_core::db::wallet_pnl::PnlUpsert;
use polyscout_core::db::{WalletPnlRepository, WalletRepository};
use polyscout_core::types::EventNode;
use polyscout_core::Result;

use crate::pnl::{calculate_pnl, calculate_winrate, PnlCalculation};
use crate::stats::TickStats;

pub const DEFAULT_PERIODS: [i64; 3] = [30, 60, 90];

pub struct WalletPnlScheduler {
    wallets: WalletRepository,
    pnl_repo: WalletPnlRepository,
    workers: usize,
}

impl WalletPnlScheduler {
    pub fn new(wallets: WalletRepository, pnl_repo: WalletPnlRepository, workers: usize) -> Self {
        Self {
            wallets,
            pnl_repo,
            workers,
        }
    }

    /// Run the PnL calculation, optionally restricted to specific wallets
    /// and periods (the on-demand trigger path passes both).
    pub async fn tick(
        &self,
        wallet_ids: Option<Vec<i64>>,
        periods: Option<Vec<i64>>,
    ) -> Result<TickStats> {
        let started = Instant::now();
        let mut stats = TickStats::default();
        let periods = periods.unwrap_or_else(|| DEFAULT_PERIODS.to_vec());
        let now = Utc::now();

        let wallets = self.wallets.get_active_wallets(wallet_ids.as_deref()).await?;
        if wallets.is_empty() {
            info!("no wallets for pnl calculation");
            return Ok(stats);
        }

        let max_period = periods.iter().copied().max().unwrap_or(90);
        let min_cutoff_date = (now - Duration::days(max_period)).date_naive();
        let ids: Vec<i64> = wallets.iter().map(|w| w.wallet_id).collect();

        info!(
            wallets = wallets.len(),
            calculations = wallets.len() * periods.len(),
            workers = self.workers,
            ?periods,
            "pnl scheduler started"
        );

        // One join loads everything; tasks only read their wallet's slice.
        let hierarchies: Arc<HashMap<i64, HashMap<String, EventNode>>> =
            Arc::new(self.pnl_repo.load_pnl_data(&ids, min_cutoff_date).await?);

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut join_set: JoinSet<(i64, i64, Result<()>)> = JoinSet::new();

        for wallet in &wallets {
            for &period in &periods {
                let wallet_id = wallet.wallet_id;
                let semaphore = Arc::clone(&semaphore);
                let hierarchies = Arc::clone(&hierarchies);
                let pnl_repo = self.pnl_repo.clone();
                join_set.spawn(async move {
                    let _permit = semaphore.acquire().await.expect("semaphore closed");
                    let empty = HashMap::new();
                    let hierarchy = hierarchies.get(&wallet_id).unwrap_or(&empty);
                    let calculation = calculate_pnl(hierarchy, period, now);
                    let outcome = pnl_repo
                        .upsert_wallet_pnl(&build_upsert(wallet_id, period, &calculation, now))
                        .await;
                    (wallet_id, period, outcome)
                });
            }
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((_, _, Ok(()))) => stats.record_success(),
                Ok((wallet_id, period, Err(e))) => {
                    warn!(wallet_id, period, error = %e, "pnl calculation failed");
                    stats.record_failure(&format!("wallet {wallet_id} period {period}"), &e);
                }
                Err(e) => stats.record_failure("pnl task", &e),
            }
        }

        stats.finish(started);
        metrics::counter!("wallet_pnl_calculations_total").increment(stats.succeeded);
        info!(
            duration_secs = stats.duration_seconds,
            succeeded = stats.succeeded,
            failed = stats.failed,
            "pnl scheduler complete"
        );

        Ok(stats)
    }
}

fn build_upsert(
    wallet_id: i64,
    period: i64,
    calculation: &PnlCalculation,
    now: chrono::DateTime<Utc>,
) -> PnlUpsert {
    // Win/loss inputs are produced by a downstream analytics pass; the core
    // carries them as zero, which persists NULL winrates ("no bets").
    let (realized_winrate, realized_odds) = calculate_winrate(0, 0);
    let (unrealized_winrate, unrealized_odds) = calculate_winrate(0, 0);
    let (high_volume_winrate, high_volume_odds) = calculate_winrate(0, 0);

    PnlUpsert {
        wallet_id,
        period: period as i16,
        start_time: calculation.start_time.unwrap_or(now),
        end_time: calculation.end_time.unwrap_or(now),
        open_amount_invested: calculation.open_amount_invested,
        open_amount_out: calculation.open_amount_out,
        open_current_value: calculation.open_current_value,
        closed_amount_invested: calculation.closed_amount_invested,
        closed_amount_out: calculation.closed_amount_out,
        closed_current_value: calculation.closed_current_value,
        total_invested_amount: calculation.total_invested_amount,
        total_amount_out: calculation.total_amount_out,
        total_current_value: calculation.total_current_value,
        realized_winrate,
        realized_winrate_odds: realized_odds,
        unrealized_winrate,
        unrealized_winrate_odds: unrealized_odds,
        high_volume_winrate,
        high_volume_winrate_odds: high_volume_odds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_totals_are_consistent() {
        use rust_decimal_macros::dec;

        let now = Utc::now();
        let calculation = PnlCalculation {
            open_amount_invested: dec!(10),
            open_amount_out: dec!(4),
            open_current_value: dec!(9),
            closed_amount_invested: dec!(6),
            closed_amount_out: dec!(8),
            total_invested_amount: dec!(16),
            total_amount_out: dec!(12),
            total_current_value: dec!(9),
            start_time: Some(now - Duration::days(30)),
            end_time: Some(now),
            ..Default::default()
        };
        let upsert = build_upsert(5, 30, &calculation, now);
        assert_eq!(upsert.period, 30);
        assert_eq!(
            upsert.total_invested_amount,
            upsert.open_amount_invested + upsert.closed_amount_invested
        );
        assert_eq!(
            upsert.total_amount_out,
            upsert.open_amount_out + upsert.closed_amount_out
        );
        assert_eq!(upsert.total_current_value, upsert.open_current_value);
        // No bets recorded by the core: winrates persist as NULL.
        assert!(upsert.realized_winrate.is_none());
        assert!(upsert.realized_winrate_odds.is_none());
    }
}
