//! Trade synchronization pipeline.
//!
//! Work selection: positions flagged `NEED_TO_PULL_TRADES`, joined with
//! their batch watermarks. Per wallet, trades are fetched (full history on
//! first sync, `[watermark, now]` after), aggregated into daily rows, and
//! all results commit in one atomic step: trade inserts, status CASE
//! update, watermark CASE update, then the PnL CTE.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use polyscout_core::aggregation::aggregate_transactions;
use polyscout_core::api::ActivityApi;
use polyscout_core::db::trades::{StatusUpdate, TradeInsert, WatermarkUpdate};
use polyscout_core::db::{PositionRepository, TradeRepository};
use polyscout_core::types::{MarketNode, TradeStatus, WalletWithMarkets};
use polyscout_core::Result;

use crate::stats::TickStats;

pub struct TradeSyncScheduler {
    activity_api: ActivityApi,
    trades: TradeRepository,
    positions: PositionRepository,
    workers: usize,
}

impl TradeSyncScheduler {
    pub fn new(
        activity_api: ActivityApi,
        trades: TradeRepository,
        positions: PositionRepository,
        workers: usize,
    ) -> Self {
        Self {
            activity_api,
            trades,
            positions,
            workers,
        }
    }

    pub async fn tick(&self) -> Result<TickStats> {
        let started = Instant::now();
        let mut stats = TickStats::default();

        let wallets = self.trades.get_wallets_needing_trade_sync().await?;
        if wallets.is_empty() {
            info!("no wallets need trade sync");
            return Ok(stats);
        }

        info!(
            wallets = wallets.len(),
            workers = self.workers,
            "trade sync started"
        );

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut join_set: JoinSet<WalletWithMarkets> = JoinSet::new();

        for wallet in wallets {
            let semaphore = Arc::clone(&semaphore);
            let activity_api = self.activity_api.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                sync_wallet(&activity_api, wallet).await
            });
        }

        let mut synced_wallets: Vec<WalletWithMarkets> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(wallet) => {
                    stats.record_success();
                    synced_wallets.push(wallet);
                }
                Err(e) => stats.record_failure("sync task", &e),
            }
        }

        if let Err(e) = self.persist_results(&synced_wallets).await {
            error!(error = %e, "bulk persistence failed, next tick retries");
            stats.record_failure("bulk persistence", &e);
        }

        stats.finish(started);
        info!(
            duration_secs = stats.duration_seconds,
            succeeded = stats.succeeded,
            failed = stats.failed,
            "trade sync complete"
        );

        Ok(stats)
    }

    /// One atomic step for everything the fan-out produced.
    async fn persist_results(&self, wallets: &[WalletWithMarkets]) -> Result<()> {
        let (trade_inserts, status_updates, watermark_updates) = collect_sync_data(wallets);

        if trade_inserts.is_empty() && status_updates.is_empty() && watermark_updates.is_empty() {
            info!("no sync data to persist");
            return Ok(());
        }

        let mut tx = self.trades.pool().begin().await?;

        let trades_written = self
            .trades
            .bulk_insert_aggregated(&mut tx, &trade_inserts)
            .await?;
        let statuses_updated = self
            .trades
            .bulk_update_position_statuses(&mut tx, &status_updates)
            .await?;
        let watermarks_updated = self
            .trades
            .bulk_update_batch_watermarks(&mut tx, &watermark_updates)
            .await?;
        let pnl_updated = self
            .positions
            .bulk_update_pnl(
                &mut tx,
                TradeStatus::NeedToCalculatePnl,
                TradeStatus::TradesSynced,
            )
            .await?;

        tx.commit().await?;

        metrics::counter!("trade_sync_trades_written_total").increment(trades_written);
        info!(
            trades_written,
            statuses_updated, watermarks_updated, pnl_updated, "sync pipeline committed"
        );
        Ok(())
    }
}

/// Fetch and aggregate trades for every market of one wallet. Upstream
/// failures put the market back to `NEED_TO_PULL_TRADES` for the next tick.
async fn sync_wallet(activity_api: &ActivityApi, mut wallet: WalletWithMarkets) -> WalletWithMarkets {
    let proxy_wallet = wallet.proxy_wallet.clone();
    for market in wallet.markets.values_mut() {
        sync_market(activity_api, &proxy_wallet, market).await;
    }
    wallet
}

async fn sync_market(activity_api: &ActivityApi, proxy_wallet: &str, market: &mut MarketNode) {
    let fetched = if market.needs_full_trade_sync() {
        activity_api
            .fetch_all_trades(proxy_wallet, &market.condition_id)
            .await
    } else {
        let watermark = market
            .batch
            .and_then(|b| b.latest_fetched_time)
            .unwrap_or(0);
        activity_api
            .fetch_trades_in_range(
                proxy_wallet,
                &market.condition_id,
                watermark,
                Utc::now().timestamp(),
            )
            .await
    };

    let (transactions, latest_timestamp) = match fetched {
        Ok(result) => result,
        Err(e) => {
            warn!(
                market = %&market.condition_id[..market.condition_id.len().min(10)],
                error = %e,
                "trade fetch failed, market retried next tick"
            );
            market.mark_trade_status(TradeStatus::NeedToPullTrades);
            return;
        }
    };

    if transactions.is_empty() {
        // Successful but empty: nothing to aggregate, watermark untouched.
        market.mark_trade_status(TradeStatus::TradesSynced);
        return;
    }

    market.daily_trades = aggregate_transactions(&market.condition_id, &transactions);
    market.queue_trades_for_persistence();
    if let Some(latest_timestamp) = latest_timestamp {
        market.mark_batch_timestamp(latest_timestamp);
    }
    market.mark_trade_status(TradeStatus::NeedToCalculatePnl);
}

/// Flatten the per-wallet scratch state into the three bulk payloads.
pub fn collect_sync_data(
    wallets: &[WalletWithMarkets],
) -> (Vec<TradeInsert>, Vec<StatusUpdate>, Vec<WatermarkUpdate>) {
    let mut trade_inserts = Vec::new();
    let mut status_updates = Vec::new();
    let mut watermark_updates = Vec::new();

    for wallet in wallets {
        for market in wallet.markets.values() {
            let Some(market_id) = market.market_pk else {
                // A market we cannot key to the store cannot own trades.
                error!(
                    wallet = wallet.wallet_id,
                    market = %market.condition_id,
                    "missing market primary key, trades dropped"
                );
                continue;
            };

            for trade in &market.trades_to_persist {
                trade_inserts.push(TradeInsert {
                    wallet_id: wallet.wallet_id,
                    market_id,
                    trade: trade.clone(),
                });
            }

            if let Some(status) = market.new_trade_status {
                status_updates.push(StatusUpdate {
                    wallet_id: wallet.wallet_id,
                    market_id,
                    status,
                });
            }

            if let (Some(timestamp), Some(batch)) = (market.new_batch_timestamp, market.batch) {
                watermark_updates.push(WatermarkUpdate {
                    batch_id: batch.batch_id,
                    timestamp,
                });
            }
        }
    }

    (trade_inserts, status_updates, watermark_updates)
}
