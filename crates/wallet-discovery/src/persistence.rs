//! Transactional persistence for qualified wallets.

use sqlx::PgPool;
use tracing::info;

use polyscout_core::db::positions::NewPosition;
use polyscout_core::db::trades::TradeInsert;
use polyscout_core::db::{
    BatchRepository, EventRepository, MarketRepository, PositionRepository, TradeRepository,
    WalletRepository,
};
use polyscout_core::types::WalletType;
use polyscout_core::Result;

use crate::evaluation::EvaluationResult;

/// Persists an evaluated wallet and everything hanging off it (events,
/// markets, positions, trade aggregates, batch watermarks) in one
/// transaction. The wallet lands as OLD: its first full ingestion happened
/// during evaluation.
pub struct WalletPersistence {
    pool: PgPool,
    wallets: WalletRepository,
    events: EventRepository,
    markets: MarketRepository,
    positions: PositionRepository,
    trades: TradeRepository,
    batches: BatchRepository,
}

impl WalletPersistence {
    pub fn new(pool: PgPool) -> Self {
        Self {
            wallets: WalletRepository::new(pool.clone()),
            events: EventRepository::new(pool.clone()),
            markets: MarketRepository::new(pool.clone()),
            positions: PositionRepository::new(pool.clone()),
            trades: TradeRepository::new(pool.clone()),
            batches: BatchRepository::new(pool.clone()),
            pool,
        }
    }

    /// Persist a passed evaluation. Returns the wallet's store id.
    pub async fn persist_evaluation(&self, result: &EvaluationResult) -> Result<i64> {
        let candidate = &result.candidate;
        let mut tx = self.pool.begin().await?;

        let wallet_id = self
            .wallets
            .upsert_wallet(
                &mut tx,
                &candidate.proxy_wallet,
                &candidate.username,
                candidate.x_username.as_deref(),
                candidate.verified_badge,
                candidate.profile_image.as_deref(),
                WalletType::Old,
            )
            .await?;

        self.wallets
            .upsert_category_stats(
                &mut tx,
                wallet_id,
                &candidate.categories,
                "all",
                candidate.rank,
                candidate.all_time_volume,
                candidate.all_time_pnl,
            )
            .await?;

        let mut new_positions: Vec<NewPosition> = Vec::new();
        let mut trade_inserts: Vec<TradeInsert> = Vec::new();
        let mut watermarks: Vec<(i64, i64, Option<i64>)> = Vec::new();

        for event in result.hierarchy.values() {
            let event_id = self
                .events
                .upsert_event(&mut tx, &event.event_slug, &event.event_slug)
                .await?;

            for market in event.markets.values() {
                let market_id = self
                    .markets
                    .upsert_market(
                        &mut tx,
                        event_id,
                        &market.condition_id,
                        &market.market_slug,
                        &market.question,
                        market.end_date,
                    )
                    .await?;

                // Upstream occasionally reports an outcome in both the open
                // and closed lists; one row per (wallet, market, outcome),
                // open side first.
                let mut seen_outcomes: std::collections::HashSet<&str> =
                    std::collections::HashSet::new();
                for snapshot in &market.positions {
                    if !seen_outcomes.insert(snapshot.outcome.as_str()) {
                        continue;
                    }
                    new_positions.push(NewPosition {
                        wallet_id,
                        market_id,
                        condition_id: market.condition_id.clone(),
                        outcome: snapshot.outcome.clone(),
                        opposite_outcome: snapshot.opposite_outcome.clone(),
                        title: snapshot.title.clone(),
                        position_status: snapshot.position_status,
                        trade_status: snapshot.trade_status,
                        total_shares: snapshot.total_shares,
                        current_shares: snapshot.current_shares,
                        average_entry_price: snapshot.average_entry_price,
                        amount_spent: snapshot.amount_spent,
                        amount_remaining: snapshot.amount_remaining,
                        calculated_amount_invested: snapshot.calculated_amount_invested,
                        calculated_amount_out: snapshot.calculated_amount_out,
                        calculated_current_value: snapshot.calculated_current_value,
                        realized_pnl: snapshot.realized_pnl,
                        unrealized_pnl: snapshot.unrealized_pnl,
                        api_realized_pnl: snapshot.api_realized_pnl,
                        end_date: snapshot.end_date,
                        negative_risk: snapshot.negative_risk,
                        closed_at: snapshot.closed_at,
                    });
                }

                // Needs-trades markets carry aggregates and a watermark.
                if !market.daily_trades.is_empty() {
                    for day in market.daily_trades.values() {
                        for trade in day.all_trades() {
                            trade_inserts.push(TradeInsert {
                                wallet_id,
                                market_id,
                                trade: trade.clone(),
                            });
                        }
                    }
                    watermarks.push((wallet_id, market_id, market.new_batch_timestamp));
                }
            }
        }

        let positions_written = self
            .positions
            .bulk_upsert_positions(&mut tx, &new_positions)
            .await?;
        let trades_written = self
            .trades
            .bulk_insert_aggregated(&mut tx, &trade_inserts)
            .await?;
        let batches_written = self
            .batches
            .bulk_insert_watermarks(&mut tx, &watermarks)
            .await?;

        tx.commit().await?;

        info!(
            wallet = %candidate.short_address(),
            wallet_id,
            positions = positions_written,
            trades = trades_written,
            batches = batches_written,
            "persisted qualified wallet"
        );

        Ok(wallet_id)
    }
}
