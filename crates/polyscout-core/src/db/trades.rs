//! Trade and batch-watermark repository for the sync pipeline.

use std::collections::HashMap;

use sqlx::{PgConnection, PgPool, QueryBuilder, Row};

use super::BULK_CHUNK_SIZE;
use crate::aggregation::AggregatedTrade;
use crate::types::{BatchRef, PositionSnapshot, TradeStatus, WalletWithMarkets};
use crate::Result;

/// One aggregated trade bound to its owning wallet and market rows.
#[derive(Debug, Clone)]
pub struct TradeInsert {
    pub wallet_id: i64,
    pub market_id: i64,
    pub trade: AggregatedTrade,
}

/// Trade-status transition for every position of a (wallet, market) pair.
#[derive(Debug, Clone, Copy)]
pub struct StatusUpdate {
    pub wallet_id: i64,
    pub market_id: i64,
    pub status: TradeStatus,
}

/// Watermark advance for one batch row.
#[derive(Debug, Clone, Copy)]
pub struct WatermarkUpdate {
    pub batch_id: i64,
    pub timestamp: i64,
}

/// Repository for the `trades` table and the sync pipeline's bulk updates.
#[derive(Clone)]
pub struct TradeRepository {
    pool: PgPool,
}

impl TradeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Wallets with positions flagged `NEED_TO_PULL_TRADES`, with their
    /// markets, positions and batch watermarks, loaded in one join.
    pub async fn get_wallets_needing_trade_sync(&self) -> Result<Vec<WalletWithMarkets>> {
        self.load_wallets_by_trade_status(TradeStatus::NeedToPullTrades)
            .await
    }

    async fn load_wallets_by_trade_status(
        &self,
        status: TradeStatus,
    ) -> Result<Vec<WalletWithMarkets>> {
        let rows = sqlx::query(
            r#"
            SELECT
                p.wallet_id,
                p.market_id,
                p.condition_id,
                w.proxy_wallet,
                w.username,
                b.batch_id,
                b.latest_fetched_time,
                p.outcome,
                p.opposite_outcome,
                p.title,
                p.total_shares,
                p.current_shares,
                p.average_entry_price,
                p.amount_spent,
                p.amount_remaining,
                p.api_realized_pnl,
                p.end_date,
                p.negative_risk,
                p.position_status,
                p.trade_status,
                p.closed_at
            FROM positions p
            INNER JOIN wallets w ON p.wallet_id = w.wallet_id
            LEFT JOIN batches b
                ON p.wallet_id = b.wallet_id
               AND p.market_id = b.market_id
            WHERE p.trade_status = $1
            ORDER BY p.wallet_id, p.market_id, p.outcome
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        let mut wallets: HashMap<i64, WalletWithMarkets> = HashMap::new();
        for row in rows {
            let wallet_id: i64 = row.get("wallet_id");
            let wallet = wallets.entry(wallet_id).or_insert_with(|| {
                WalletWithMarkets::new(
                    wallet_id,
                    row.get::<String, _>("proxy_wallet"),
                    row.get::<Option<String>, _>("username").unwrap_or_default(),
                )
            });

            let condition_id: String = row.get("condition_id");
            let market = wallet.market_mut(&condition_id);
            if market.market_pk.is_none() {
                market.market_pk = Some(row.get("market_id"));
                let batch_id: Option<i64> = row.get("batch_id");
                if let Some(batch_id) = batch_id {
                    market.batch = Some(BatchRef {
                        batch_id,
                        latest_fetched_time: row.get("latest_fetched_time"),
                    });
                }
            }

            market.add_position(PositionSnapshot {
                outcome: row.get("outcome"),
                opposite_outcome: row.get("opposite_outcome"),
                title: row.get("title"),
                total_shares: row.get("total_shares"),
                current_shares: row.get("current_shares"),
                average_entry_price: row.get("average_entry_price"),
                amount_spent: row.get("amount_spent"),
                amount_remaining: row.get("amount_remaining"),
                api_realized_pnl: row.get("api_realized_pnl"),
                end_date: row.get("end_date"),
                negative_risk: row.get("negative_risk"),
                position_status: row.get("position_status"),
                trade_status: row.get("trade_status"),
                closed_at: row.get("closed_at"),
                calculated_amount_invested: Default::default(),
                calculated_amount_out: Default::default(),
                calculated_current_value: Default::default(),
                realized_pnl: Default::default(),
                unrealized_pnl: Default::default(),
            });
        }

        let mut result: Vec<WalletWithMarkets> = wallets.into_values().collect();
        result.sort_by_key(|w| w.wallet_id);
        Ok(result)
    }

    /// Bulk insert aggregated daily trades.
    ///
    /// The unique key is (wallet, market, type, outcome, day); an
    /// incremental sync landing on a day that already has a row folds the
    /// increment into it.
    pub async fn bulk_insert_aggregated(
        &self,
        conn: &mut PgConnection,
        inserts: &[TradeInsert],
    ) -> Result<u64> {
        let mut written = 0u64;

        for chunk in inserts.chunks(BULK_CHUNK_SIZE) {
            let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
                r#"
                INSERT INTO trades (
                    wallet_id, market_id, condition_id, trade_type, outcome,
                    total_shares, total_amount, trade_date, transaction_count
                )
                "#,
            );
            builder.push_values(chunk, |mut b, insert| {
                b.push_bind(insert.wallet_id)
                    .push_bind(insert.market_id)
                    .push_bind(&insert.trade.condition_id)
                    .push_bind(insert.trade.trade_type)
                    .push_bind(&insert.trade.outcome)
                    .push_bind(insert.trade.total_shares)
                    .push_bind(insert.trade.total_amount)
                    .push_bind(insert.trade.trade_date)
                    .push_bind(insert.trade.transaction_count);
            });
            builder.push(
                r#"
                ON CONFLICT (wallet_id, market_id, trade_type, outcome, trade_date)
                DO UPDATE SET
                    total_shares = trades.total_shares + EXCLUDED.total_shares,
                    total_amount = trades.total_amount + EXCLUDED.total_amount,
                    transaction_count = trades.transaction_count + EXCLUDED.transaction_count,
                    last_updated_at = NOW()
                "#,
            );

            let result = builder.build().execute(&mut *conn).await?;
            written += result.rows_affected();
        }

        Ok(written)
    }

    /// Transition trade statuses for many (wallet, market) pairs in one
    /// CASE-driven UPDATE.
    pub async fn bulk_update_position_statuses(
        &self,
        conn: &mut PgConnection,
        updates: &[StatusUpdate],
    ) -> Result<u64> {
        let mut updated = 0u64;

        for chunk in updates.chunks(BULK_CHUNK_SIZE) {
            let mut builder: QueryBuilder<sqlx::Postgres> =
                QueryBuilder::new("UPDATE positions SET trade_status = CASE ");
            for update in chunk {
                builder.push("WHEN (wallet_id = ");
                builder.push_bind(update.wallet_id);
                builder.push(" AND market_id = ");
                builder.push_bind(update.market_id);
                builder.push(") THEN ");
                builder.push_bind(update.status);
                builder.push(" ");
            }
            builder.push("ELSE trade_status END, last_updated_at = NOW() WHERE ");
            for (i, update) in chunk.iter().enumerate() {
                if i > 0 {
                    builder.push(" OR ");
                }
                builder.push("(wallet_id = ");
                builder.push_bind(update.wallet_id);
                builder.push(" AND market_id = ");
                builder.push_bind(update.market_id);
                builder.push(")");
            }

            let result = builder.build().execute(&mut *conn).await?;
            updated += result.rows_affected();
        }

        Ok(updated)
    }

    /// Advance batch watermarks in one CASE-driven UPDATE.
    pub async fn bulk_update_batch_watermarks(
        &self,
        conn: &mut PgConnection,
        updates: &[WatermarkUpdate],
    ) -> Result<u64> {
        let mut updated = 0u64;

        for chunk in updates.chunks(BULK_CHUNK_SIZE) {
            let mut builder: QueryBuilder<sqlx::Postgres> =
                QueryBuilder::new("UPDATE batches SET latest_fetched_time = CASE ");
            for update in chunk {
                builder.push("WHEN batch_id = ");
                builder.push_bind(update.batch_id);
                builder.push(" THEN ");
                builder.push_bind(update.timestamp);
                builder.push(" ");
            }
            builder.push("ELSE latest_fetched_time END, last_updated_at = NOW() WHERE batch_id IN (");
            let mut separated = builder.separated(", ");
            for update in chunk {
                separated.push_bind(update.batch_id);
            }
            builder.push(")");

            let result = builder.build().execute(&mut *conn).await?;
            updated += result.rows_affected();
        }

        Ok(updated)
    }

    /// Markets (by store id) with at least one trade on or after the cutoff
    /// date, for one wallet.
    pub async fn get_markets_with_recent_trades(
        &self,
        wallet_id: i64,
        cutoff_date: chrono::NaiveDate,
    ) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT market_id FROM trades
            WHERE wallet_id = $1 AND trade_date >= $2
            "#,
        )
        .bind(wallet_id)
        .bind(cutoff_date)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.get("market_id")).collect())
    }
}
