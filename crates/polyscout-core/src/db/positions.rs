//! Position repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, QueryBuilder, Row};

use super::BULK_CHUNK_SIZE;
use crate::types::{Position, PositionStatus, TradeStatus};
use crate::Result;

/// A position row to insert or refresh during discovery persistence.
#[derive(Debug, Clone)]
pub struct NewPosition {
    pub wallet_id: i64,
    pub market_id: i64,
    pub condition_id: String,
    pub outcome: String,
    pub opposite_outcome: String,
    pub title: String,
    pub position_status: PositionStatus,
    pub trade_status: TradeStatus,
    pub total_shares: Decimal,
    pub current_shares: Decimal,
    pub average_entry_price: Decimal,
    pub amount_spent: Decimal,
    pub amount_remaining: Decimal,
    pub calculated_amount_invested: Decimal,
    pub calculated_amount_out: Decimal,
    pub calculated_current_value: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub api_realized_pnl: Option<Decimal>,
    pub end_date: Option<DateTime<Utc>>,
    pub negative_risk: bool,
    pub closed_at: Option<i64>,
}

/// Snapshot-field changes produced by position reconciliation.
#[derive(Debug, Clone)]
pub struct PositionSnapshotUpdate {
    pub position_id: i64,
    pub position_status: PositionStatus,
    pub trade_status: TradeStatus,
    pub total_shares: Decimal,
    pub current_shares: Decimal,
    pub average_entry_price: Decimal,
    pub amount_spent: Decimal,
    pub amount_remaining: Decimal,
}

/// Work item for the recently-closed enrichment scheduler.
#[derive(Debug, Clone)]
pub struct RecentlyClosedPosition {
    pub position_id: i64,
    pub wallet_id: i64,
    pub proxy_wallet: String,
    pub market_id: i64,
    pub condition_id: String,
    pub outcome: String,
}

/// Enrichment result applied to a recently-closed position.
#[derive(Debug, Clone)]
pub struct ClosedPositionUpdate {
    pub position_id: i64,
    pub total_shares: Decimal,
    pub average_entry_price: Decimal,
    pub amount_spent: Decimal,
    pub api_realized_pnl: Option<Decimal>,
    pub closed_at: Option<i64>,
}

/// Repository for the `positions` table.
#[derive(Clone)]
pub struct PositionRepository {
    pool: PgPool,
}

impl PositionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Bulk upsert positions on (wallet, market, outcome). Snapshot fields
    /// are refreshed on conflict; calculated fields are left to the
    /// set-based updates.
    pub async fn bulk_upsert_positions(
        &self,
        conn: &mut PgConnection,
        positions: &[NewPosition],
    ) -> Result<u64> {
        let mut written = 0u64;

        for chunk in positions.chunks(BULK_CHUNK_SIZE) {
            let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
                r#"
                INSERT INTO positions (
                    wallet_id, market_id, condition_id, outcome, opposite_outcome,
                    title, position_status, trade_status, total_shares, current_shares,
                    average_entry_price, amount_spent, amount_remaining,
                    calculated_amount_invested, calculated_amount_out,
                    calculated_current_value, realized_pnl, unrealized_pnl,
                    api_realized_pnl, end_date, negative_risk, closed_at
                )
                "#,
            );
            builder.push_values(chunk, |mut b, p| {
                b.push_bind(p.wallet_id)
                    .push_bind(p.market_id)
                    .push_bind(&p.condition_id)
                    .push_bind(&p.outcome)
                    .push_bind(&p.opposite_outcome)
                    .push_bind(&p.title)
                    .push_bind(p.position_status)
                    .push_bind(p.trade_status)
                    .push_bind(p.total_shares)
                    .push_bind(p.current_shares)
                    .push_bind(p.average_entry_price)
                    .push_bind(p.amount_spent)
                    .push_bind(p.amount_remaining)
                    .push_bind(p.calculated_amount_invested)
                    .push_bind(p.calculated_amount_out)
                    .push_bind(p.calculated_current_value)
                    .push_bind(p.realized_pnl)
                    .push_bind(p.unrealized_pnl)
                    .push_bind(p.api_realized_pnl)
                    .push_bind(p.end_date)
                    .push_bind(p.negative_risk)
                    .push_bind(p.closed_at);
            });
            builder.push(
                r#"
                ON CONFLICT (wallet_id, market_id, outcome) DO UPDATE SET
                    position_status = EXCLUDED.position_status,
                    trade_status = EXCLUDED.trade_status,
                    total_shares = EXCLUDED.total_shares,
                    current_shares = EXCLUDED.current_shares,
                    average_entry_price = EXCLUDED.average_entry_price,
                    amount_spent = EXCLUDED.amount_spent,
                    amount_remaining = EXCLUDED.amount_remaining,
                    api_realized_pnl = EXCLUDED.api_realized_pnl,
                    end_date = EXCLUDED.end_date,
                    negative_risk = EXCLUDED.negative_risk,
                    closed_at = EXCLUDED.closed_at,
                    last_updated_at = NOW()
                "#,
            );

            let result = builder.build().execute(&mut *conn).await?;
            written += result.rows_affected();
        }

        Ok(written)
    }

    /// A wallet's positions in one status.
    pub async fn get_positions_by_status(
        &self,
        wallet_id: i64,
        status: PositionStatus,
    ) -> Result<Vec<Position>> {
        let positions = sqlx::query_as::<_, Position>(
            "SELECT * FROM positions WHERE wallet_id = $1 AND position_status = $2",
        )
        .bind(wallet_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(positions)
    }

    /// Apply reconciliation changes for one wallet in a single statement.
    pub async fn bulk_update_snapshots(
        &self,
        updates: &[PositionSnapshotUpdate],
    ) -> Result<u64> {
        let mut updated = 0u64;

        for chunk in updates.chunks(BULK_CHUNK_SIZE) {
            let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
                r#"
                UPDATE positions AS p SET
                    position_status = v.position_status,
                    trade_status = v.trade_status,
                    total_shares = v.total_shares,
                    current_shares = v.current_shares,
                    average_entry_price = v.average_entry_price,
                    amount_spent = v.amount_spent,
                    amount_remaining = v.amount_remaining,
                    last_updated_at = NOW()
                FROM (
                "#,
            );
            builder.push_values(chunk, |mut b, u| {
                b.push_bind(u.position_id)
                    .push_bind(u.position_status)
                    .push_bind(u.trade_status)
                    .push_bind(u.total_shares)
                    .push_bind(u.current_shares)
                    .push_bind(u.average_entry_price)
                    .push_bind(u.amount_spent)
                    .push_bind(u.amount_remaining);
            });
            builder.push(
                r#"
                ) AS v(
                    position_id, position_status, trade_status, total_shares,
                    current_shares, average_entry_price, amount_spent, amount_remaining
                )
                WHERE p.position_id = v.position_id
                "#,
            );

            let result = builder.build().execute(&self.pool).await?;
            updated += result.rows_affected();
        }

        Ok(updated)
    }

    /// Recompute the market-wise current value for every (wallet, market)
    /// pair holding at least one open position, in one CTE-driven UPDATE.
    ///
    /// Reconciliation only refreshes `amount_remaining` per position; this
    /// re-derives the denormalized per-market sum across all rows of the
    /// pair.
    pub async fn update_calculated_current_values(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            WITH market_wallet_totals AS (
                SELECT
                    p.market_id,
                    p.wallet_id,
                    SUM(p.amount_remaining) AS total_current_value
                FROM positions p
                WHERE EXISTS (
                    SELECT 1
                    FROM positions p2
                    WHERE p2.market_id = p.market_id
                      AND p2.wallet_id = p.wallet_id
                      AND p2.position_status = $1
                )
                GROUP BY p.market_id, p.wallet_id
            )
            UPDATE positions
            SET calculated_current_value = market_wallet_totals.total_current_value
            FROM market_wallet_totals
            WHERE positions.market_id = market_wallet_totals.market_id
              AND positions.wallet_id = market_wallet_totals.wallet_id
            "#,
        )
        .bind(PositionStatus::Open)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Derive invested/out/realized PnL from trade aggregates for every
    /// position in `filter_status`, transitioning it to `final_status`.
    /// One atomic CTE-driven UPDATE.
    pub async fn bulk_update_pnl(
        &self,
        conn: &mut PgConnection,
        filter_status: TradeStatus,
        final_status: TradeStatus,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            WITH trade_aggregates AS (
                SELECT
                    t.wallet_id,
                    t.market_id,
                    SUM(CASE WHEN t.total_amount < 0 THEN ABS(t.total_amount) ELSE 0 END) AS total_invested,
                    SUM(CASE WHEN t.total_amount >= 0 THEN t.total_amount ELSE 0 END) AS total_out
                FROM trades t
                INNER JOIN positions p
                    ON t.wallet_id = p.wallet_id
                   AND t.market_id = p.market_id
                WHERE p.trade_status = $1
                GROUP BY t.wallet_id, t.market_id
            )
            UPDATE positions
            SET
                calculated_amount_invested = ta.total_invested,
                calculated_amount_out = ta.total_out,
                realized_pnl = ta.total_out - ta.total_invested,
                trade_status = $2,
                last_updated_at = NOW()
            FROM trade_aggregates ta
            WHERE positions.wallet_id = ta.wallet_id
              AND positions.market_id = ta.market_id
            "#,
        )
        .bind(filter_status)
        .bind(final_status)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Positions flagged as closed upstream and awaiting enrichment.
    pub async fn get_recently_closed(&self) -> Result<Vec<RecentlyClosedPosition>> {
        let rows = sqlx::query(
            r#"
            SELECT
                p.position_id,
                p.wallet_id,
                w.proxy_wallet,
                p.market_id,
                p.condition_id,
                p.outcome
            FROM positions p
            INNER JOIN wallets w ON p.wallet_id = w.wallet_id
            WHERE p.trade_status = $1
            ORDER BY p.wallet_id, p.market_id, p.outcome
            "#,
        )
        .bind(TradeStatus::PositionClosedNeedData)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| RecentlyClosedPosition {
                position_id: row.get("position_id"),
                wallet_id: row.get("wallet_id"),
                proxy_wallet: row.get("proxy_wallet"),
                market_id: row.get("market_id"),
                condition_id: row.get("condition_id"),
                outcome: row.get("outcome"),
            })
            .collect())
    }

    /// Apply enrichment results: positions become CLOSED / TRADES_SYNCED
    /// with zero current shares and zero remaining value.
    pub async fn bulk_update_closed_positions(
        &self,
        updates: &[ClosedPositionUpdate],
    ) -> Result<u64> {
        let mut updated = 0u64;

        for chunk in updates.chunks(BULK_CHUNK_SIZE) {
            let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
                r#"
                UPDATE positions AS p SET
                    position_status = "#,
            );
            builder.push_bind(PositionStatus::Closed);
            builder.push(", trade_status = ");
            builder.push_bind(TradeStatus::TradesSynced);
            builder.push(
                r#",
                    total_shares = v.total_shares,
                    current_shares = 0,
                    average_entry_price = v.average_entry_price,
                    amount_spent = v.amount_spent,
                    amount_remaining = 0,
                    api_realized_pnl = v.api_realized_pnl,
                    closed_at = v.closed_at,
                    last_updated_at = NOW()
                FROM (
                "#,
            );
            builder.push_values(chunk, |mut b, u| {
                b.push_bind(u.position_id)
                    .push_bind(u.total_shares)
                    .push_bind(u.average_entry_price)
                    .push_bind(u.amount_spent)
                    .push_bind(u.api_realized_pnl)
                    .push_bind(u.closed_at);
            });
            builder.push(
                r#"
                ) AS v(
                    position_id, total_shares, average_entry_price,
                    amount_spent, api_realized_pnl, closed_at
                )
                WHERE p.position_id = v.position_id
                "#,
            );

            let result = builder.build().execute(&self.pool).await?;
            updated += result.rows_affected();
        }

        Ok(updated)
    }
}
