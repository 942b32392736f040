//! Wallet PnL repository: the bulk-load join and the snapshot upsert.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

use crate::types::{EventNode, PositionSnapshot};
use crate::Result;

/// A computed PnL snapshot ready for persistence.
#[derive(Debug, Clone)]
pub struct PnlUpsert {
    pub wallet_id: i64,
    pub period: i16,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub open_amount_invested: Decimal,
    pub open_amount_out: Decimal,
    pub open_current_value: Decimal,
    pub closed_amount_invested: Decimal,
    pub closed_amount_out: Decimal,
    pub closed_current_value: Decimal,
    pub total_invested_amount: Decimal,
    pub total_amount_out: Decimal,
    pub total_current_value: Decimal,
    pub realized_winrate: Option<Decimal>,
    pub realized_winrate_odds: Option<String>,
    pub unrealized_winrate: Option<Decimal>,
    pub unrealized_winrate_odds: Option<String>,
    pub high_volume_winrate: Option<Decimal>,
    pub high_volume_winrate_odds: Option<String>,
}

/// Repository for the `wallet_pnl` table.
#[derive(Clone)]
pub struct WalletPnlRepository {
    pool: PgPool,
}

impl WalletPnlRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load everything the PnL calculation needs for the target wallets in
    /// one join: positions × markets × events, LEFT JOINed to trades on or
    /// after the minimum cutoff date. Markets in the returned hierarchies
    /// carry their earliest/latest joined trade dates.
    pub async fn load_pnl_data(
        &self,
        wallet_ids: &[i64],
        min_cutoff_date: NaiveDate,
    ) -> Result<HashMap<i64, HashMap<String, EventNode>>> {
        if wallet_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT
                p.wallet_id,
                p.position_id,
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
                p.closed_at,
                p.calculated_amount_invested,
                p.calculated_amount_out,
                p.calculated_current_value,
                p.realized_pnl,
                p.unrealized_pnl,
                m.market_id,
                m.platform_market_id,
                m.market_slug,
                m.question,
                m.end_date AS market_end_date,
                m.closed_time,
                e.event_slug,
                t.trade_id,
                t.trade_date
            FROM positions p
            INNER JOIN markets m ON p.market_id = m.market_id
            INNER JOIN events e ON m.event_id = e.event_id
            LEFT JOIN trades t
                ON t.market_id = m.market_id
               AND t.wallet_id = p.wallet_id
               AND t.trade_date >= $2
            WHERE p.wallet_id = ANY($1)
            ORDER BY p.wallet_id, m.market_id, p.position_id, t.trade_date
            "#,
        )
        .bind(wallet_ids)
        .bind(min_cutoff_date)
        .fetch_all(&self.pool)
        .await?;

        let mut hierarchies: HashMap<i64, HashMap<String, EventNode>> = HashMap::new();
        let mut seen_positions: HashSet<i64> = HashSet::new();

        for row in rows {
            let wallet_id: i64 = row.get("wallet_id");
            let event_slug: String = row.get("event_slug");
            let condition_id: String = row.get("platform_market_id");

            let hierarchy = hierarchies.entry(wallet_id).or_default();
            let event = hierarchy
                .entry(event_slug.clone())
                .or_insert_with(|| EventNode::new(event_slug));
            let market = event.market_mut(&condition_id);

            if market.market_pk.is_none() {
                market.market_pk = Some(row.get("market_id"));
                market.market_slug = row.get("market_slug");
                market.question = row.get("question");
                market.end_date = row.get("market_end_date");
                market.is_open = row.get::<Option<DateTime<Utc>>, _>("closed_time").is_none();
            }

            let position_id: i64 = row.get("position_id");
            if seen_positions.insert(position_id) {
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
                    calculated_amount_invested: row.get("calculated_amount_invested"),
                    calculated_amount_out: row.get("calculated_amount_out"),
                    calculated_current_value: row.get("calculated_current_value"),
                    realized_pnl: row.get("realized_pnl"),
                    unrealized_pnl: row.get("unrealized_pnl"),
                });
            }

            let trade_id: Option<i64> = row.get("trade_id");
            if trade_id.is_some() {
                if let Some(trade_date) = row.get::<Option<NaiveDate>, _>("trade_date") {
                    market.observe_trade_date(trade_date);
                }
            }
        }

        Ok(hierarchies)
    }

    /// Upsert one PnL snapshot row keyed (wallet, period).
    pub async fn upsert_wallet_pnl(&self, snapshot: &PnlUpsert) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO wallet_pnl (
                wallet_id, period, start_time, end_time,
                open_amount_invested, open_amount_out, open_current_value,
                closed_amount_invested, closed_amount_out, closed_current_value,
                total_invested_amount, total_amount_out, total_current_value,
                realized_winrate, realized_winrate_odds,
                unrealized_winrate, unrealized_winrate_odds,
                high_volume_winrate, high_volume_winrate_odds
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19
            )
            ON CONFLICT (wallet_id, period) DO UPDATE SET
                start_time = EXCLUDED.start_time,
                end_time = EXCLUDED.end_time,
                open_amount_invested = EXCLUDED.open_amount_invested,
                open_amount_out = EXCLUDED.open_amount_out,
                open_current_value = EXCLUDED.open_current_value,
                closed_amount_invested = EXCLUDED.closed_amount_invested,
                closed_amount_out = EXCLUDED.closed_amount_out,
                closed_current_value = EXCLUDED.closed_current_value,
                total_invested_amount = EXCLUDED.total_invested_amount,
                total_amount_out = EXCLUDED.total_amount_out,
                total_current_value = EXCLUDED.total_current_value,
                realized_winrate = EXCLUDED.realized_winrate,
                realized_winrate_odds = EXCLUDED.realized_winrate_odds,
                unrealized_winrate = EXCLUDED.unrealized_winrate,
                unrealized_winrate_odds = EXCLUDED.unrealized_winrate_odds,
                high_volume_winrate = EXCLUDED.high_volume_winrate,
                high_volume_winrate_odds = EXCLUDED.high_volume_winrate_odds,
                last_updated_at = NOW()
            "#,
        )
        .bind(snapshot.wallet_id)
        .bind(snapshot.period)
        .bind(snapshot.start_time)
        .bind(snapshot.end_time)
        .bind(snapshot.open_amount_invested)
        .bind(snapshot.open_amount_out)
        .bind(snapshot.open_current_value)
        .bind(snapshot.closed_amount_invested)
        .bind(snapshot.closed_amount_out)
        .bind(snapshot.closed_current_value)
        .bind(snapshot.total_invested_amount)
        .bind(snapshot.total_amount_out)
        .bind(snapshot.total_current_value)
        .bind(snapshot.realized_winrate)
        .bind(&snapshot.realized_winrate_odds)
        .bind(snapshot.unrealized_winrate)
        .bind(&snapshot.unrealized_winrate_odds)
        .bind(snapshot.high_volume_winrate)
        .bind(&snapshot.high_volume_winrate_odds)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
