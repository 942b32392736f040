//! Persisted row types, one struct per table.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{PositionStatus, TradeStatus, TradeType, WalletType};

/// A tracked trader wallet.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Wallet {
    pub wallet_id: i64,
    pub proxy_wallet: String,
    pub username: String,
    pub x_username: Option<String>,
    pub verified_badge: bool,
    pub profile_image: Option<String>,
    pub is_active: i16,
    pub platform: String,
    pub wallet_type: WalletType,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn short_address(&self) -> &str {
        &self.proxy_wallet[..self.proxy_wallet.len().min(10)]
    }
}

/// Leaderboard snapshot for a wallet within one category and time period.
#[derive(Debug, Clone, FromRow)]
pub struct WalletCategoryStat {
    pub stat_id: i64,
    pub wallet_id: i64,
    pub category: String,
    pub time_period: String,
    pub rank: Option<i32>,
    pub volume: Decimal,
    pub pnl: Decimal,
    pub snapshot_time: DateTime<Utc>,
}

/// An upstream event; owns its markets.
#[derive(Debug, Clone, FromRow)]
pub struct Event {
    pub event_id: i64,
    pub event_slug: String,
    pub platform_event_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub liquidity: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub open_interest: Option<Decimal>,
    pub competitive: Option<Decimal>,
    pub neg_risk: i16,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub market_created_at: Option<DateTime<Utc>>,
    pub market_updated_at: Option<DateTime<Utc>>,
    pub tags: Option<serde_json::Value>,
    pub category: Option<String>,
    pub platform: String,
    pub last_updated_at: DateTime<Utc>,
}

/// A market (condition) inside exactly one event.
#[derive(Debug, Clone, FromRow)]
pub struct Market {
    pub market_id: i64,
    pub event_id: i64,
    /// The platform condition id, the market's natural key.
    pub platform_market_id: String,
    pub platform_numeric_id: Option<i64>,
    pub market_slug: String,
    pub question: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub market_created_at: Option<DateTime<Utc>>,
    /// NULL while the market is open.
    pub closed_time: Option<DateTime<Utc>>,
    pub volume: Option<Decimal>,
    pub liquidity: Option<Decimal>,
    pub competitive: Option<Decimal>,
    pub platform: String,
    pub last_updated_at: DateTime<Utc>,
}

/// One wallet's stake in one market outcome.
///
/// The `calculated_*` columns are market-wise: every position of the same
/// (wallet, market) pair carries the same values, refreshed in lockstep by
/// set-based updates.
#[derive(Debug, Clone, FromRow)]
pub struct Position {
    pub position_id: i64,
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
    /// Upstream close time (epoch seconds), for closed positions.
    pub closed_at: Option<i64>,
    pub last_updated_at: DateTime<Utc>,
}

/// Daily aggregated trade row.
#[derive(Debug, Clone, FromRow)]
pub struct Trade {
    pub trade_id: i64,
    pub wallet_id: i64,
    pub market_id: i64,
    pub condition_id: String,
    pub trade_type: TradeType,
    pub outcome: String,
    pub total_shares: Decimal,
    pub total_amount: Decimal,
    pub trade_date: NaiveDate,
    pub transaction_count: i32,
}

/// Trade sync watermark for one (wallet, market) pair.
#[derive(Debug, Clone, FromRow)]
pub struct Batch {
    pub batch_id: i64,
    pub wallet_id: i64,
    pub market_id: i64,
    /// Epoch seconds of the newest trade absorbed; never decreases.
    pub latest_fetched_time: Option<i64>,
    pub is_active: i16,
    pub last_updated_at: DateTime<Utc>,
}

/// Rolling-period PnL snapshot for one wallet.
#[derive(Debug, Clone, FromRow)]
pub struct WalletPnl {
    pub wallet_pnl_id: i64,
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
