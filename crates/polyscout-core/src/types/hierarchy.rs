//! In-memory Event → Market → Position hierarchy.
//!
//! Ownership is strictly forward: an event owns its markets by condition id,
//! a market owns its position snapshots. Code that needs the back-edge gets
//! both handles passed in.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;

use super::{PositionStatus, TradeStatus};
use crate::aggregation::{AggregatedTrade, DailyTrades};

/// Snapshot of one position, either freshly parsed from the upstream API or
/// loaded from the store.
#[derive(Debug, Clone)]
pub struct PositionSnapshot {
    pub outcome: String,
    pub opposite_outcome: String,
    pub title: String,
    pub total_shares: Decimal,
    pub current_shares: Decimal,
    pub average_entry_price: Decimal,
    pub amount_spent: Decimal,
    pub amount_remaining: Decimal,
    pub api_realized_pnl: Option<Decimal>,
    pub end_date: Option<DateTime<Utc>>,
    pub negative_risk: bool,
    pub position_status: PositionStatus,
    pub trade_status: TradeStatus,
    /// Upstream close time in epoch seconds, present on closed positions.
    pub closed_at: Option<i64>,
    pub calculated_amount_invested: Decimal,
    pub calculated_amount_out: Decimal,
    pub calculated_current_value: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
}

impl PositionSnapshot {
    pub fn is_open(&self) -> bool {
        self.position_status == PositionStatus::Open
    }

    pub fn is_closed(&self) -> bool {
        self.position_status == PositionStatus::Closed
    }

    /// Upstream reports `1970-01-01` when it has no end date; treat it as
    /// absent.
    pub fn end_date_is_epoch_start(&self) -> bool {
        self.end_date
            .map(|d| d.year() == 1970 && d.month() == 1 && d.day() == 1)
            .unwrap_or(false)
    }

    /// End date as an epoch timestamp at 23:59:59 of that day, or `None`
    /// when absent or epoch-start.
    pub fn end_date_eod_timestamp(&self) -> Option<i64> {
        if self.end_date_is_epoch_start() {
            return None;
        }
        let end_date = self.end_date?;
        let end_of_day = end_date
            .date_naive()
            .and_time(NaiveTime::from_hms_opt(23, 59, 59)?);
        Some(Utc.from_utc_datetime(&end_of_day).timestamp())
    }
}

/// Whether any CLOSED position in the slice falls inside the activity
/// window starting at `cutoff_ts`.
///
/// A position that closed before its market ended counts if either its
/// close time or the market end date is in range; one that closed after the
/// market ended counts only on the end date (the close time is unreliable
/// there).
pub fn has_closed_positions_in_range(positions: &[PositionSnapshot], cutoff_ts: i64) -> bool {
    positions.iter().any(|position| {
        position.is_closed()
            && is_position_in_range(
                position.closed_at,
                position.end_date_eod_timestamp(),
                cutoff_ts,
            )
    })
}

fn is_position_in_range(close_ts: Option<i64>, end_ts: Option<i64>, cutoff_ts: i64) -> bool {
    match (close_ts, end_ts) {
        (Some(close), Some(end)) => {
            if close < end {
                close >= cutoff_ts || end >= cutoff_ts
            } else {
                end >= cutoff_ts
            }
        }
        (None, Some(end)) => end >= cutoff_ts,
        (Some(close), None) => close >= cutoff_ts,
        (None, None) => false,
    }
}

/// Market-level amounts derived from trade aggregates; duplicated onto
/// every position of the (wallet, market) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MarketAmounts {
    pub invested: Decimal,
    pub taken_out: Decimal,
    pub current_value: Decimal,
    pub pnl: Decimal,
}

/// Compute market-level amounts from daily aggregates and the market's
/// positions: invested sums |amount| over investment legs, taken-out sums
/// |amount| over divestment legs, current value sums `amount_remaining`
/// over OPEN positions, and pnl = taken_out + current_value − invested.
pub fn market_amounts_from_trades(
    daily_trades: &BTreeMap<NaiveDate, DailyTrades>,
    positions: &[PositionSnapshot],
) -> MarketAmounts {
    let mut invested = Decimal::ZERO;
    let mut taken_out = Decimal::ZERO;

    for day in daily_trades.values() {
        for trade in day.all_trades() {
            let amount = trade.total_amount.abs();
            if trade.trade_type.is_investment() {
                invested += amount;
            } else {
                taken_out += amount;
            }
        }
    }

    let current_value: Decimal = positions
        .iter()
        .filter(|p| p.is_open())
        .map(|p| p.amount_remaining)
        .sum();

    MarketAmounts {
        invested,
        taken_out,
        current_value,
        pnl: taken_out + current_value - invested,
    }
}

/// Reference to a stored batch watermark row.
#[derive(Debug, Clone, Copy)]
pub struct BatchRef {
    pub batch_id: i64,
    pub latest_fetched_time: Option<i64>,
}

/// A market inside the hierarchy, together with the scratch state the
/// schedulers accumulate against it during a tick.
#[derive(Debug, Clone)]
pub struct MarketNode {
    pub condition_id: String,
    pub market_slug: String,
    pub question: String,
    pub end_date: Option<DateTime<Utc>>,
    pub is_open: bool,
    /// Store primary key, present once the market is persisted.
    pub market_pk: Option<i64>,
    pub positions: Vec<PositionSnapshot>,
    pub batch: Option<BatchRef>,
    pub daily_trades: BTreeMap<NaiveDate, DailyTrades>,
    pub amounts: Option<MarketAmounts>,
    pub earliest_trade_date: Option<NaiveDate>,
    pub latest_trade_date: Option<NaiveDate>,
    /// Watermark candidate observed this tick; only ever moves forward.
    pub new_batch_timestamp: Option<i64>,
    /// Trade status to apply to the market's positions at commit time.
    pub new_trade_status: Option<TradeStatus>,
    /// Aggregates queued for bulk persistence.
    pub trades_to_persist: Vec<AggregatedTrade>,
}

impl MarketNode {
    pub fn new(condition_id: impl Into<String>) -> Self {
        Self {
            condition_id: condition_id.into(),
            market_slug: String::new(),
            question: String::new(),
            end_date: None,
            is_open: true,
            market_pk: None,
            positions: Vec::new(),
            batch: None,
            daily_trades: BTreeMap::new(),
            amounts: None,
            earliest_trade_date: None,
            latest_trade_date: None,
            new_batch_timestamp: None,
            new_trade_status: None,
            trades_to_persist: Vec::new(),
        }
    }

    pub fn add_position(&mut self, position: PositionSnapshot) {
        self.positions.push(position);
    }

    pub fn has_open_positions(&self) -> bool {
        self.positions.iter().any(|p| p.is_open())
    }

    pub fn closed_position_count(&self) -> usize {
        self.positions.iter().filter(|p| p.is_closed()).count()
    }

    /// A full sync is needed until a watermark exists.
    pub fn needs_full_trade_sync(&self) -> bool {
        self.batch
            .map(|b| b.latest_fetched_time.is_none())
            .unwrap_or(true)
    }

    /// Set market-level amounts on the market and duplicate them onto every
    /// position, marking the positions trade-synced.
    pub fn set_pnl_calculations(&mut self, amounts: MarketAmounts) {
        self.amounts = Some(amounts);
        for position in &mut self.positions {
            position.calculated_amount_invested = amounts.invested;
            position.calculated_amount_out = amounts.taken_out;
            position.calculated_current_value = amounts.current_value;
            if position.is_open() {
                position.unrealized_pnl = amounts.pnl;
            } else {
                position.realized_pnl = amounts.pnl;
            }
            position.trade_status = TradeStatus::TradesSynced;
        }
    }

    pub fn mark_trade_status(&mut self, status: TradeStatus) {
        self.new_trade_status = Some(status);
    }

    /// Record a watermark candidate; keeps the maximum seen this tick.
    pub fn mark_batch_timestamp(&mut self, timestamp: i64) {
        self.new_batch_timestamp = Some(match self.new_batch_timestamp {
            Some(current) => current.max(timestamp),
            None => timestamp,
        });
    }

    /// Track the min/max trade date joined onto this market.
    pub fn observe_trade_date(&mut self, trade_date: NaiveDate) {
        self.earliest_trade_date = Some(match self.earliest_trade_date {
            Some(current) => current.min(trade_date),
            None => trade_date,
        });
        self.latest_trade_date = Some(match self.latest_trade_date {
            Some(current) => current.max(trade_date),
            None => trade_date,
        });
    }

    pub fn queue_trades_for_persistence(&mut self) {
        let trades: Vec<AggregatedTrade> = self
            .daily_trades
            .values()
            .flat_map(|day| day.all_trades().into_iter().cloned())
            .collect();
        self.trades_to_persist.extend(trades);
    }
}

/// An event and its markets, keyed by condition id.
#[derive(Debug, Clone)]
pub struct EventNode {
    pub event_slug: String,
    pub markets: HashMap<String, MarketNode>,
}

impl EventNode {
    pub fn new(event_slug: impl Into<String>) -> Self {
        Self {
            event_slug: event_slug.into(),
            markets: HashMap::new(),
        }
    }

    pub fn market_mut(&mut self, condition_id: &str) -> &mut MarketNode {
        self.markets
            .entry(condition_id.to_string())
            .or_insert_with(|| MarketNode::new(condition_id))
    }
}

/// A wallet together with the markets a scheduler tick works on.
#[derive(Debug, Clone)]
pub struct WalletWithMarkets {
    pub wallet_id: i64,
    pub proxy_wallet: String,
    pub username: String,
    pub markets: HashMap<String, MarketNode>,
}

impl WalletWithMarkets {
    pub fn new(wallet_id: i64, proxy_wallet: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            wallet_id,
            proxy_wallet: proxy_wallet.into(),
            username: username.into(),
            markets: HashMap::new(),
        }
    }

    pub fn market_mut(&mut self, condition_id: &str) -> &mut MarketNode {
        self.markets
            .entry(condition_id.to_string())
            .or_insert_with(|| MarketNode::new(condition_id))
    }

    pub fn short_address(&self) -> &str {
        &self.proxy_wallet[..self.proxy_wallet.len().min(10)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot(status: PositionStatus) -> PositionSnapshot {
        PositionSnapshot {
            outcome: "Yes".to_string(),
            opposite_outcome: "No".to_string(),
            title: "Who wins?".to_string(),
            total_shares: dec!(100),
            current_shares: dec!(100),
            average_entry_price: dec!(0.3),
            amount_spent: dec!(30),
            amount_remaining: dec!(35),
            api_realized_pnl: None,
            end_date: None,
            negative_risk: false,
            position_status: status,
            trade_status: TradeStatus::Pending,
            closed_at: None,
            calculated_amount_invested: Decimal::ZERO,
            calculated_amount_out: Decimal::ZERO,
            calculated_current_value: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
        }
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn epoch_start_end_date_is_ignored() {
        let mut position = snapshot(PositionStatus::Closed);
        position.end_date = Some(utc("1970-01-01T00:00:00Z"));
        assert!(position.end_date_is_epoch_start());
        assert_eq!(position.end_date_eod_timestamp(), None);

        // Close time alone decides the window.
        position.closed_at = Some(2_000_000_000);
        assert!(has_closed_positions_in_range(
            std::slice::from_ref(&position),
            1_999_999_999
        ));
        assert!(!has_closed_positions_in_range(
            &[position],
            2_000_000_001
        ));
    }

    #[test]
    fn close_before_end_accepts_either_timestamp() {
        let mut position = snapshot(PositionStatus::Closed);
        position.closed_at = Some(1_000);
        position.end_date = Some(utc("2030-01-01T00:00:00Z"));
        // Close time is stale but the end date is far in the future.
        assert!(has_closed_positions_in_range(&[position], 1_700_000_000));
    }

    #[test]
    fn close_after_end_trusts_only_end_date() {
        let mut position = snapshot(PositionStatus::Closed);
        position.end_date = Some(utc("2020-01-01T00:00:00Z"));
        let end_ts = position.end_date_eod_timestamp().unwrap();
        position.closed_at = Some(end_ts + 10_000);

        // Close time is in range but the market ended before the cutoff.
        assert!(!has_closed_positions_in_range(
            std::slice::from_ref(&position),
            end_ts + 5_000
        ));
        assert!(has_closed_positions_in_range(&[position], end_ts - 5_000));
    }

    #[test]
    fn open_positions_never_count_for_closed_range() {
        let mut position = snapshot(PositionStatus::Open);
        position.closed_at = Some(2_000_000_000);
        assert!(!has_closed_positions_in_range(&[position], 0));
    }

    #[test]
    fn market_amounts_duplicate_onto_all_positions() {
        let mut market = MarketNode::new("0xcond");
        market.add_position(snapshot(PositionStatus::Open));
        market.add_position(snapshot(PositionStatus::Closed));

        let amounts = MarketAmounts {
            invested: dec!(6),
            taken_out: dec!(4),
            current_value: dec!(35),
            pnl: dec!(33),
        };
        market.set_pnl_calculations(amounts);

        for position in &market.positions {
            assert_eq!(position.calculated_amount_invested, dec!(6));
            assert_eq!(position.calculated_amount_out, dec!(4));
            assert_eq!(position.calculated_current_value, dec!(35));
            assert_eq!(position.trade_status, TradeStatus::TradesSynced);
        }
        assert_eq!(market.positions[0].unrealized_pnl, dec!(33));
        assert_eq!(market.positions[1].realized_pnl, dec!(33));
    }

    #[test]
    fn batch_timestamp_is_monotonic() {
        let mut market = MarketNode::new("0xcond");
        market.mark_batch_timestamp(100);
        market.mark_batch_timestamp(50);
        assert_eq!(market.new_batch_timestamp, Some(100));
        market.mark_batch_timestamp(200);
        assert_eq!(market.new_batch_timestamp, Some(200));
    }

    #[test]
    fn trade_date_range_tracking() {
        let mut market = MarketNode::new("0xcond");
        let d1 = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2025, 5, 9).unwrap();
        market.observe_trade_date(d2);
        market.observe_trade_date(d1);
        assert_eq!(market.earliest_trade_date, Some(d1));
        assert_eq!(market.latest_trade_date, Some(d2));
    }
}
