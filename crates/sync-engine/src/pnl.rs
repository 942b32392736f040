//! Per-wallet PnL calculation over a pre-loaded hierarchy.
//!
//! Pure over its input: no I/O. The open and closed branches stay distinct
//! on purpose: an open market's amounts were derived from trade
//! aggregates; a closed market's came from the upstream realized PnL.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;

use polyscout_core::types::{has_closed_positions_in_range, EventNode};

/// The six accumulators plus derived totals for one (wallet, period).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PnlCalculation {
    pub open_amount_invested: Decimal,
    pub open_amount_out: Decimal,
    pub open_current_value: Decimal,
    pub closed_amount_invested: Decimal,
    pub closed_amount_out: Decimal,
    pub closed_current_value: Decimal,
    pub total_invested_amount: Decimal,
    pub total_amount_out: Decimal,
    pub total_current_value: Decimal,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Cutoff instant for a period: N days back, snapped to start of day UTC.
pub fn period_cutoff(now: DateTime<Utc>, period_days: i64) -> DateTime<Utc> {
    let cutoff_date = (now - Duration::days(period_days)).date_naive();
    Utc.from_utc_datetime(&cutoff_date.and_time(NaiveTime::MIN))
}

/// Compute PnL amounts for one wallet and one period from its hierarchy.
///
/// A market with open positions contributes to the open side when its
/// latest trade date reaches the cutoff or one of its closed positions is
/// in range. A closed-only market contributes to the closed side on the
/// closed-position rule alone, with zero current value by construction.
pub fn calculate_pnl(
    hierarchy: &HashMap<String, EventNode>,
    period_days: i64,
    now: DateTime<Utc>,
) -> PnlCalculation {
    let cutoff = period_cutoff(now, period_days);
    let cutoff_ts = cutoff.timestamp();
    let cutoff_date: NaiveDate = cutoff.date_naive();

    let mut result = PnlCalculation {
        start_time: Some(cutoff),
        end_time: Some(now),
        ..Default::default()
    };

    for event in hierarchy.values() {
        for market in event.markets.values() {
            let Some(representative) = market.positions.first() else {
                continue;
            };

            if market.has_open_positions() {
                let trades_in_range = market
                    .latest_trade_date
                    .map(|latest| latest >= cutoff_date)
                    .unwrap_or(false);
                let closed_in_range = has_closed_positions_in_range(&market.positions, cutoff_ts);

                if trades_in_range || closed_in_range {
                    result.open_amount_invested += representative.calculated_amount_invested;
                    result.open_amount_out += representative.calculated_amount_out;
                    result.open_current_value += representative.calculated_current_value;
                }
            } else if has_closed_positions_in_range(&market.positions, cutoff_ts) {
                result.closed_amount_invested += representative.calculated_amount_invested;
                result.closed_amount_out += representative.calculated_amount_out;
            }
        }
    }

    result.closed_current_value = Decimal::ZERO;
    result.total_invested_amount = result.open_amount_invested + result.closed_amount_invested;
    result.total_amount_out = result.open_amount_out + result.closed_amount_out;
    result.total_current_value = result.open_current_value;
    result
}

/// Winrate as wins/(wins+losses) with a "wins/total" odds string; `None`
/// when there were no bets.
pub fn calculate_winrate(wins: u64, losses: u64) -> (Option<Decimal>, Option<String>) {
    let total = wins + losses;
    if total == 0 {
        return (None, None);
    }
    let rate = Decimal::from(wins) / Decimal::from(total);
    (Some(rate), Some(format!("{wins}/{total}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyscout_core::types::{MarketNode, PositionSnapshot, PositionStatus, TradeStatus};
    use rust_decimal_macros::dec;

    fn position(status: PositionStatus, closed_at: Option<i64>) -> PositionSnapshot {
        PositionSnapshot {
            outcome: "Yes".to_string(),
            opposite_outcome: "No".to_string(),
            title: String::new(),
            total_shares: dec!(10),
            current_shares: dec!(10),
            average_entry_price: dec!(0.5),
            amount_spent: dec!(5),
            amount_remaining: dec!(6),
            api_realized_pnl: None,
            end_date: None,
            negative_risk: false,
            position_status: status,
            trade_status: TradeStatus::TradesSynced,
            closed_at,
            calculated_amount_invested: dec!(100),
            calculated_amount_out: dec!(40),
            calculated_current_value: dec!(80),
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
        }
    }

    fn hierarchy_with(markets: Vec<(&str, MarketNode)>) -> HashMap<String, EventNode> {
        let mut event = EventNode::new("ev");
        for (condition_id, market) in markets {
            event.markets.insert(condition_id.to_string(), market);
        }
        HashMap::from([("ev".to_string(), event)])
    }

    #[test]
    fn period_cutoff_snaps_to_start_of_day() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 13, 45, 12).unwrap();
        let cutoff = period_cutoff(now, 30);
        assert_eq!(cutoff.to_rfc3339(), "2025-05-16T00:00:00+00:00");
    }

    #[test]
    fn open_market_included_by_recent_trades_only_for_short_period() {
        let now = Utc::now();

        // M1: open positions, latest trade 20 days ago.
        let mut m1 = MarketNode::new("0xm1");
        m1.add_position(position(PositionStatus::Open, None));
        m1.observe_trade_date((now - Duration::days(20)).date_naive());

        // M2: closed only, closed 70 days ago.
        let mut m2 = MarketNode::new("0xm2");
        let closed_ts = (now - Duration::days(70)).timestamp();
        m2.add_position(position(PositionStatus::Closed, Some(closed_ts)));

        let hierarchy = hierarchy_with(vec![("0xm1", m1), ("0xm2", m2)]);

        // Period 30: only M1 contributes, on the open side.
        let p30 = calculate_pnl(&hierarchy, 30, now);
        assert_eq!(p30.open_amount_invested, dec!(100));
        assert_eq!(p30.open_current_value, dec!(80));
        assert_eq!(p30.closed_amount_invested, dec!(0));

        // Period 90: both contribute.
        let p90 = calculate_pnl(&hierarchy, 90, now);
        assert_eq!(p90.open_amount_invested, dec!(100));
        assert_eq!(p90.closed_amount_invested, dec!(100));
        assert_eq!(p90.closed_amount_out, dec!(40));
        // Closed side has no current value by construction.
        assert_eq!(p90.total_current_value, p90.open_current_value);
        assert_eq!(p90.total_invested_amount, dec!(200));
        assert_eq!(p90.total_amount_out, dec!(80));
    }

    #[test]
    fn open_market_without_recent_activity_is_excluded() {
        let now = Utc::now();
        let mut market = MarketNode::new("0xm");
        market.add_position(position(PositionStatus::Open, None));
        market.observe_trade_date((now - Duration::days(200)).date_naive());

        let hierarchy = hierarchy_with(vec![("0xm", market)]);
        let result = calculate_pnl(&hierarchy, 30, now);
        assert_eq!(result.open_amount_invested, dec!(0));
        assert_eq!(result.total_invested_amount, dec!(0));
    }

    #[test]
    fn closed_market_never_reaches_open_side() {
        let now = Utc::now();
        let mut market = MarketNode::new("0xm");
        market.add_position(position(
            PositionStatus::Closed,
            Some((now - Duration::days(5)).timestamp()),
        ));
        // Even with a recent trade date, no open position means closed side.
        market.observe_trade_date(now.date_naive());

        let hierarchy = hierarchy_with(vec![("0xm", market)]);
        let result = calculate_pnl(&hierarchy, 30, now);
        assert_eq!(result.open_amount_invested, dec!(0));
        assert_eq!(result.closed_amount_invested, dec!(100));
        assert_eq!(result.closed_current_value, dec!(0));
    }

    #[test]
    fn winrate_math() {
        assert_eq!(calculate_winrate(0, 0), (None, None));

        let (rate, odds) = calculate_winrate(3, 1);
        assert_eq!(rate, Some(dec!(0.75)));
        assert_eq!(odds.as_deref(), Some("3/4"));

        let (rate, odds) = calculate_winrate(0, 5);
        assert_eq!(rate, Some(dec!(0)));
        assert_eq!(odds.as_deref(), Some("0/5"));
    }
}
