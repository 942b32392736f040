//! Daily trade aggregation.
//!
//! Raw activity transactions collapse into one row per
//! (market, trade type, outcome, day). MERGE and SPLIT are three-legged:
//! a share leg per binary outcome plus an outcome-less cash leg, so the
//! share flow and the USDC flow stay separately accountable.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::api::ActivityTransaction;
use crate::types::TradeType;

/// One aggregated daily trade, the persistence unit of the `trades` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedTrade {
    pub condition_id: String,
    pub trade_type: TradeType,
    pub outcome: String,
    pub trade_date: NaiveDate,
    /// Signed share flow: positive on the buy side, negative on the sell side.
    pub total_shares: Decimal,
    /// Signed USD flow: negative when spent, positive when received.
    pub total_amount: Decimal,
    pub transaction_count: i32,
}

/// All aggregates for one (wallet, market) pair on one calendar day.
#[derive(Debug, Clone)]
pub struct DailyTrades {
    pub condition_id: String,
    pub trade_date: NaiveDate,
    aggregates: HashMap<(TradeType, String), AggregatedTrade>,
}

impl DailyTrades {
    pub fn new(condition_id: impl Into<String>, trade_date: NaiveDate) -> Self {
        Self {
            condition_id: condition_id.into(),
            trade_date,
            aggregates: HashMap::new(),
        }
    }

    fn add(&mut self, trade_type: TradeType, outcome: &str, shares: Decimal, amount: Decimal) {
        let entry = self
            .aggregates
            .entry((trade_type, outcome.to_string()))
            .or_insert_with(|| AggregatedTrade {
                condition_id: self.condition_id.clone(),
                trade_type,
                outcome: outcome.to_string(),
                trade_date: self.trade_date,
                total_shares: Decimal::ZERO,
                total_amount: Decimal::ZERO,
                transaction_count: 0,
            });
        entry.total_shares += shares;
        entry.total_amount += amount;
        entry.transaction_count += 1;
    }

    /// Fold one raw transaction into the day's aggregates.
    ///
    /// Losing redeems (zero size, zero proceeds) are dropped; transactions
    /// with an unknown type are ignored by the caller before this point.
    pub fn apply(&mut self, tx: &ActivityTransaction) {
        if tx.is_losing_redeem() {
            return;
        }
        let Ok(trade_type) = tx.trade_type() else {
            return;
        };

        match trade_type {
            TradeType::Buy => self.add(TradeType::Buy, &tx.outcome, tx.size, -tx.usdc_size),
            TradeType::Sell => self.add(TradeType::Sell, &tx.outcome, -tx.size, tx.usdc_size),
            TradeType::Merge => {
                // Equal share counts consumed from both outcomes, proceeds on
                // the cash leg.
                self.add(TradeType::Merge, "Yes", -tx.size, Decimal::ZERO);
                self.add(TradeType::Merge, "No", -tx.size, Decimal::ZERO);
                self.add(TradeType::Merge, "", Decimal::ZERO, tx.usdc_size);
            }
            TradeType::Split => {
                self.add(TradeType::Split, "Yes", tx.size, Decimal::ZERO);
                self.add(TradeType::Split, "No", tx.size, Decimal::ZERO);
                self.add(TradeType::Split, "", Decimal::ZERO, -tx.usdc_size);
            }
            TradeType::Redeem => self.add(TradeType::Redeem, "", -tx.size, tx.usdc_size),
        }
    }

    /// All aggregates for this day in deterministic order.
    pub fn all_trades(&self) -> Vec<&AggregatedTrade> {
        let mut trades: Vec<&AggregatedTrade> = self.aggregates.values().collect();
        trades.sort_by(|a, b| {
            (a.trade_type as i16, &a.outcome).cmp(&(b.trade_type as i16, &b.outcome))
        });
        trades
    }

    pub fn len(&self) -> usize {
        self.aggregates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregates.is_empty()
    }
}

/// Aggregate a batch of raw transactions into per-day buckets.
///
/// Deterministic over its input: re-running on the same transaction list
/// yields identical aggregates.
pub fn aggregate_transactions(
    condition_id: &str,
    transactions: &[ActivityTransaction],
) -> BTreeMap<NaiveDate, DailyTrades> {
    let mut days: BTreeMap<NaiveDate, DailyTrades> = BTreeMap::new();
    for tx in transactions {
        let trade_date = tx.trade_date();
        days.entry(trade_date)
            .or_insert_with(|| DailyTrades::new(condition_id, trade_date))
            .apply(tx);
    }
    days.retain(|_, day| !day.is_empty());
    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tx(activity_type: &str, side: &str, size: Decimal, usdc: Decimal) -> ActivityTransaction {
        ActivityTransaction {
            condition_id: "0xcond".to_string(),
            activity_type: activity_type.to_string(),
            side: side.to_string(),
            outcome: "Yes".to_string(),
            size,
            usdc_size: usdc,
            timestamp: 1_700_000_000,
            ..Default::default()
        }
    }

    fn find<'a>(
        day: &'a DailyTrades,
        trade_type: TradeType,
        outcome: &str,
    ) -> &'a AggregatedTrade {
        day.all_trades()
            .into_iter()
            .find(|t| t.trade_type == trade_type && t.outcome == outcome)
            .expect("aggregate present")
    }

    #[test]
    fn buy_sell_merge_produce_expected_rows() {
        let transactions = vec![
            tx("TRADE", "BUY", dec!(10), dec!(6)),
            tx("TRADE", "SELL", dec!(4), dec!(3)),
            tx("MERGE", "", dec!(2), dec!(1)),
        ];
        let days = aggregate_transactions("0xcond", &transactions);
        assert_eq!(days.len(), 1);
        let day = days.values().next().unwrap();
        assert_eq!(day.len(), 5);

        let buy = find(day, TradeType::Buy, "Yes");
        assert_eq!((buy.total_shares, buy.total_amount), (dec!(10), dec!(-6)));
        assert_eq!(buy.transaction_count, 1);

        let sell = find(day, TradeType::Sell, "Yes");
        assert_eq!((sell.total_shares, sell.total_amount), (dec!(-4), dec!(3)));

        let merge_yes = find(day, TradeType::Merge, "Yes");
        assert_eq!(
            (merge_yes.total_shares, merge_yes.total_amount),
            (dec!(-2), dec!(0))
        );
        let merge_no = find(day, TradeType::Merge, "No");
        assert_eq!(
            (merge_no.total_shares, merge_no.total_amount),
            (dec!(-2), dec!(0))
        );
        let merge_cash = find(day, TradeType::Merge, "");
        assert_eq!(
            (merge_cash.total_shares, merge_cash.total_amount),
            (dec!(0), dec!(1))
        );
    }

    #[test]
    fn split_fans_out_three_legs() {
        let days = aggregate_transactions("0xcond", &[tx("SPLIT", "", dec!(7), dec!(7))]);
        let day = days.values().next().unwrap();
        assert_eq!(day.len(), 3);
        assert_eq!(find(day, TradeType::Split, "Yes").total_shares, dec!(7));
        assert_eq!(find(day, TradeType::Split, "No").total_shares, dec!(7));
        assert_eq!(find(day, TradeType::Split, "").total_amount, dec!(-7));
    }

    #[test]
    fn redeem_single_cash_leg_and_losing_redeem_filtered() {
        let days = aggregate_transactions(
            "0xcond",
            &[
                tx("REDEEM", "", dec!(5), dec!(5)),
                tx("REDEEM", "", dec!(0), dec!(0)),
            ],
        );
        let day = days.values().next().unwrap();
        assert_eq!(day.len(), 1);
        let redeem = find(day, TradeType::Redeem, "");
        assert_eq!((redeem.total_shares, redeem.total_amount), (dec!(-5), dec!(5)));
        assert_eq!(redeem.transaction_count, 1);
    }

    #[test]
    fn repeated_buys_accumulate_into_one_row() {
        let transactions: Vec<_> = (0..10).map(|_| tx("TRADE", "BUY", dec!(1), dec!(10))).collect();
        let days = aggregate_transactions("0xcond", &transactions);
        let day = days.values().next().unwrap();
        let buy = find(day, TradeType::Buy, "Yes");
        assert_eq!(buy.total_shares, dec!(10));
        assert_eq!(buy.total_amount, dec!(-100));
        assert_eq!(buy.transaction_count, 10);
    }

    #[test]
    fn aggregation_is_a_function_of_input() {
        let transactions = vec![
            tx("TRADE", "BUY", dec!(10), dec!(6)),
            tx("MERGE", "", dec!(2), dec!(1)),
        ];
        let first = aggregate_transactions("0xcond", &transactions);
        let second = aggregate_transactions("0xcond", &transactions);
        let flatten = |m: &BTreeMap<NaiveDate, DailyTrades>| -> Vec<AggregatedTrade> {
            m.values()
                .flat_map(|d| d.all_trades().into_iter().cloned())
                .collect()
        };
        assert_eq!(flatten(&first), flatten(&second));
    }

    #[test]
    fn transactions_spread_across_days() {
        let mut early = tx("TRADE", "BUY", dec!(1), dec!(1));
        early.timestamp = 1_700_000_000;
        let mut late = tx("TRADE", "BUY", dec!(1), dec!(1));
        late.timestamp = 1_700_000_000 + 86_400 * 3;
        let days = aggregate_transactions("0xcond", &[early, late]);
        assert_eq!(days.len(), 2);
    }
}
