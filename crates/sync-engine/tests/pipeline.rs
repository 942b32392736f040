//! End-to-end pipeline tests over the in-memory stages: raw activity →
//! daily aggregates → market amounts → status/watermark payloads → PnL.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use polyscout_core::aggregation::aggregate_transactions;
use polyscout_core::api::ActivityTransaction;
use polyscout_core::types::{
    market_amounts_from_trades, BatchRef, PositionSnapshot, PositionStatus, TradeStatus, TradeType,
    WalletWithMarkets,
};
use sync_engine::pnl::calculate_pnl;
use sync_engine::trade_sync::collect_sync_data;

fn tx(
    activity_type: &str,
    side: &str,
    size: Decimal,
    usdc: Decimal,
    timestamp: i64,
) -> ActivityTransaction {
    ActivityTransaction {
        proxy_wallet: "0xabc".to_string(),
        condition_id: "0xcond".to_string(),
        activity_type: activity_type.to_string(),
        side: side.to_string(),
        outcome: "Yes".to_string(),
        size,
        usdc_size: usdc,
        timestamp,
        ..Default::default()
    }
}

fn open_position(amount_remaining: Decimal) -> PositionSnapshot {
    PositionSnapshot {
        outcome: "Yes".to_string(),
        opposite_outcome: "No".to_string(),
        title: "Who wins?".to_string(),
        total_shares: dec!(100),
        current_shares: dec!(100),
        average_entry_price: dec!(0.3),
        amount_spent: dec!(30),
        amount_remaining,
        api_realized_pnl: None,
        end_date: None,
        negative_risk: false,
        position_status: PositionStatus::Open,
        trade_status: TradeStatus::NeedToPullTrades,
        closed_at: None,
        calculated_amount_invested: Decimal::ZERO,
        calculated_amount_out: Decimal::ZERO,
        calculated_current_value: Decimal::ZERO,
        realized_pnl: Decimal::ZERO,
        unrealized_pnl: Decimal::ZERO,
    }
}

/// Watermark-style sync on one day: BUY 10/$6, SELL 4/$3, MERGE 2/$1.
/// Expected rows, per-type amounts, and the derived PnL contract.
#[test]
fn one_day_sync_produces_expected_trade_rows_and_pnl() {
    let base_ts = 1_700_000_000;
    let transactions = vec![
        tx("TRADE", "BUY", dec!(10), dec!(6), base_ts + 100),
        tx("TRADE", "SELL", dec!(4), dec!(3), base_ts + 200),
        tx("MERGE", "", dec!(2), dec!(1), base_ts + 300),
    ];

    let daily = aggregate_transactions("0xcond", &transactions);
    assert_eq!(daily.len(), 1);
    let day = daily.values().next().unwrap();

    let expect = |trade_type: TradeType, outcome: &str, shares: Decimal, amount: Decimal| {
        let row = day
            .all_trades()
            .into_iter()
            .find(|t| t.trade_type == trade_type && t.outcome == outcome)
            .unwrap_or_else(|| panic!("missing {trade_type:?} {outcome}"));
        assert_eq!(row.total_shares, shares, "{trade_type:?} {outcome} shares");
        assert_eq!(row.total_amount, amount, "{trade_type:?} {outcome} amount");
        assert_eq!(row.transaction_count, 1);
    };
    expect(TradeType::Buy, "Yes", dec!(10), dec!(-6));
    expect(TradeType::Sell, "Yes", dec!(-4), dec!(3));
    expect(TradeType::Merge, "Yes", dec!(-2), dec!(0));
    expect(TradeType::Merge, "No", dec!(-2), dec!(0));
    expect(TradeType::Merge, "", dec!(0), dec!(1));

    // The PnL CTE contract: invested = Σ|amount<0|, out = Σ amount≥0.
    let (invested, out) = day.all_trades().into_iter().fold(
        (Decimal::ZERO, Decimal::ZERO),
        |(invested, out), t| {
            if t.total_amount < Decimal::ZERO {
                (invested + t.total_amount.abs(), out)
            } else {
                (invested, out + t.total_amount)
            }
        },
    );
    assert_eq!(invested, dec!(6));
    assert_eq!(out, dec!(4));
    assert_eq!(out - invested, dec!(-2));
}

/// A synced wallet emits trade rows keyed to the store, a status
/// transition per market, and a monotonic watermark.
#[test]
fn sync_scratch_state_flattens_into_bulk_payloads() {
    let base_ts = 1_700_000_000;
    let mut wallet = WalletWithMarkets::new(7, "0xabc", "trader");
    {
        let market = wallet.market_mut("0xcond");
        market.market_pk = Some(42);
        market.batch = Some(BatchRef {
            batch_id: 9,
            latest_fetched_time: Some(base_ts),
        });
        market.add_position(open_position(dec!(35)));

        let transactions = vec![
            tx("TRADE", "BUY", dec!(10), dec!(6), base_ts + 100),
            tx("TRADE", "SELL", dec!(4), dec!(3), base_ts + 900),
        ];
        market.daily_trades = aggregate_transactions("0xcond", &transactions);
        market.queue_trades_for_persistence();
        market.mark_batch_timestamp(base_ts + 900);
        market.mark_batch_timestamp(base_ts + 100);
        market.mark_trade_status(TradeStatus::NeedToCalculatePnl);
    }

    let (inserts, statuses, watermarks) = collect_sync_data(&[wallet]);

    assert_eq!(inserts.len(), 2);
    assert!(inserts.iter().all(|i| i.wallet_id == 7 && i.market_id == 42));

    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].status, TradeStatus::NeedToCalculatePnl);

    // Watermark keeps the max timestamp seen, never an earlier one.
    assert_eq!(watermarks.len(), 1);
    assert_eq!(watermarks[0].timestamp, base_ts + 900);
}

/// Discovery-style accounting for a needs-trades market: ten $10 buys with
/// a $35 mark, then the market amounts land on every position.
#[test]
fn open_market_amounts_flow_from_trades_to_positions() {
    let base_ts = Utc::now().timestamp() - 3600;
    let transactions: Vec<ActivityTransaction> = (0..10)
        .map(|i| tx("TRADE", "BUY", dec!(1), dec!(10), base_ts + i))
        .collect();

    let daily = aggregate_transactions("0xcond", &transactions);
    let positions = vec![open_position(dec!(35))];
    let amounts = market_amounts_from_trades(&daily, &positions);

    assert_eq!(amounts.invested, dec!(100));
    assert_eq!(amounts.taken_out, dec!(0));
    assert_eq!(amounts.current_value, dec!(35));
    assert_eq!(amounts.pnl, dec!(-65));

    let mut market = polyscout_core::types::MarketNode::new("0xcond");
    market.positions = positions;
    market.set_pnl_calculations(amounts);
    assert_eq!(market.positions[0].calculated_amount_invested, dec!(100));
    assert_eq!(market.positions[0].calculated_current_value, dec!(35));
    assert_eq!(market.positions[0].trade_status, TradeStatus::TradesSynced);
}

/// Period windows: a market active 20 days ago is inside the 30-day
/// window; one closed 70 days ago only enters at 90 days.
#[test]
fn pnl_periods_partition_market_contributions() {
    let now = Utc::now();

    let mut m1 = polyscout_core::types::MarketNode::new("0xm1");
    let mut p1 = open_position(dec!(35));
    p1.calculated_amount_invested = dec!(100);
    p1.calculated_amount_out = dec!(40);
    p1.calculated_current_value = dec!(80);
    m1.add_position(p1);
    m1.observe_trade_date((now - Duration::days(20)).date_naive());

    let mut m2 = polyscout_core::types::MarketNode::new("0xm2");
    let mut p2 = open_position(dec!(0));
    p2.position_status = PositionStatus::Closed;
    p2.closed_at = Some((now - Duration::days(70)).timestamp());
    p2.calculated_amount_invested = dec!(50);
    p2.calculated_amount_out = dec!(60);
    m2.add_position(p2);

    let mut event = polyscout_core::types::EventNode::new("ev");
    event.markets.insert("0xm1".to_string(), m1);
    event.markets.insert("0xm2".to_string(), m2);
    let hierarchy = std::collections::HashMap::from([("ev".to_string(), event)]);

    let p30 = calculate_pnl(&hierarchy, 30, now);
    assert_eq!(p30.open_amount_invested, dec!(100));
    assert_eq!(p30.closed_amount_invested, dec!(0));
    assert_eq!(p30.total_invested_amount, dec!(100));

    let p90 = calculate_pnl(&hierarchy, 90, now);
    assert_eq!(p90.open_amount_invested, dec!(100));
    assert_eq!(p90.closed_amount_invested, dec!(50));
    assert_eq!(p90.closed_amount_out, dec!(60));
    assert_eq!(p90.total_invested_amount, dec!(150));
    assert_eq!(p90.total_current_value, dec!(80));
}
