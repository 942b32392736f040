//! Per-candidate wallet evaluation.
//!
//! Builds the Event → Market → Position hierarchy from the candidate's
//! upstream positions, computes per-market PnL along two distinct paths
//! (markets with open positions derive PnL from trade aggregates; fully
//! closed markets trust the upstream realized PnL), and applies the
//! activity and PnL gates.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use polyscout_core::aggregation::{aggregate_transactions, DailyTrades};
use polyscout_core::api::{parse_utc_datetime, ActivityApi, ApiPosition, PositionsApi};
use polyscout_core::config::DiscoveryConfig;
use polyscout_core::types::{
    has_closed_positions_in_range, market_amounts_from_trades, EventNode, MarketAmounts,
    MarketNode, PositionSnapshot, PositionStatus, TradeStatus,
};
use polyscout_core::Result;

use crate::candidates::WalletCandidate;
use crate::limits::validate_position_limits;

/// Everything evaluation learned about one candidate.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub candidate: WalletCandidate,
    pub passed: bool,
    pub fail_reason: Option<String>,
    pub trade_count: u64,
    pub position_count: u64,
    pub open_pnl: Decimal,
    pub closed_pnl: Decimal,
    pub combined_pnl: Decimal,
    pub open_amount_invested: Decimal,
    pub open_amount_out: Decimal,
    pub open_current_value: Decimal,
    pub closed_amount_invested: Decimal,
    pub closed_amount_out: Decimal,
    /// Hierarchy with per-market amounts and trade aggregates attached;
    /// persistence consumes it as-is.
    pub hierarchy: HashMap<String, EventNode>,
}

impl EvaluationResult {
    fn failed(candidate: WalletCandidate, reason: impl Into<String>) -> Self {
        Self {
            candidate,
            passed: false,
            fail_reason: Some(reason.into()),
            trade_count: 0,
            position_count: 0,
            open_pnl: Decimal::ZERO,
            closed_pnl: Decimal::ZERO,
            combined_pnl: Decimal::ZERO,
            open_amount_invested: Decimal::ZERO,
            open_amount_out: Decimal::ZERO,
            open_current_value: Decimal::ZERO,
            closed_amount_invested: Decimal::ZERO,
            closed_amount_out: Decimal::ZERO,
            hierarchy: HashMap::new(),
        }
    }
}

/// Evaluates one candidate at a time against the discovery gates.
pub struct WalletEvaluator {
    positions_api: PositionsApi,
    activity_api: ActivityApi,
    config: DiscoveryConfig,
}

impl WalletEvaluator {
    pub fn new(
        positions_api: PositionsApi,
        activity_api: ActivityApi,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            positions_api,
            activity_api,
            config,
        }
    }

    pub async fn evaluate(&self, candidate: WalletCandidate) -> Result<EvaluationResult> {
        let wallet = candidate.proxy_wallet.clone();
        info!(
            wallet = %candidate.short_address(),
            number = candidate.number,
            "starting evaluation"
        );

        let open_positions = self
            .positions_api
            .fetch_open_positions_with_limit_check(
                &wallet,
                self.config.max_open_positions_with_future_end_date,
            )
            .await?;
        let closed_positions = self
            .positions_api
            .fetch_closed_positions_with_limit_check(&wallet, self.config.max_closed_positions)
            .await?;

        info!(
            wallet = %candidate.short_address(),
            open = open_positions.len(),
            closed = closed_positions.len(),
            "positions fetched"
        );

        if open_positions.is_empty() && closed_positions.is_empty() {
            return Ok(EvaluationResult::failed(candidate, "no positions found"));
        }

        if let Some(reason) =
            validate_position_limits(&open_positions, &closed_positions, &self.config, &wallet)
        {
            return Ok(EvaluationResult::failed(candidate, reason));
        }

        let mut hierarchy = build_event_hierarchy(&open_positions, &closed_positions);
        let cutoff_ts = self.cutoff_timestamp();

        let mut result = EvaluationResult {
            candidate,
            passed: false,
            fail_reason: None,
            trade_count: 0,
            position_count: 0,
            open_pnl: Decimal::ZERO,
            closed_pnl: Decimal::ZERO,
            combined_pnl: Decimal::ZERO,
            open_amount_invested: Decimal::ZERO,
            open_amount_out: Decimal::ZERO,
            open_current_value: Decimal::ZERO,
            closed_amount_invested: Decimal::ZERO,
            closed_amount_out: Decimal::ZERO,
            hierarchy: HashMap::new(),
        };

        self.process_markets(&wallet, &mut hierarchy, cutoff_ts, &mut result)
            .await;
        result.hierarchy = hierarchy;
        result.combined_pnl = result.open_pnl + result.closed_pnl;

        info!(
            wallet = %result.candidate.short_address(),
            combined_pnl = %result.combined_pnl,
            open_pnl = %result.open_pnl,
            closed_pnl = %result.closed_pnl,
            trades = result.trade_count,
            positions = result.position_count,
            "metrics calculated"
        );

        if result.trade_count < self.config.trade_count_threshold
            || result.position_count < self.config.position_count_threshold
        {
            result.fail_reason = Some(format!(
                "insufficient activity: trades {} positions {}",
                result.trade_count, result.position_count
            ));
            return Ok(result);
        }

        if result.combined_pnl < self.config.pnl_threshold {
            result.fail_reason = Some(format!("insufficient pnl: {}", result.combined_pnl));
            return Ok(result);
        }

        result.passed = true;
        info!(wallet = %result.candidate.short_address(), "wallet passed evaluation");
        Ok(result)
    }

    async fn process_markets(
        &self,
        wallet: &str,
        hierarchy: &mut HashMap<String, EventNode>,
        cutoff_ts: i64,
        result: &mut EvaluationResult,
    ) {
        for event in hierarchy.values_mut() {
            for market in event.markets.values_mut() {
                result.position_count += market.positions.len() as u64;

                if market.has_open_positions() {
                    match self.process_open_market(wallet, market, cutoff_ts).await {
                        Some((amounts, trades_in_range)) => {
                            result.open_pnl += amounts.pnl;
                            result.trade_count += trades_in_range;
                            result.open_amount_invested += amounts.invested;
                            result.open_amount_out += amounts.taken_out;
                            result.open_current_value += amounts.current_value;
                        }
                        None => continue,
                    }
                } else if let Some(amounts) = process_closed_market(market, cutoff_ts) {
                    result.closed_pnl += amounts.pnl;
                    result.trade_count += market.closed_position_count() as u64;
                    result.closed_amount_invested += amounts.invested;
                    result.closed_amount_out += amounts.taken_out;
                }
            }
        }
    }

    /// Open-market path: PnL must come from trade aggregates because the
    /// upstream PnL is unreliable while positions are open.
    async fn process_open_market(
        &self,
        wallet: &str,
        market: &mut MarketNode,
        cutoff_ts: i64,
    ) -> Option<(MarketAmounts, u64)> {
        let condition_id = market.condition_id.clone();
        let (transactions, latest_ts) =
            match self.activity_api.fetch_all_trades(wallet, &condition_id).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    warn!(
                        market = %market.question,
                        error = %e,
                        "trade fetch failed, market skipped"
                    );
                    return None;
                }
            };

        let daily_trades = aggregate_transactions(&condition_id, &transactions);
        if daily_trades.is_empty() {
            return None;
        }

        let amounts = market_amounts_from_trades(&daily_trades, &market.positions);
        market.set_pnl_calculations(amounts);
        if let Some(latest_ts) = latest_ts {
            market.mark_batch_timestamp(latest_ts);
        }

        let cutoff_date = cutoff_date_from_ts(cutoff_ts);
        let trades_in_range = has_trades_in_range(&daily_trades, cutoff_date);
        let closed_in_range = has_closed_positions_in_range(&market.positions, cutoff_ts);

        market.daily_trades = daily_trades;

        if trades_in_range || closed_in_range {
            let in_range = count_trades_in_range(&market.daily_trades, cutoff_date);
            Some((amounts, in_range))
        } else {
            None
        }
    }

    fn cutoff_timestamp(&self) -> i64 {
        (Utc::now() - Duration::days(self.config.activity_window_days)).timestamp()
    }
}

/// Closed-market path: upstream realized PnL is authoritative.
/// Returns the amounts only when the market has activity inside the window.
pub fn process_closed_market(market: &mut MarketNode, cutoff_ts: i64) -> Option<MarketAmounts> {
    let pnl: Decimal = market
        .positions
        .iter()
        .filter_map(|p| p.api_realized_pnl)
        .sum();
    let invested: Decimal = market.positions.iter().map(|p| p.amount_spent).sum();
    let taken_out = invested + pnl;

    let amounts = MarketAmounts {
        invested,
        taken_out,
        current_value: Decimal::ZERO,
        pnl,
    };
    market.set_pnl_calculations(amounts);

    if has_closed_positions_in_range(&market.positions, cutoff_ts) {
        Some(amounts)
    } else {
        None
    }
}

/// Build the event hierarchy from upstream position lists. Open positions
/// are folded in first so a market holding both keeps its open flag.
pub fn build_event_hierarchy(
    open_positions: &[ApiPosition],
    closed_positions: &[ApiPosition],
) -> HashMap<String, EventNode> {
    let mut hierarchy: HashMap<String, EventNode> = HashMap::new();

    let tagged = open_positions
        .iter()
        .map(|p| (p, PositionStatus::Open))
        .chain(closed_positions.iter().map(|p| (p, PositionStatus::Closed)));

    for (api_position, status) in tagged {
        let event = hierarchy
            .entry(api_position.event_slug.clone())
            .or_insert_with(|| EventNode::new(api_position.event_slug.clone()));
        let market = event.market_mut(&api_position.condition_id);

        if market.market_slug.is_empty() {
            market.market_slug = api_position.slug.clone();
            market.question = api_position.title.clone();
            market.end_date = api_position.end_date.as_deref().and_then(parse_utc_datetime);
            market.is_open = status == PositionStatus::Open;
        }

        market.add_position(snapshot_from_api(api_position, status));
    }

    hierarchy
}

fn snapshot_from_api(api: &ApiPosition, status: PositionStatus) -> PositionSnapshot {
    PositionSnapshot {
        outcome: api.outcome.clone(),
        opposite_outcome: api.opposite_outcome.clone(),
        title: api.title.clone(),
        total_shares: api.total_bought,
        current_shares: api.size,
        average_entry_price: api.avg_price,
        amount_spent: api.amount_spent(),
        amount_remaining: api.current_value,
        api_realized_pnl: (status == PositionStatus::Closed).then_some(api.realized_pnl),
        end_date: api.end_date.as_deref().and_then(parse_utc_datetime),
        negative_risk: api.negative_risk,
        position_status: status,
        trade_status: TradeStatus::NeedToPullTrades,
        closed_at: api.timestamp,
        calculated_amount_invested: Decimal::ZERO,
        calculated_amount_out: Decimal::ZERO,
        calculated_current_value: Decimal::ZERO,
        realized_pnl: Decimal::ZERO,
        unrealized_pnl: Decimal::ZERO,
    }
}

fn cutoff_date_from_ts(cutoff_ts: i64) -> NaiveDate {
    DateTime::<Utc>::from_timestamp(cutoff_ts, 0)
        .unwrap_or_default()
        .date_naive()
}

/// The latest trade date decides range membership: if the newest day is
/// before the cutoff, every day is.
fn has_trades_in_range(daily_trades: &BTreeMap<NaiveDate, DailyTrades>, cutoff: NaiveDate) -> bool {
    daily_trades
        .keys()
        .next_back()
        .map(|latest| *latest >= cutoff)
        .unwrap_or(false)
}

/// Number of aggregated trade rows on days inside the window.
fn count_trades_in_range(
    daily_trades: &BTreeMap<NaiveDate, DailyTrades>,
    cutoff: NaiveDate,
) -> u64 {
    daily_trades
        .iter()
        .filter(|(date, _)| **date >= cutoff)
        .map(|(_, day)| day.len() as u64)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyscout_core::aggregation::aggregate_transactions;
    use polyscout_core::api::ActivityTransaction;
    use rust_decimal_macros::dec;

    fn api_position(
        event_slug: &str,
        condition_id: &str,
        outcome: &str,
        realized_pnl: Decimal,
    ) -> ApiPosition {
        ApiPosition {
            proxy_wallet: "0xabc".to_string(),
            condition_id: condition_id.to_string(),
            event_slug: event_slug.to_string(),
            slug: format!("{condition_id}-slug"),
            title: "Who wins?".to_string(),
            outcome: outcome.to_string(),
            opposite_outcome: if outcome == "Yes" { "No" } else { "Yes" }.to_string(),
            avg_price: dec!(0.4),
            total_bought: dec!(50),
            realized_pnl,
            timestamp: Some(Utc::now().timestamp() - 3600),
            ..Default::default()
        }
    }

    #[test]
    fn hierarchy_groups_by_event_and_market() {
        let open = vec![
            api_position("ev1", "0xc1", "Yes", dec!(0)),
            api_position("ev1", "0xc1", "No", dec!(0)),
            api_position("ev1", "0xc2", "Yes", dec!(0)),
        ];
        let closed = vec![api_position("ev2", "0xc3", "Yes", dec!(7))];

        let hierarchy = build_event_hierarchy(&open, &closed);
        assert_eq!(hierarchy.len(), 2);
        assert_eq!(hierarchy["ev1"].markets.len(), 2);
        assert_eq!(hierarchy["ev1"].markets["0xc1"].positions.len(), 2);
        assert!(hierarchy["ev1"].markets["0xc1"].is_open);
        assert!(!hierarchy["ev2"].markets["0xc3"].is_open);
        // Closed positions carry the upstream realized PnL.
        assert_eq!(
            hierarchy["ev2"].markets["0xc3"].positions[0].api_realized_pnl,
            Some(dec!(7))
        );
    }

    #[test]
    fn closed_market_amounts_derive_from_api_pnl() {
        let closed: Vec<ApiPosition> = (0..10)
            .map(|i| api_position("ev", "0xc", if i % 2 == 0 { "Yes" } else { "No" }, dec!(500)))
            .collect();
        // Distinct outcomes collapse; use one market with 10 snapshots.
        let mut market = MarketNode::new("0xc");
        for p in &closed {
            market.add_position(super::snapshot_from_api(p, PositionStatus::Closed));
        }

        let cutoff = (Utc::now() - Duration::days(30)).timestamp();
        let amounts = process_closed_market(&mut market, cutoff).unwrap();
        // 10 × 500 realized, 10 × 50·0.4 = 200 invested.
        assert_eq!(amounts.pnl, dec!(5000));
        assert_eq!(amounts.invested, dec!(200));
        assert_eq!(amounts.taken_out, dec!(5200));
        // Every position carries the market-level values.
        for p in &market.positions {
            assert_eq!(p.calculated_amount_invested, dec!(200));
            assert_eq!(p.calculated_amount_out, dec!(5200));
        }
    }

    #[test]
    fn closed_market_out_of_window_contributes_nothing() {
        let mut stale = api_position("ev", "0xc", "Yes", dec!(100));
        stale.timestamp = Some(1_000_000); // 1970s
        stale.end_date = Some("2001-01-01T00:00:00Z".to_string());
        let mut market = MarketNode::new("0xc");
        market.add_position(super::snapshot_from_api(&stale, PositionStatus::Closed));

        let cutoff = (Utc::now() - Duration::days(30)).timestamp();
        assert!(process_closed_market(&mut market, cutoff).is_none());
        // Amounts are still stamped onto the positions even when the market
        // does not contribute to evaluation totals.
        assert_eq!(market.positions[0].calculated_amount_out, dec!(120));
    }

    #[test]
    fn in_range_trade_counting() {
        let mut tx = ActivityTransaction {
            condition_id: "0xc".to_string(),
            activity_type: "TRADE".to_string(),
            side: "BUY".to_string(),
            outcome: "Yes".to_string(),
            size: dec!(1),
            usdc_size: dec!(1),
            timestamp: Utc::now().timestamp(),
            ..Default::default()
        };
        let recent = tx.clone();
        tx.timestamp -= 86_400 * 60;
        let old = tx;

        let daily = aggregate_transactions("0xc", &[recent, old]);
        let cutoff = (Utc::now() - Duration::days(30)).date_naive();
        assert!(has_trades_in_range(&daily, cutoff));
        assert_eq!(count_trades_in_range(&daily, cutoff), 1);

        let future_cutoff = (Utc::now() + Duration::days(1)).date_naive();
        assert!(!has_trades_in_range(&daily, future_cutoff));
    }
}
