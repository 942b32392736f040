//! Recently-closed position enrichment.
//!
//! Positions flagged `POSITION_CLOSED_NEED_DATA` vanished from upstream's
//! open list; this scheduler fetches the authoritative closed-position
//! record per (wallet, market), matches entries to stored rows by outcome,
//! and flips them to CLOSED with the upstream realized PnL.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{info, warn};

use polyscout_core::api::{ApiPosition, PositionsApi};
use polyscout_core::db::positions::{ClosedPositionUpdate, RecentlyClosedPosition};
use polyscout_core::db::PositionRepository;
use polyscout_core::Result;

use crate::stats::TickStats;

pub struct ClosedPositionScheduler {
    positions_api: PositionsApi,
    positions: PositionRepository,
}

impl ClosedPositionScheduler {
    pub fn new(positions_api: PositionsApi, positions: PositionRepository) -> Self {
        Self {
            positions_api,
            positions,
        }
    }

    pub async fn tick(&self) -> Result<TickStats> {
        let started = Instant::now();
        let mut stats = TickStats::default();

        let pending = self.positions.get_recently_closed().await?;
        if pending.is_empty() {
            info!("no recently-closed positions to enrich");
            return Ok(stats);
        }

        let groups = group_by_wallet_and_market(pending);
        info!(groups = groups.len(), "closed-position enrichment started");

        let mut all_updates: Vec<ClosedPositionUpdate> = Vec::new();
        for ((proxy_wallet, condition_id), entries) in groups {
            match self
                .positions_api
                .fetch_closed_positions_for_market(&proxy_wallet, &condition_id)
                .await
            {
                Ok(api_positions) => {
                    let updates = match_closed_positions(&entries, &api_positions);
                    stats.record_success();
                    info!(
                        wallet = %&proxy_wallet[..proxy_wallet.len().min(10)],
                        market = %&condition_id[..condition_id.len().min(10)],
                        updates = updates.len(),
                        "group enriched"
                    );
                    all_updates.extend(updates);
                }
                Err(e) => {
                    warn!(
                        wallet = %&proxy_wallet[..proxy_wallet.len().min(10)],
                        market = %&condition_id[..condition_id.len().min(10)],
                        error = %e,
                        "closed-position fetch failed"
                    );
                    stats.record_failure(&condition_id, &e);
                }
            }
        }

        if !all_updates.is_empty() {
            let updated = self.positions.bulk_update_closed_positions(&all_updates).await?;
            info!(updated, "closed positions enriched");
        }

        stats.finish(started);
        Ok(stats)
    }
}

/// One upstream call covers every pending position of a (wallet, market).
pub fn group_by_wallet_and_market(
    pending: Vec<RecentlyClosedPosition>,
) -> HashMap<(String, String), Vec<RecentlyClosedPosition>> {
    let mut groups: HashMap<(String, String), Vec<RecentlyClosedPosition>> = HashMap::new();
    for position in pending {
        groups
            .entry((position.proxy_wallet.clone(), position.condition_id.clone()))
            .or_default()
            .push(position);
    }
    groups
}

/// Match stored positions to API entries by outcome. Duplicate outcomes in
/// the response keep the first occurrence.
pub fn match_closed_positions(
    entries: &[RecentlyClosedPosition],
    api_positions: &[ApiPosition],
) -> Vec<ClosedPositionUpdate> {
    let mut by_outcome: HashMap<&str, &ApiPosition> = HashMap::new();
    for api_position in api_positions {
        by_outcome.entry(&api_position.outcome).or_insert(api_position);
    }

    entries
        .iter()
        .filter_map(|entry| {
            by_outcome
                .get(entry.outcome.as_str())
                .map(|api_position| ClosedPositionUpdate {
                    position_id: entry.position_id,
                    total_shares: api_position.total_bought,
                    average_entry_price: api_position.avg_price,
                    amount_spent: api_position.amount_spent(),
                    api_realized_pnl: Some(api_position.realized_pnl),
                    closed_at: api_position.timestamp,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pending(position_id: i64, wallet: &str, condition_id: &str, outcome: &str) -> RecentlyClosedPosition {
        RecentlyClosedPosition {
            position_id,
            wallet_id: 1,
            proxy_wallet: wallet.to_string(),
            market_id: 2,
            condition_id: condition_id.to_string(),
            outcome: outcome.to_string(),
        }
    }

    fn api(outcome: &str, total_bought: &str, avg_price: &str, realized_pnl: &str) -> ApiPosition {
        ApiPosition {
            outcome: outcome.to_string(),
            total_bought: total_bought.parse().unwrap(),
            avg_price: avg_price.parse().unwrap(),
            realized_pnl: realized_pnl.parse().unwrap(),
            timestamp: Some(1_700_000_000),
            ..Default::default()
        }
    }

    #[test]
    fn grouping_collapses_by_wallet_and_market() {
        let groups = group_by_wallet_and_market(vec![
            pending(1, "0xw1", "0xc1", "Yes"),
            pending(2, "0xw1", "0xc1", "No"),
            pending(3, "0xw1", "0xc2", "Yes"),
            pending(4, "0xw2", "0xc1", "Yes"),
        ]);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[&("0xw1".to_string(), "0xc1".to_string())].len(), 2);
    }

    #[test]
    fn enrichment_carries_api_fields() {
        let entries = vec![pending(11, "0xw", "0xc", "No")];
        let api_positions = vec![api("No", "50", "0.4", "7.0")];
        let updates = match_closed_positions(&entries, &api_positions);
        assert_eq!(updates.len(), 1);
        let update = &updates[0];
        assert_eq!(update.position_id, 11);
        assert_eq!(update.total_shares, dec!(50));
        assert_eq!(update.average_entry_price, dec!(0.4));
        assert_eq!(update.amount_spent, dec!(20));
        assert_eq!(update.api_realized_pnl, Some(dec!(7.0)));
        assert_eq!(update.closed_at, Some(1_700_000_000));
    }

    #[test]
    fn first_duplicate_outcome_wins() {
        let entries = vec![pending(11, "0xw", "0xc", "No")];
        let api_positions = vec![api("No", "50", "0.4", "7.0"), api("No", "99", "0.9", "0.0")];
        let updates = match_closed_positions(&entries, &api_positions);
        assert_eq!(updates[0].total_shares, dec!(50));
    }

    #[test]
    fn unmatched_outcome_is_skipped() {
        let entries = vec![pending(11, "0xw", "0xc", "Yes")];
        let api_positions = vec![api("No", "50", "0.4", "7.0")];
        assert!(match_closed_positions(&entries, &api_positions).is_empty());
    }
}
