//! Position reconciliation scheduler.
//!
//! Rescans every OLD active wallet's open positions against upstream and
//! classifies each stored position three ways: changed (refresh snapshot,
//! pull trades), vanished (closed upstream, needs enrichment), or reopened
//! (a CLOSED row matching an upstream open position). After the fan-out the
//! market-wise current values are recomputed and missing batch rows seeded.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use polyscout_core::api::{ApiPosition, PositionsApi};
use polyscout_core::db::positions::PositionSnapshotUpdate;
use polyscout_core::db::{PositionRepository, WalletRepository};
use polyscout_core::types::{Position, PositionStatus, TradeStatus, Wallet};
use polyscout_core::Result;

use crate::batch_sync::BatchSyncScheduler;
use crate::stats::TickStats;

/// Share/price comparisons tolerate float noise from upstream (1e-6).
fn share_epsilon() -> Decimal {
    Decimal::new(1, 6)
}

/// Money comparisons tolerate a cent.
fn money_epsilon() -> Decimal {
    Decimal::new(1, 2)
}

/// Changes produced by reconciling one wallet.
#[derive(Debug, Default)]
pub struct WalletReconcileOutcome {
    pub updates: Vec<PositionSnapshotUpdate>,
    pub updated: u64,
    pub marked_closed: u64,
    pub reopened: u64,
}

impl WalletReconcileOutcome {
    pub fn has_changes(&self) -> bool {
        !self.updates.is_empty()
    }

    pub fn total_changes(&self) -> u64 {
        self.updated + self.marked_closed + self.reopened
    }
}

pub struct PositionSyncScheduler {
    positions_api: PositionsApi,
    wallets: WalletRepository,
    positions: PositionRepository,
    batch_sync: BatchSyncScheduler,
    workers: usize,
}

impl PositionSyncScheduler {
    pub fn new(
        positions_api: PositionsApi,
        wallets: WalletRepository,
        positions: PositionRepository,
        batch_sync: BatchSyncScheduler,
        workers: usize,
    ) -> Self {
        Self {
            positions_api,
            wallets,
            positions,
            batch_sync,
            workers,
        }
    }

    pub async fn tick(&self) -> Result<TickStats> {
        let started = Instant::now();
        let mut stats = TickStats::default();

        let wallets = self.wallets.get_old_active_wallets().await?;
        if wallets.is_empty() {
            info!("no OLD wallets to reconcile");
            return Ok(stats);
        }

        info!(
            wallets = wallets.len(),
            workers = self.workers,
            "position reconciliation started"
        );

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut join_set: JoinSet<(String, Result<WalletReconcileOutcome>)> = JoinSet::new();

        for wallet in wallets {
            let semaphore = Arc::clone(&semaphore);
            let positions_api = self.positions_api.clone();
            let positions = self.positions.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                let outcome = reconcile_wallet(&positions_api, &positions, &wallet).await;
                (wallet.proxy_wallet, outcome)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((wallet, Ok(outcome))) => {
                    stats.record_success();
                    if outcome.has_changes() {
                        info!(
                            wallet = %&wallet[..wallet.len().min(10)],
                            changes = outcome.total_changes(),
                            updated = outcome.updated,
                            closed = outcome.marked_closed,
                            reopened = outcome.reopened,
                            "wallet reconciled"
                        );
                    }
                }
                Ok((wallet, Err(e))) => {
                    warn!(wallet = %&wallet[..wallet.len().min(10)], error = %e, "wallet reconcile failed");
                    stats.record_failure(&wallet, &e);
                }
                Err(e) => stats.record_failure("reconcile task", &e),
            }
        }

        // Positions only had amount_remaining refreshed; re-derive the
        // market-wise denormalized current value, then make sure every open
        // position has an active batch row for trade sync.
        if let Err(e) = self.positions.update_calculated_current_values().await {
            warn!(error = %e, "calculated current value update failed");
            stats.record_failure("current value update", &e);
        }
        match self.batch_sync.tick().await {
            Ok(created) if created > 0 => info!(created, "seeded missing batch rows"),
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "batch sync failed");
                stats.record_failure("batch sync", &e);
            }
        }

        stats.finish(started);
        info!(
            duration_secs = stats.duration_seconds,
            succeeded = stats.succeeded,
            failed = stats.failed,
            "position reconciliation complete"
        );

        Ok(stats)
    }
}

async fn reconcile_wallet(
    positions_api: &PositionsApi,
    positions: &PositionRepository,
    wallet: &Wallet,
) -> Result<WalletReconcileOutcome> {
    let api_positions = positions_api.fetch_open_positions(&wallet.proxy_wallet).await?;
    let stored_open = positions
        .get_positions_by_status(wallet.wallet_id, PositionStatus::Open)
        .await?;

    let api_map = api_position_map(&api_positions);
    let mut outcome = diff_open_positions(&stored_open, &api_map);

    // Case 3 (reopen) touches the store only when upstream reports open
    // positions the open set does not know.
    let open_keys: std::collections::HashSet<String> =
        stored_open.iter().map(position_key).collect();
    let leftover: Vec<&str> = api_map
        .keys()
        .filter(|k| !open_keys.contains(*k))
        .map(String::as_str)
        .collect();
    if !leftover.is_empty() {
        let stored_closed = positions
            .get_positions_by_status(wallet.wallet_id, PositionStatus::Closed)
            .await?;
        diff_reopened_positions(&stored_closed, &api_map, &leftover, &mut outcome);
    }

    if outcome.has_changes() {
        positions.bulk_update_snapshots(&outcome.updates).await?;
    } else {
        debug!(wallet = %wallet.short_address(), "no position changes");
    }

    Ok(outcome)
}

fn position_key(position: &Position) -> String {
    format!("{}_{}", position.condition_id, position.outcome)
}

fn api_key(position: &ApiPosition) -> String {
    format!("{}_{}", position.condition_id, position.outcome)
}

fn api_position_map(api_positions: &[ApiPosition]) -> HashMap<String, &ApiPosition> {
    api_positions.iter().map(|p| (api_key(p), p)).collect()
}

/// Cases 1 and 2: stored OPEN positions against the upstream open set.
pub fn diff_open_positions(
    stored_open: &[Position],
    api_map: &HashMap<String, &ApiPosition>,
) -> WalletReconcileOutcome {
    let mut outcome = WalletReconcileOutcome::default();

    for stored in stored_open {
        match api_map.get(&position_key(stored)) {
            Some(api_position) => {
                if needs_update(stored, api_position) {
                    outcome
                        .updates
                        .push(snapshot_update(stored, api_position, PositionStatus::Open));
                    outcome.updated += 1;
                }
            }
            None => {
                // Gone from upstream's open list: closed on the platform.
                // Status stays OPEN until enrichment confirms the close.
                outcome.updates.push(PositionSnapshotUpdate {
                    position_id: stored.position_id,
                    position_status: stored.position_status,
                    trade_status: TradeStatus::PositionClosedNeedData,
                    total_shares: stored.total_shares,
                    current_shares: stored.current_shares,
                    average_entry_price: stored.average_entry_price,
                    amount_spent: stored.amount_spent,
                    amount_remaining: stored.amount_remaining,
                });
                outcome.marked_closed += 1;
            }
        }
    }

    outcome
}

/// Case 3: upstream open positions that match a stored CLOSED row.
pub fn diff_reopened_positions(
    stored_closed: &[Position],
    api_map: &HashMap<String, &ApiPosition>,
    leftover_api_keys: &[&str],
    outcome: &mut WalletReconcileOutcome,
) {
    let closed_map: HashMap<String, &Position> =
        stored_closed.iter().map(|p| (position_key(p), p)).collect();

    for key in leftover_api_keys {
        if let (Some(stored), Some(api_position)) = (closed_map.get(*key), api_map.get(*key)) {
            outcome
                .updates
                .push(snapshot_update(stored, api_position, PositionStatus::Open));
            outcome.reopened += 1;
        }
    }
}

/// Whether any tracked snapshot field moved past its threshold.
fn needs_update(stored: &Position, api_position: &ApiPosition) -> bool {
    (stored.total_shares - api_position.size).abs() > share_epsilon()
        || (stored.average_entry_price - api_position.avg_price).abs() > share_epsilon()
        || (stored.amount_remaining - api_position.current_value).abs() > money_epsilon()
        || (stored.amount_spent - api_position.amount_spent()).abs() > money_epsilon()
}

fn snapshot_update(
    stored: &Position,
    api_position: &ApiPosition,
    status: PositionStatus,
) -> PositionSnapshotUpdate {
    PositionSnapshotUpdate {
        position_id: stored.position_id,
        position_status: status,
        trade_status: TradeStatus::NeedToPullTrades,
        total_shares: api_position.size,
        current_shares: api_position.size,
        average_entry_price: api_position.avg_price,
        amount_spent: api_position.amount_spent(),
        amount_remaining: api_position.current_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn stored(condition_id: &str, outcome: &str, status: PositionStatus) -> Position {
        Position {
            position_id: 1,
            wallet_id: 10,
            market_id: 20,
            condition_id: condition_id.to_string(),
            outcome: outcome.to_string(),
            opposite_outcome: String::new(),
            title: String::new(),
            position_status: status,
            trade_status: TradeStatus::TradesSynced,
            total_shares: dec!(100),
            current_shares: dec!(100),
            average_entry_price: dec!(0.3),
            amount_spent: dec!(30),
            amount_remaining: dec!(35),
            calculated_amount_invested: Decimal::ZERO,
            calculated_amount_out: Decimal::ZERO,
            calculated_current_value: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            api_realized_pnl: None,
            end_date: None,
            negative_risk: false,
            closed_at: None,
            last_updated_at: Utc::now(),
        }
    }

    fn api(condition_id: &str, outcome: &str, size: Decimal, price: Decimal, value: Decimal) -> ApiPosition {
        ApiPosition {
            condition_id: condition_id.to_string(),
            outcome: outcome.to_string(),
            size,
            total_bought: size,
            avg_price: price,
            current_value: value,
            ..Default::default()
        }
    }

    #[test]
    fn unchanged_position_produces_no_update() {
        let stored_open = vec![stored("0xc", "Yes", PositionStatus::Open)];
        let api_positions = vec![api("0xc", "Yes", dec!(100), dec!(0.3), dec!(35))];
        let api_map = api_position_map(&api_positions);
        let outcome = diff_open_positions(&stored_open, &api_map);
        assert!(!outcome.has_changes());
    }

    #[test]
    fn changed_value_flags_need_to_pull_trades() {
        let stored_open = vec![stored("0xc", "Yes", PositionStatus::Open)];
        let api_positions = vec![api("0xc", "Yes", dec!(150), dec!(0.3), dec!(52.5))];
        let api_map = api_position_map(&api_positions);
        let outcome = diff_open_positions(&stored_open, &api_map);
        assert_eq!(outcome.updated, 1);
        let update = &outcome.updates[0];
        assert_eq!(update.trade_status, TradeStatus::NeedToPullTrades);
        assert_eq!(update.total_shares, dec!(150));
        assert_eq!(update.amount_spent, dec!(45));
        assert_eq!(update.position_status, PositionStatus::Open);
    }

    #[test]
    fn sub_threshold_drift_is_ignored() {
        let stored_open = vec![stored("0xc", "Yes", PositionStatus::Open)];
        // One cent below both money thresholds, shares drift within 1e-6.
        let api_positions = vec![api(
            "0xc",
            "Yes",
            dec!(100.0000005),
            dec!(0.3),
            dec!(35.005),
        )];
        let api_map = api_position_map(&api_positions);
        let outcome = diff_open_positions(&stored_open, &api_map);
        assert!(!outcome.has_changes());
    }

    #[test]
    fn vanished_position_is_marked_closed_need_data() {
        let stored_open = vec![stored("0xc", "Yes", PositionStatus::Open)];
        let api_map = HashMap::new();
        let outcome = diff_open_positions(&stored_open, &api_map);
        assert_eq!(outcome.marked_closed, 1);
        let update = &outcome.updates[0];
        assert_eq!(update.trade_status, TradeStatus::PositionClosedNeedData);
        // Still OPEN until enrichment flips it.
        assert_eq!(update.position_status, PositionStatus::Open);
        assert_eq!(update.total_shares, dec!(100));
    }

    #[test]
    fn reopened_position_restores_open_status() {
        let stored_closed = vec![stored("0xc", "Yes", PositionStatus::Closed)];
        let api_positions = vec![api("0xc", "Yes", dec!(100), dec!(0.3), dec!(35))];
        let api_map = api_position_map(&api_positions);
        let mut outcome = WalletReconcileOutcome::default();
        diff_reopened_positions(&stored_closed, &api_map, &["0xc_Yes"], &mut outcome);
        assert_eq!(outcome.reopened, 1);
        let update = &outcome.updates[0];
        assert_eq!(update.position_status, PositionStatus::Open);
        assert_eq!(update.trade_status, TradeStatus::NeedToPullTrades);
        assert_eq!(update.amount_spent, dec!(30));
        assert_eq!(update.amount_remaining, dec!(35));
    }

    #[test]
    fn unknown_api_key_does_not_reopen() {
        let stored_closed = vec![stored("0xc", "Yes", PositionStatus::Closed)];
        let api_positions = vec![api("0xother", "Yes", dec!(5), dec!(0.5), dec!(2))];
        let api_map = api_position_map(&api_positions);
        let mut outcome = WalletReconcileOutcome::default();
        diff_reopened_positions(&stored_closed, &api_map, &["0xother_Yes"], &mut outcome);
        assert_eq!(outcome.reopened, 0);
    }
}
