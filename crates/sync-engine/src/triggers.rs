//! On-demand trigger surface.
//!
//! The web controller layer is a thin wrapper over these entry points; the
//! contract is the one it exposes: a validated request in, a
//! `{success, summary}` outcome back, and internal failures captured as an
//! error message rather than a panic.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use wallet_discovery::DiscoveryService;

use crate::closed_positions::ClosedPositionScheduler;
use crate::event_refresh::EventRefreshScheduler;
use crate::position_sync::PositionSyncScheduler;
use crate::trade_sync::TradeSyncScheduler;
use crate::wallet_pnl::{WalletPnlScheduler, DEFAULT_PERIODS};

/// Payload for the wallet PnL trigger.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WalletPnlRequest {
    pub wallet_ids: Option<Vec<i64>>,
    pub periods: Option<Vec<i64>>,
}

/// Payload for the leaderboard evaluation trigger.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscoveryRequest {
    pub min_pnl: Option<Decimal>,
}

/// Uniform outcome of any trigger.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerOutcome {
    pub success: bool,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TriggerOutcome {
    fn ok(summary: impl Into<String>) -> Self {
        Self {
            success: true,
            summary: summary.into(),
            error_message: None,
        }
    }

    fn failed(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            summary: String::new(),
            error_message: Some(error.to_string()),
        }
    }
}

/// Validate a trigger's period list: positive, at most the known windows.
pub fn validate_periods(periods: &[i64]) -> std::result::Result<(), String> {
    if periods.is_empty() {
        return Err("periods must not be empty".to_string());
    }
    for &period in periods {
        if !DEFAULT_PERIODS.contains(&period) {
            return Err(format!(
                "unknown period {period}; expected one of {DEFAULT_PERIODS:?}"
            ));
        }
    }
    Ok(())
}

/// Shared handles the trigger layer dispatches into.
#[derive(Clone)]
pub struct TriggerHub {
    pub discovery: Arc<DiscoveryService>,
    pub event_refresh: Arc<EventRefreshScheduler>,
    pub position_sync: Arc<PositionSyncScheduler>,
    pub trade_sync: Arc<TradeSyncScheduler>,
    pub closed_positions: Arc<ClosedPositionScheduler>,
    pub wallet_pnl: Arc<WalletPnlScheduler>,
    pub default_min_pnl: Decimal,
}

impl TriggerHub {
    pub async fn trigger_event_refresh(&self) -> TriggerOutcome {
        match self.event_refresh.tick().await {
            Ok(stats) => TriggerOutcome::ok(format!(
                "events refreshed: {} succeeded, {} failed in {:.2}s",
                stats.succeeded, stats.failed, stats.duration_seconds
            )),
            Err(e) => TriggerOutcome::failed(e),
        }
    }

    pub async fn trigger_position_sync(&self) -> TriggerOutcome {
        match self.position_sync.tick().await {
            Ok(stats) => TriggerOutcome::ok(format!(
                "positions reconciled: {} wallets succeeded, {} failed in {:.2}s",
                stats.succeeded, stats.failed, stats.duration_seconds
            )),
            Err(e) => TriggerOutcome::failed(e),
        }
    }

    pub async fn trigger_trade_sync(&self) -> TriggerOutcome {
        match self.trade_sync.tick().await {
            Ok(stats) => TriggerOutcome::ok(format!(
                "trades synced: {} wallets succeeded, {} failed in {:.2}s",
                stats.succeeded, stats.failed, stats.duration_seconds
            )),
            Err(e) => TriggerOutcome::failed(e),
        }
    }

    pub async fn trigger_closed_positions(&self) -> TriggerOutcome {
        match self.closed_positions.tick().await {
            Ok(stats) => TriggerOutcome::ok(format!(
                "closed positions enriched: {} groups succeeded, {} failed in {:.2}s",
                stats.succeeded, stats.failed, stats.duration_seconds
            )),
            Err(e) => TriggerOutcome::failed(e),
        }
    }

    pub async fn trigger_wallet_pnl(&self, request: WalletPnlRequest) -> TriggerOutcome {
        if let Some(ref periods) = request.periods {
            if let Err(message) = validate_periods(periods) {
                return TriggerOutcome::failed(message);
            }
        }
        match self
            .wallet_pnl
            .tick(request.wallet_ids, request.periods)
            .await
        {
            Ok(stats) => TriggerOutcome::ok(format!(
                "pnl calculated: {} snapshots succeeded, {} failed in {:.2}s",
                stats.succeeded, stats.failed, stats.duration_seconds
            )),
            Err(e) => TriggerOutcome::failed(e),
        }
    }

    pub async fn trigger_discovery(&self, request: DiscoveryRequest) -> TriggerOutcome {
        let min_pnl = request.min_pnl.unwrap_or(self.default_min_pnl);
        match self.discovery.discover_and_persist(min_pnl).await {
            Ok(report) => TriggerOutcome::ok(format!(
                "discovery: {} candidates, {} qualified, {} persisted, {} rejected in {:.2}s",
                report.candidates_found,
                report.qualified,
                report.persisted,
                report.rejected,
                report.duration_seconds
            )),
            Err(e) => TriggerOutcome::failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_validation() {
        assert!(validate_periods(&[30]).is_ok());
        assert!(validate_periods(&[30, 60, 90]).is_ok());
        assert!(validate_periods(&[]).is_err());
        assert!(validate_periods(&[45]).is_err());
        assert!(validate_periods(&[-30]).is_err());
    }

    #[test]
    fn request_payloads_deserialize() {
        let request: WalletPnlRequest =
            serde_json::from_str(r#"{"walletIds": [1, 2], "periods": [30, 90]}"#).unwrap();
        assert_eq!(request.wallet_ids, Some(vec![1, 2]));
        assert_eq!(request.periods, Some(vec![30, 90]));

        let empty: WalletPnlRequest = serde_json::from_str("{}").unwrap();
        assert!(empty.wallet_ids.is_none());

        let discovery: DiscoveryRequest =
            serde_json::from_str(r#"{"minPnl": 25000}"#).unwrap();
        assert_eq!(discovery.min_pnl, Some(Decimal::new(25_000, 0)));
    }

    #[test]
    fn outcome_serializes_without_null_error() {
        let outcome = TriggerOutcome::ok("done");
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"success\":true"));
        assert!(!json.contains("errorMessage"));

        let failed = TriggerOutcome::failed("boom");
        let json = serde_json::to_string(&failed).unwrap();
        assert!(json.contains("\"errorMessage\":\"boom\""));
    }
}
