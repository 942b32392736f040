//! Position-count limit validation for candidate wallets.

use chrono::Utc;
use tracing::info;

use polyscout_core::api::ApiPosition;
use polyscout_core::config::DiscoveryConfig;

/// Count open positions whose market end date (end of day) is in the
/// future. Positions without a parseable end date are ignored.
pub fn count_valid_open_positions(open_positions: &[ApiPosition], now_ts: i64) -> usize {
    open_positions
        .iter()
        .filter(|p| p.has_future_end_date(now_ts))
        .count()
}

/// Validate a candidate's position counts against the discovery caps.
/// Returns the failure reason when a cap is exceeded.
pub fn validate_position_limits(
    open_positions: &[ApiPosition],
    closed_positions: &[ApiPosition],
    config: &DiscoveryConfig,
    wallet: &str,
) -> Option<String> {
    let now_ts = Utc::now().timestamp();

    let open_count = count_valid_open_positions(open_positions, now_ts);
    if open_count > config.max_open_positions_with_future_end_date {
        let reason = format!(
            "open positions with future end date exceed limit: {} > {}",
            open_count, config.max_open_positions_with_future_end_date
        );
        info!(wallet = %&wallet[..wallet.len().min(10)], %reason, "candidate rejected");
        return Some(reason);
    }

    let closed_count = closed_positions.len();
    if closed_count > config.max_closed_positions {
        let reason = format!(
            "closed positions exceed limit: {} > {}",
            closed_count, config.max_closed_positions
        );
        info!(wallet = %&wallet[..wallet.len().min(10)], %reason, "candidate rejected");
        return Some(reason);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use polyscout_core::config::DiscoveryConfig;
    use rust_decimal::Decimal;

    fn config(max_open: usize, max_closed: usize) -> DiscoveryConfig {
        DiscoveryConfig {
            min_leaderboard_pnl: Decimal::new(20_000, 0),
            max_open_positions_with_future_end_date: max_open,
            max_closed_positions: max_closed,
            trade_count_threshold: 20,
            position_count_threshold: 10,
            pnl_threshold: Decimal::new(10_000, 0),
            activity_window_days: 30,
            blacklisted_wallets: HashSet::new(),
        }
    }

    fn position(end_date: Option<&str>) -> ApiPosition {
        ApiPosition {
            end_date: end_date.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn only_future_end_dates_count() {
        let now_ts = Utc::now().timestamp();
        let positions = vec![
            position(Some("2099-01-01T00:00:00Z")),
            position(Some("2001-01-01T00:00:00Z")),
            position(None),
            position(Some("1970-01-01T00:00:00Z")),
        ];
        assert_eq!(count_valid_open_positions(&positions, now_ts), 1);
    }

    #[test]
    fn open_cap_rejects() {
        let open: Vec<ApiPosition> = (0..3)
            .map(|_| position(Some("2099-01-01T00:00:00Z")))
            .collect();
        let reason = validate_position_limits(&open, &[], &config(2, 100), "0xabc");
        assert!(reason.unwrap().contains("open positions"));
    }

    #[test]
    fn closed_cap_rejects() {
        let closed: Vec<ApiPosition> = (0..5).map(|_| position(None)).collect();
        let reason = validate_position_limits(&[], &closed, &config(100, 4), "0xabc");
        assert!(reason.unwrap().contains("closed positions"));
    }

    #[test]
    fn within_caps_passes() {
        let open = vec![position(Some("2099-01-01T00:00:00Z"))];
        let closed = vec![position(None)];
        assert!(validate_position_limits(&open, &closed, &config(10, 10), "0xabc").is_none());
    }
}
