//! Open and closed position API clients.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{end_of_day_timestamp, DATA_API_BASE_URL};
use crate::http::RateLimitedClient;
use crate::Result;

pub const OPEN_POSITIONS_PAGE_SIZE: u32 = 500;
pub const CLOSED_POSITIONS_PAGE_SIZE: u32 = 50;

/// One position record from the data API. Used for both open and closed
/// positions; which list it came from decides its lifecycle status.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiPosition {
    pub proxy_wallet: String,
    pub condition_id: String,
    pub event_slug: String,
    pub slug: String,
    pub title: String,
    pub outcome: String,
    pub opposite_outcome: String,
    pub avg_price: Decimal,
    pub total_bought: Decimal,
    pub end_date: Option<String>,
    pub negative_risk: bool,
    /// Open positions: current share count.
    pub size: Decimal,
    /// Open positions: mark-to-market value.
    pub current_value: Decimal,
    /// Closed positions: upstream-reported realized PnL.
    pub realized_pnl: Decimal,
    /// Closed positions: close time, epoch seconds.
    pub timestamp: Option<i64>,
    /// Outcome token id.
    pub asset: Option<String>,
}

impl Default for ApiPosition {
    fn default() -> Self {
        Self {
            proxy_wallet: String::new(),
            condition_id: String::new(),
            event_slug: String::new(),
            slug: String::new(),
            title: String::new(),
            outcome: String::new(),
            opposite_outcome: String::new(),
            avg_price: Decimal::ZERO,
            total_bought: Decimal::ZERO,
            end_date: None,
            negative_risk: false,
            size: Decimal::ZERO,
            current_value: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            timestamp: None,
            asset: None,
        }
    }
}

impl ApiPosition {
    /// Whether the position's market end date (end of day) is in the future.
    pub fn has_future_end_date(&self, now_ts: i64) -> bool {
        self.end_date
            .as_deref()
            .and_then(end_of_day_timestamp)
            .map(|end| end > now_ts)
            .unwrap_or(false)
    }

    /// Amount spent building the position, per the upstream convention.
    pub fn amount_spent(&self) -> Decimal {
        self.total_bought * self.avg_price
    }
}

/// Client for `GET /positions` and `GET /closed-positions`.
#[derive(Clone)]
pub struct PositionsApi {
    open_client: RateLimitedClient,
    closed_client: RateLimitedClient,
    base_url: String,
}

impl PositionsApi {
    pub fn new(open_client: RateLimitedClient, closed_client: RateLimitedClient) -> Self {
        Self {
            open_client,
            closed_client,
            base_url: DATA_API_BASE_URL.to_string(),
        }
    }

    /// Fetch all open positions for a wallet.
    pub async fn fetch_open_positions(&self, wallet: &str) -> Result<Vec<ApiPosition>> {
        self.fetch_open_internal(wallet, None).await
    }

    /// Fetch open positions, stopping early once the count of positions with
    /// a future end date exceeds `cap`. Used by discovery to reject bulk
    /// holders without paying for the full pagination.
    pub async fn fetch_open_positions_with_limit_check(
        &self,
        wallet: &str,
        cap: usize,
    ) -> Result<Vec<ApiPosition>> {
        self.fetch_open_internal(wallet, Some(cap)).await
    }

    async fn fetch_open_internal(
        &self,
        wallet: &str,
        cap: Option<usize>,
    ) -> Result<Vec<ApiPosition>> {
        let url = format!("{}/positions", self.base_url);
        let now_ts = Utc::now().timestamp();
        let mut all = Vec::new();
        let mut valid_open = 0usize;
        let mut offset = 0u32;

        loop {
            let query: Vec<(&str, String)> = vec![
                ("user", wallet.to_string()),
                ("limit", OPEN_POSITIONS_PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
                ("sortBy", "CURRENT".to_string()),
                ("sortDirection", "DESC".to_string()),
            ];

            let raw: Vec<serde_json::Value> = self
                .open_client
                .get_json(&url, &query)
                .await?
                .unwrap_or_default();

            if raw.is_empty() {
                break;
            }
            let page_len = raw.len();

            for value in raw {
                let position = match serde_json::from_value::<ApiPosition>(value) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(wallet = %short(wallet), error = %e, "skipping malformed open position");
                        continue;
                    }
                };

                if let Some(cap) = cap {
                    if position.has_future_end_date(now_ts) {
                        valid_open += 1;
                        if valid_open > cap {
                            all.push(position);
                            debug!(
                                wallet = %short(wallet),
                                positions = all.len(),
                                valid_open,
                                "open position cap exceeded, stopping pagination"
                            );
                            return Ok(all);
                        }
                    }
                }
                all.push(position);
            }

            if page_len < OPEN_POSITIONS_PAGE_SIZE as usize {
                break;
            }
            offset += OPEN_POSITIONS_PAGE_SIZE;
        }

        debug!(wallet = %short(wallet), positions = all.len(), "fetched open positions");
        Ok(all)
    }

    /// Fetch all closed positions for a wallet.
    pub async fn fetch_closed_positions(&self, wallet: &str) -> Result<Vec<ApiPosition>> {
        self.fetch_closed_internal(wallet, None, None).await
    }

    /// Fetch closed positions, stopping early once `cap` is exceeded.
    pub async fn fetch_closed_positions_with_limit_check(
        &self,
        wallet: &str,
        cap: usize,
    ) -> Result<Vec<ApiPosition>> {
        self.fetch_closed_internal(wallet, None, Some(cap)).await
    }

    /// Fetch closed positions for a single market. Used by the
    /// recently-closed enrichment scheduler.
    pub async fn fetch_closed_positions_for_market(
        &self,
        wallet: &str,
        condition_id: &str,
    ) -> Result<Vec<ApiPosition>> {
        self.fetch_closed_internal(wallet, Some(condition_id), None)
            .await
    }

    async fn fetch_closed_internal(
        &self,
        wallet: &str,
        condition_id: Option<&str>,
        cap: Option<usize>,
    ) -> Result<Vec<ApiPosition>> {
        let url = format!("{}/closed-positions", self.base_url);
        let mut all = Vec::new();
        let mut offset = 0u32;

        loop {
            let mut query: Vec<(&str, String)> = vec![
                ("user", wallet.to_string()),
                ("limit", CLOSED_POSITIONS_PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
                ("sortBy", "REALIZEDPNL".to_string()),
                ("sortDirection", "DESC".to_string()),
            ];
            if let Some(condition_id) = condition_id {
                query.push(("market", condition_id.to_string()));
            }

            let raw: Vec<serde_json::Value> = self
                .closed_client
                .get_json(&url, &query)
                .await?
                .unwrap_or_default();

            if raw.is_empty() {
                break;
            }
            let page_len = raw.len();

            for value in raw {
                match serde_json::from_value::<ApiPosition>(value) {
                    Ok(p) => all.push(p),
                    Err(e) => {
                        warn!(wallet = %short(wallet), error = %e, "skipping malformed closed position");
                    }
                }
            }

            if let Some(cap) = cap {
                if all.len() > cap {
                    debug!(
                        wallet = %short(wallet),
                        positions = all.len(),
                        "closed position cap exceeded, stopping pagination"
                    );
                    return Ok(all);
                }
            }

            if page_len < CLOSED_POSITIONS_PAGE_SIZE as usize {
                break;
            }
            offset += CLOSED_POSITIONS_PAGE_SIZE;
        }

        debug!(wallet = %short(wallet), positions = all.len(), "fetched closed positions");
        Ok(all)
    }
}

fn short(wallet: &str) -> &str {
    &wallet[..wallet.len().min(10)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_deserializes_from_upstream_shape() {
        let raw = r#"{
            "proxyWallet": "0xabc",
            "conditionId": "0xcond",
            "eventSlug": "election-2026",
            "slug": "election-2026-winner",
            "title": "Who wins?",
            "outcome": "Yes",
            "oppositeOutcome": "No",
            "avgPrice": 0.3,
            "totalBought": 100,
            "endDate": "2099-01-01T00:00:00Z",
            "negativeRisk": false,
            "size": 100,
            "currentValue": 35.0,
            "realizedPnl": 0,
            "asset": "1234"
        }"#;
        let p: ApiPosition = serde_json::from_str(raw).unwrap();
        assert_eq!(p.outcome, "Yes");
        assert_eq!(p.amount_spent(), Decimal::new(30, 0));
        assert!(p.has_future_end_date(Utc::now().timestamp()));
    }

    #[test]
    fn epoch_start_end_date_is_not_future() {
        let p = ApiPosition {
            end_date: Some("1970-01-01T00:00:00Z".to_string()),
            ..Default::default()
        };
        assert!(!p.has_future_end_date(Utc::now().timestamp()));
    }

    #[test]
    fn missing_end_date_is_not_future() {
        let p = ApiPosition::default();
        assert!(!p.has_future_end_date(Utc::now().timestamp()));
    }
}
