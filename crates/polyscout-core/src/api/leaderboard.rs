//! Leaderboard API client, used by wallet discovery.

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use super::DATA_API_BASE_URL;
use crate::http::RateLimitedClient;
use crate::Result;

pub const LEADERBOARD_PAGE_SIZE: u32 = 50;

/// One leaderboard row.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeaderboardEntry {
    pub proxy_wallet: String,
    pub user_name: String,
    pub pnl: Decimal,
    pub vol: Decimal,
    pub profile_image: Option<String>,
    pub x_username: Option<String>,
    pub verified_badge: bool,
    pub rank: Option<i32>,
}

impl Default for LeaderboardEntry {
    fn default() -> Self {
        Self {
            proxy_wallet: String::new(),
            user_name: String::new(),
            pnl: Decimal::ZERO,
            vol: Decimal::ZERO,
            profile_image: None,
            x_username: None,
            verified_badge: false,
            rank: None,
        }
    }
}

/// Client for `GET /v1/leaderboard`.
#[derive(Clone)]
pub struct LeaderboardApi {
    client: RateLimitedClient,
    base_url: String,
}

impl LeaderboardApi {
    pub fn new(client: RateLimitedClient) -> Self {
        Self {
            client,
            base_url: DATA_API_BASE_URL.to_string(),
        }
    }

    /// Fetch one page ordered by all-time PnL for a category.
    pub async fn fetch_page(
        &self,
        category: &str,
        offset: u32,
    ) -> Result<Vec<LeaderboardEntry>> {
        let url = format!("{}/v1/leaderboard", self.base_url);
        let query = [
            ("timePeriod", "all".to_string()),
            ("orderBy", "PNL".to_string()),
            ("limit", LEADERBOARD_PAGE_SIZE.to_string()),
            ("offset", offset.to_string()),
            ("category", category.to_string()),
        ];
        let query: Vec<(&str, String)> = query.into_iter().collect();

        let page: Vec<LeaderboardEntry> = self
            .client
            .get_json(&url, &query)
            .await?
            .unwrap_or_default();

        debug!(category, offset, records = page.len(), "fetched leaderboard page");
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_deserializes_from_upstream_shape() {
        let raw = r#"{
            "proxyWallet": "0xabc",
            "userName": "trader",
            "pnl": 25000.5,
            "vol": 1000000,
            "profileImage": null,
            "xUsername": "trader_x",
            "verifiedBadge": true,
            "rank": 3
        }"#;
        let entry: LeaderboardEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(entry.proxy_wallet, "0xabc");
        assert_eq!(entry.pnl, Decimal::new(250005, 1));
        assert!(entry.verified_badge);
        assert_eq!(entry.rank, Some(3));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let entry: LeaderboardEntry =
            serde_json::from_str(r#"{"proxyWallet": "0xabc"}"#).unwrap();
        assert_eq!(entry.pnl, Decimal::ZERO);
        assert_eq!(entry.rank, None);
        assert!(!entry.verified_badge);
    }
}
