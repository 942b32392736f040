//! User activity (trades) API client.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use super::DATA_API_BASE_URL;
use crate::http::RateLimitedClient;
use crate::types::TradeType;
use crate::Result;

pub const ACTIVITY_PAGE_SIZE: u32 = 500;

/// One raw trade transaction from `GET /activity`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityTransaction {
    pub proxy_wallet: String,
    pub timestamp: i64,
    pub condition_id: String,
    #[serde(rename = "type")]
    pub activity_type: String,
    pub size: Decimal,
    pub usdc_size: Decimal,
    pub transaction_hash: String,
    pub price: Decimal,
    pub asset: String,
    pub side: String,
    pub outcome_index: i64,
    pub outcome: String,
    pub title: String,
    pub slug: String,
    pub event_slug: String,
}

impl Default for ActivityTransaction {
    fn default() -> Self {
        Self {
            proxy_wallet: String::new(),
            timestamp: 0,
            condition_id: String::new(),
            activity_type: String::new(),
            size: Decimal::ZERO,
            usdc_size: Decimal::ZERO,
            transaction_hash: String::new(),
            price: Decimal::ZERO,
            asset: String::new(),
            side: String::new(),
            outcome_index: 999,
            outcome: String::new(),
            title: String::new(),
            slug: String::new(),
            event_slug: String::new(),
        }
    }
}

impl ActivityTransaction {
    /// UTC calendar date of the transaction, the daily aggregation key.
    pub fn trade_date(&self) -> NaiveDate {
        DateTime::<Utc>::from_timestamp(self.timestamp, 0)
            .unwrap_or_default()
            .date_naive()
    }

    pub fn trade_type(&self) -> Result<TradeType> {
        TradeType::from_api_type(&self.activity_type, &self.side)
    }

    /// A losing redeem burns worthless shares: zero size and zero proceeds.
    /// These carry no accounting information and are filtered out.
    pub fn is_losing_redeem(&self) -> bool {
        self.activity_type == "REDEEM" && self.size.is_zero() && self.usdc_size.is_zero()
    }
}

/// Client for `GET /activity`.
#[derive(Clone)]
pub struct ActivityApi {
    client: RateLimitedClient,
    base_url: String,
}

impl ActivityApi {
    pub fn new(client: RateLimitedClient) -> Self {
        Self {
            client,
            base_url: DATA_API_BASE_URL.to_string(),
        }
    }

    /// Fetch every trade for a (wallet, market) pair, oldest to newest
    /// unbounded. Returns the transactions plus the maximum raw timestamp
    /// seen, which becomes the sync watermark.
    pub async fn fetch_all_trades(
        &self,
        wallet: &str,
        condition_id: &str,
    ) -> Result<(Vec<ActivityTransaction>, Option<i64>)> {
        self.fetch_paginated(wallet, condition_id, None, None).await
    }

    /// Fetch trades within `[start, end]` (epoch seconds).
    pub async fn fetch_trades_in_range(
        &self,
        wallet: &str,
        condition_id: &str,
        start: i64,
        end: i64,
    ) -> Result<(Vec<ActivityTransaction>, Option<i64>)> {
        self.fetch_paginated(wallet, condition_id, Some(start), Some(end))
            .await
    }

    async fn fetch_paginated(
        &self,
        wallet: &str,
        condition_id: &str,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<(Vec<ActivityTransaction>, Option<i64>)> {
        let url = format!("{}/activity", self.base_url);
        let mut all = Vec::new();
        let mut latest_timestamp: Option<i64> = None;
        let mut offset = 0u32;

        loop {
            let mut query: Vec<(&str, String)> = vec![
                ("user", wallet.to_string()),
                ("market", condition_id.to_string()),
                ("limit", ACTIVITY_PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
                ("sortBy", "TIMESTAMP".to_string()),
                ("sortDirection", "DESC".to_string()),
            ];
            if let Some(start) = start {
                query.push(("start", start.to_string()));
            }
            if let Some(end) = end {
                query.push(("end", end.to_string()));
            }

            let raw: Vec<serde_json::Value> = self
                .client
                .get_json(&url, &query)
                .await?
                .unwrap_or_default();

            if raw.is_empty() {
                break;
            }
            let page_len = raw.len();

            for value in raw {
                match serde_json::from_value::<ActivityTransaction>(value) {
                    Ok(tx) => {
                        latest_timestamp = Some(match latest_timestamp {
                            Some(current) => current.max(tx.timestamp),
                            None => tx.timestamp,
                        });
                        all.push(tx);
                    }
                    Err(e) => {
                        warn!(
                            wallet = %&wallet[..wallet.len().min(10)],
                            market = %&condition_id[..condition_id.len().min(10)],
                            error = %e,
                            "skipping malformed activity record"
                        );
                    }
                }
            }

            if page_len < ACTIVITY_PAGE_SIZE as usize {
                break;
            }
            offset += ACTIVITY_PAGE_SIZE;
        }

        debug!(
            wallet = %&wallet[..wallet.len().min(10)],
            market = %&condition_id[..condition_id.len().min(10)],
            trades = all.len(),
            latest_timestamp,
            "fetched activity"
        );
        Ok((all, latest_timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_deserializes_and_classifies() {
        let raw = r#"{
            "proxyWallet": "0xabc",
            "timestamp": 1700000000,
            "conditionId": "0xcond",
            "type": "TRADE",
            "size": 10,
            "usdcSize": 6,
            "transactionHash": "0xhash",
            "price": 0.6,
            "asset": "777",
            "side": "BUY",
            "outcomeIndex": 0,
            "outcome": "Yes",
            "title": "Who wins?",
            "slug": "who-wins",
            "eventSlug": "election"
        }"#;
        let tx: ActivityTransaction = serde_json::from_str(raw).unwrap();
        assert_eq!(tx.trade_type().unwrap(), TradeType::Buy);
        assert_eq!(tx.trade_date().to_string(), "2023-11-14");
        assert!(!tx.is_losing_redeem());
    }

    #[test]
    fn losing_redeem_detection() {
        let tx = ActivityTransaction {
            activity_type: "REDEEM".to_string(),
            ..Default::default()
        };
        assert!(tx.is_losing_redeem());

        let winning = ActivityTransaction {
            activity_type: "REDEEM".to_string(),
            size: Decimal::new(5, 0),
            usdc_size: Decimal::new(5, 0),
            ..Default::default()
        };
        assert!(!winning.is_losing_redeem());
    }
}
