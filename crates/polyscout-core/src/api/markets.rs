//! Market detail API client (gamma).

use rust_decimal::Decimal;
use serde::Deserialize;

use super::GAMMA_API_BASE_URL;
use crate::http::RateLimitedClient;
use crate::Result;

/// Market detail from `GET /markets/slug/{slug}`.
///
/// The gamma API encodes `outcomes` and `outcomePrices` as JSON strings
/// inside the JSON body (`"[\"Yes\", \"No\"]"`); accessors decode them.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiMarketDetail {
    pub id: Option<String>,
    pub condition_id: String,
    pub slug: String,
    pub question: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub created_at: Option<String>,
    pub closed_time: Option<String>,
    pub volume: Option<Decimal>,
    pub liquidity: Option<Decimal>,
    pub competitive: Option<Decimal>,
    pub outcomes: Option<String>,
    pub outcome_prices: Option<String>,
}

impl ApiMarketDetail {
    pub fn outcome_names(&self) -> Vec<String> {
        self.outcomes
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }

    pub fn outcome_prices(&self) -> Vec<Decimal> {
        let raw_prices: Vec<String> = self
            .outcome_prices
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();
        raw_prices
            .iter()
            .filter_map(|p| p.parse().ok())
            .collect()
    }
}

/// Client for `GET /markets/slug/{slug}`.
#[derive(Clone)]
pub struct MarketsApi {
    client: RateLimitedClient,
    base_url: String,
}

impl MarketsApi {
    pub fn new(client: RateLimitedClient) -> Self {
        Self {
            client,
            base_url: GAMMA_API_BASE_URL.to_string(),
        }
    }

    /// Fetch market detail by slug. `Ok(None)` when unknown.
    pub async fn fetch_market_by_slug(&self, slug: &str) -> Result<Option<ApiMarketDetail>> {
        let url = format!("{}/markets/slug/{}", self.base_url, slug);
        self.client.get_json(&url, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_arrays_decode_from_nested_json_strings() {
        let raw = r#"{
            "id": "501",
            "conditionId": "0xcond",
            "slug": "who-wins",
            "question": "Who wins?",
            "outcomes": "[\"Yes\", \"No\"]",
            "outcomePrices": "[\"0.65\", \"0.35\"]"
        }"#;
        let market: ApiMarketDetail = serde_json::from_str(raw).unwrap();
        assert_eq!(market.outcome_names(), vec!["Yes", "No"]);
        assert_eq!(
            market.outcome_prices(),
            vec![Decimal::new(65, 2), Decimal::new(35, 2)]
        );
    }

    #[test]
    fn missing_outcomes_yield_empty_vectors() {
        let market = ApiMarketDetail::default();
        assert!(market.outcome_names().is_empty());
        assert!(market.outcome_prices().is_empty());
    }
}
