//! Event API client (gamma).

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

use super::GAMMA_API_BASE_URL;
use crate::http::RateLimitedClient;
use crate::Result;

/// Event with nested markets from `GET /events/slug/{slug}`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiEvent {
    pub id: Option<String>,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub liquidity: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub open_interest: Option<Decimal>,
    pub competitive: Option<Decimal>,
    pub neg_risk: Option<bool>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub tags: Vec<ApiEventTag>,
    pub markets: Vec<ApiEventMarket>,
}

impl ApiEvent {
    pub fn platform_event_id(&self) -> Option<i64> {
        self.id.as_deref().and_then(|id| id.parse().ok())
    }

    pub fn tag_labels(&self) -> Vec<&str> {
        self.tags.iter().map(|t| t.label.as_str()).collect()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiEventTag {
    pub id: Option<String>,
    pub label: String,
    pub slug: Option<String>,
}

/// Market nested inside an event response.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiEventMarket {
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
}

impl ApiEventMarket {
    pub fn platform_numeric_id(&self) -> Option<i64> {
        self.id.as_deref().and_then(|id| id.parse().ok())
    }
}

/// Client for `GET /events/slug/{slug}`.
#[derive(Clone)]
pub struct EventsApi {
    client: RateLimitedClient,
    base_url: String,
}

impl EventsApi {
    pub fn new(client: RateLimitedClient) -> Self {
        Self {
            client,
            base_url: GAMMA_API_BASE_URL.to_string(),
        }
    }

    /// Fetch an event and its markets by slug. `Ok(None)` when unknown.
    pub async fn fetch_event_by_slug(&self, slug: &str) -> Result<Option<ApiEvent>> {
        let url = format!("{}/events/slug/{}", self.base_url, slug);
        let event: Option<ApiEvent> = self.client.get_json(&url, &[]).await?;
        if event.is_none() {
            warn!(slug, "event not found upstream");
        }
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_deserializes_with_nested_markets() {
        let raw = r#"{
            "id": "9021",
            "slug": "election-2026",
            "title": "Election 2026",
            "description": "Outcome of the 2026 election",
            "liquidity": 12345.67,
            "volume": 999999.5,
            "openInterest": 5000,
            "competitive": 0.91,
            "negRisk": true,
            "startDate": "2026-01-01T00:00:00Z",
            "endDate": "2026-11-05T00:00:00Z",
            "tags": [{"id": "2", "label": "Politics", "slug": "politics"}],
            "markets": [{
                "id": "501",
                "conditionId": "0xcond",
                "slug": "election-2026-winner",
                "question": "Who wins?",
                "endDate": "2026-11-05T00:00:00Z",
                "volume": 5000,
                "liquidity": 300
            }]
        }"#;
        let event: ApiEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.platform_event_id(), Some(9021));
        assert_eq!(event.tag_labels(), vec!["Politics"]);
        assert_eq!(event.markets.len(), 1);
        assert_eq!(event.markets[0].platform_numeric_id(), Some(501));
        assert_eq!(event.markets[0].condition_id, "0xcond");
    }

    #[test]
    fn non_numeric_event_id_is_ignored() {
        let event: ApiEvent =
            serde_json::from_str(r#"{"id": "not-a-number", "slug": "x", "title": "x"}"#).unwrap();
        assert_eq!(event.platform_event_id(), None);
    }
}
