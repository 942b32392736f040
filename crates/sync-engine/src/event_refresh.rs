//! Event and market refresh scheduler.
//!
//! Periodically re-fetches every active event by slug and bulk-applies the
//! upstream fields to the stored events and their markets. Per-event
//! failures are isolated; the tick always completes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use polyscout_core::api::{parse_utc_datetime, ApiEvent, EventsApi};
use polyscout_core::db::events::{ActiveEvent, EventUpdate};
use polyscout_core::db::markets::MarketUpdate;
use polyscout_core::db::{EventRepository, MarketRepository};
use polyscout_core::types::EventCategory;
use polyscout_core::Result;

use crate::stats::TickStats;

pub struct EventRefreshScheduler {
    events_api: EventsApi,
    events: EventRepository,
    markets: MarketRepository,
    workers: usize,
}

impl EventRefreshScheduler {
    pub fn new(
        events_api: EventsApi,
        events: EventRepository,
        markets: MarketRepository,
        workers: usize,
    ) -> Self {
        Self {
            events_api,
            events,
            markets,
            workers,
        }
    }

    pub async fn tick(&self) -> Result<TickStats> {
        let started = Instant::now();
        let mut stats = TickStats::default();

        let active_events = self.events.fetch_active_events_with_markets().await?;
        if active_events.is_empty() {
            info!("no active events to refresh");
            return Ok(stats);
        }

        info!(
            events = active_events.len(),
            workers = self.workers,
            "event refresh started"
        );

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut join_set: JoinSet<(ActiveEvent, Result<Option<ApiEvent>>)> = JoinSet::new();

        for active in active_events {
            let api = self.events_api.clone();
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                let fetched = api.fetch_event_by_slug(&active.event_slug).await;
                (active, fetched)
            });
        }

        let mut event_updates: Vec<EventUpdate> = Vec::new();
        let mut market_updates: Vec<MarketUpdate> = Vec::new();

        while let Some(joined) = join_set.join_next().await {
            let (active, fetched) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    stats.record_failure("refresh task", &e);
                    continue;
                }
            };

            match fetched {
                Ok(Some(api_event)) => {
                    stats.record_success();
                    event_updates.push(build_event_update(active.event_id, &api_event));
                    market_updates.extend(build_market_updates(&active, &api_event));
                }
                Ok(None) => {
                    stats.record_failure(&active.event_slug, &"not found upstream");
                }
                Err(e) => {
                    warn!(slug = %active.event_slug, error = %e, "event fetch failed");
                    stats.record_failure(&active.event_slug, &e);
                }
            }
        }

        let events_updated = self.events.bulk_update_events(&event_updates).await?;
        let markets_updated = self.markets.bulk_update_markets(&market_updates).await?;

        stats.finish(started);
        metrics::counter!("event_refresh_events_updated_total").increment(events_updated);
        info!(
            duration_secs = stats.duration_seconds,
            succeeded = stats.succeeded,
            failed = stats.failed,
            events_updated,
            markets_updated,
            "event refresh complete"
        );

        Ok(stats)
    }
}

fn build_event_update(event_id: i64, api_event: &ApiEvent) -> EventUpdate {
    let category = EventCategory::from_tags(api_event.tag_labels()).as_str().to_string();
    EventUpdate {
        event_id,
        platform_event_id: api_event.platform_event_id(),
        title: api_event.title.clone(),
        description: api_event.description.clone(),
        liquidity: api_event.liquidity,
        volume: api_event.volume,
        open_interest: api_event.open_interest,
        competitive: api_event.competitive,
        neg_risk: i16::from(api_event.neg_risk.unwrap_or(false)),
        start_date: api_event.start_date.as_deref().and_then(parse_utc_datetime),
        end_date: api_event.end_date.as_deref().and_then(parse_utc_datetime),
        market_created_at: api_event.created_at.as_deref().and_then(parse_utc_datetime),
        market_updated_at: api_event.updated_at.as_deref().and_then(parse_utc_datetime),
        tags: serde_json::to_value(
            api_event.tags.iter().map(|t| t.label.clone()).collect::<Vec<_>>(),
        )
        .ok(),
        category: Some(category),
    }
}

fn build_market_updates(active: &ActiveEvent, api_event: &ApiEvent) -> Vec<MarketUpdate> {
    let api_markets: HashMap<&str, _> = api_event
        .markets
        .iter()
        .map(|m| (m.condition_id.as_str(), m))
        .collect();

    active
        .markets
        .iter()
        .filter_map(|stored| {
            api_markets
                .get(stored.platform_market_id.as_str())
                .map(|api_market| MarketUpdate {
                    market_id: stored.market_id,
                    platform_numeric_id: api_market.platform_numeric_id(),
                    market_slug: api_market.slug.clone(),
                    question: api_market.question.clone(),
                    start_date: api_market.start_date.as_deref().and_then(parse_utc_datetime),
                    end_date: api_market.end_date.as_deref().and_then(parse_utc_datetime),
                    market_created_at: api_market
                        .created_at
                        .as_deref()
                        .and_then(parse_utc_datetime),
                    closed_time: api_market
                        .closed_time
                        .as_deref()
                        .and_then(parse_utc_datetime),
                    volume: api_market.volume,
                    liquidity: api_market.liquidity,
                    competitive: api_market.competitive,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyscout_core::db::events::ActiveMarket;

    fn api_event() -> ApiEvent {
        serde_json::from_str(
            r#"{
                "id": "77",
                "slug": "election",
                "title": "Election",
                "negRisk": true,
                "endDate": "2026-11-05T00:00:00Z",
                "tags": [{"label": "US Politics"}],
                "markets": [
                    {"conditionId": "0xc1", "slug": "m1", "question": "Q1", "id": "5"},
                    {"conditionId": "0xc2", "slug": "m2", "question": "Q2"}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn event_update_derives_category_from_tags() {
        let update = build_event_update(42, &api_event());
        assert_eq!(update.event_id, 42);
        assert_eq!(update.platform_event_id, Some(77));
        assert_eq!(update.neg_risk, 1);
        assert_eq!(update.category.as_deref(), Some("POLITICS"));
        assert!(update.end_date.is_some());
    }

    #[test]
    fn market_updates_match_stored_markets_by_condition_id() {
        let active = ActiveEvent {
            event_id: 42,
            event_slug: "election".to_string(),
            markets: vec![
                ActiveMarket {
                    market_id: 1,
                    platform_market_id: "0xc1".to_string(),
                    market_slug: "m1".to_string(),
                },
                ActiveMarket {
                    market_id: 9,
                    platform_market_id: "0xmissing".to_string(),
                    market_slug: "gone".to_string(),
                },
            ],
        };
        let updates = build_market_updates(&active, &api_event());
        // The stored market unknown to upstream is left untouched.
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].market_id, 1);
        assert_eq!(updates[0].platform_numeric_id, Some(5));
        assert_eq!(updates[0].question, "Q1");
    }

    #[test]
    fn event_without_stored_markets_yields_no_market_updates() {
        let active = ActiveEvent {
            event_id: 42,
            event_slug: "election".to_string(),
            markets: vec![],
        };
        assert!(build_market_updates(&active, &api_event()).is_empty());
    }
}
