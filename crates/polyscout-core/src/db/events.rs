//! Event repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, QueryBuilder, Row};

use super::BULK_CHUNK_SIZE;
use crate::Result;

/// An active event with its markets, as loaded for the refresh scheduler.
#[derive(Debug, Clone)]
pub struct ActiveEvent {
    pub event_id: i64,
    pub event_slug: String,
    pub markets: Vec<ActiveMarket>,
}

#[derive(Debug, Clone)]
pub struct ActiveMarket {
    pub market_id: i64,
    pub platform_market_id: String,
    pub market_slug: String,
}

/// Field set applied to an event after a refresh fetch.
#[derive(Debug, Clone)]
pub struct EventUpdate {
    pub event_id: i64,
    pub platform_event_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub liquidity: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub open_interest: Option<Decimal>,
    pub competitive: Option<Decimal>,
    pub neg_risk: i16,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub market_created_at: Option<DateTime<Utc>>,
    pub market_updated_at: Option<DateTime<Utc>>,
    pub tags: Option<serde_json::Value>,
    pub category: Option<String>,
}

/// Repository for the `events` table.
#[derive(Clone)]
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get or create an event by slug, returning its id. New events carry
    /// only the fields discovery knows; the refresh scheduler completes
    /// them.
    pub async fn upsert_event(
        &self,
        conn: &mut PgConnection,
        event_slug: &str,
        title: &str,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO events (event_slug, title, platform)
            VALUES ($1, $2, 'polymarket')
            ON CONFLICT (event_slug) DO UPDATE SET last_updated_at = NOW()
            RETURNING event_id
            "#,
        )
        .bind(event_slug)
        .bind(title)
        .fetch_one(conn)
        .await?;

        Ok(row.get("event_id"))
    }

    /// Events that have not ended (end date NULL or in the future), with
    /// their open markets, in one join.
    pub async fn fetch_active_events_with_markets(&self) -> Result<Vec<ActiveEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT
                e.event_id,
                e.event_slug,
                m.market_id,
                m.platform_market_id,
                m.market_slug
            FROM events e
            LEFT JOIN markets m
                ON m.event_id = e.event_id
               AND m.closed_time IS NULL
            WHERE e.end_date IS NULL OR e.end_date > NOW()
            ORDER BY e.event_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut events: Vec<ActiveEvent> = Vec::new();
        for row in rows {
            let event_id: i64 = row.get("event_id");
            if events.last().map(|e| e.event_id) != Some(event_id) {
                events.push(ActiveEvent {
                    event_id,
                    event_slug: row.get("event_slug"),
                    markets: Vec::new(),
                });
            }
            let market_id: Option<i64> = row.get("market_id");
            if let Some(market_id) = market_id {
                events.last_mut().expect("event pushed above").markets.push(ActiveMarket {
                    market_id,
                    platform_market_id: row.get("platform_market_id"),
                    market_slug: row.get("market_slug"),
                });
            }
        }

        Ok(events)
    }

    /// Apply refresh results to events in bulk.
    pub async fn bulk_update_events(&self, updates: &[EventUpdate]) -> Result<u64> {
        let mut updated = 0u64;

        for chunk in updates.chunks(BULK_CHUNK_SIZE) {
            let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
                r#"
                UPDATE events AS e SET
                    platform_event_id = v.platform_event_id,
                    title = v.title,
                    description = v.description,
                    liquidity = v.liquidity,
                    volume = v.volume,
                    open_interest = v.open_interest,
                    competitive = v.competitive,
                    neg_risk = v.neg_risk,
                    start_date = v.start_date,
                    end_date = v.end_date,
                    market_created_at = v.market_created_at,
                    market_updated_at = v.market_updated_at,
                    tags = v.tags,
                    category = v.category,
                    last_updated_at = NOW()
                FROM (
                "#,
            );
            builder.push_values(chunk, |mut b, update| {
                b.push_bind(update.event_id)
                    .push_bind(update.platform_event_id)
                    .push_bind(&update.title)
                    .push_bind(&update.description)
                    .push_bind(update.liquidity)
                    .push_bind(update.volume)
                    .push_bind(update.open_interest)
                    .push_bind(update.competitive)
                    .push_bind(update.neg_risk)
                    .push_bind(update.start_date)
                    .push_bind(update.end_date)
                    .push_bind(update.market_created_at)
                    .push_bind(update.market_updated_at)
                    .push_bind(&update.tags)
                    .push_bind(&update.category);
            });
            builder.push(
                r#"
                ) AS v(
                    event_id, platform_event_id, title, description, liquidity,
                    volume, open_interest, competitive, neg_risk, start_date,
                    end_date, market_created_at, market_updated_at, tags, category
                )
                WHERE e.event_id = v.event_id
                "#,
            );

            let result = builder.build().execute(&self.pool).await?;
            updated += result.rows_affected();
        }

        Ok(updated)
    }
}
