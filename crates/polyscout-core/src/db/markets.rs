//! Market repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, QueryBuilder, Row};

use super::BULK_CHUNK_SIZE;
use crate::Result;

/// Field set applied to a market after a refresh fetch.
#[derive(Debug, Clone)]
pub struct MarketUpdate {
    pub market_id: i64,
    pub platform_numeric_id: Option<i64>,
    pub market_slug: String,
    pub question: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub market_created_at: Option<DateTime<Utc>>,
    pub closed_time: Option<DateTime<Utc>>,
    pub volume: Option<Decimal>,
    pub liquidity: Option<Decimal>,
    pub competitive: Option<Decimal>,
}

/// Repository for the `markets` table.
#[derive(Clone)]
pub struct MarketRepository {
    pool: PgPool,
}

impl MarketRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get or create a market by condition id, returning its id. Discovery
    /// only knows the slug/question at creation time.
    pub async fn upsert_market(
        &self,
        conn: &mut PgConnection,
        event_id: i64,
        platform_market_id: &str,
        market_slug: &str,
        question: &str,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO markets (
                event_id, platform_market_id, market_slug, question, end_date, platform
            )
            VALUES ($1, $2, $3, $4, $5, 'polymarket')
            ON CONFLICT (platform_market_id) DO UPDATE SET last_updated_at = NOW()
            RETURNING market_id
            "#,
        )
        .bind(event_id)
        .bind(platform_market_id)
        .bind(market_slug)
        .bind(question)
        .bind(end_date)
        .fetch_one(conn)
        .await?;

        Ok(row.get("market_id"))
    }

    /// Apply refresh results to markets in bulk.
    pub async fn bulk_update_markets(&self, updates: &[MarketUpdate]) -> Result<u64> {
        let mut updated = 0u64;

        for chunk in updates.chunks(BULK_CHUNK_SIZE) {
            let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
                r#"
                UPDATE markets AS m SET
                    platform_numeric_id = v.platform_numeric_id,
                    market_slug = v.market_slug,
                    question = v.question,
                    start_date = v.start_date,
                    end_date = v.end_date,
                    market_created_at = v.market_created_at,
                    closed_time = v.closed_time,
                    volume = v.volume,
                    liquidity = v.liquidity,
                    competitive = v.competitive,
                    last_updated_at = NOW()
                FROM (
                "#,
            );
            builder.push_values(chunk, |mut b, update| {
                b.push_bind(update.market_id)
                    .push_bind(update.platform_numeric_id)
                    .push_bind(&update.market_slug)
                    .push_bind(&update.question)
                    .push_bind(update.start_date)
                    .push_bind(update.end_date)
                    .push_bind(update.market_created_at)
                    .push_bind(update.closed_time)
                    .push_bind(update.volume)
                    .push_bind(update.liquidity)
                    .push_bind(update.competitive);
            });
            builder.push(
                r#"
                ) AS v(
                    market_id, platform_numeric_id, market_slug, question,
                    start_date, end_date, market_created_at, closed_time,
                    volume, liquidity, competitive
                )
                WHERE m.market_id = v.market_id
                "#,
            );

            let result = builder.build().execute(&self.pool).await?;
            updated += result.rows_affected();
        }

        Ok(updated)
    }
}
