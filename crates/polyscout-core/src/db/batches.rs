//! Batch watermark repository.

use sqlx::{PgConnection, PgPool, QueryBuilder};

use super::BULK_CHUNK_SIZE;
use crate::types::{PositionStatus, WalletType};
use crate::Result;

/// Repository for the `batches` table.
#[derive(Clone)]
pub struct BatchRepository {
    pool: PgPool,
}

impl BatchRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a batch row for every (wallet, market) pair that has at least
    /// one OPEN position on an OLD active wallet and no active batch yet.
    /// Idempotent: a single INSERT … SELECT … LEFT JOIN.
    pub async fn create_missing_for_open_positions(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO batches (wallet_id, market_id, is_active)
            SELECT DISTINCT p.wallet_id, p.market_id, 1
            FROM positions p
            INNER JOIN wallets w ON p.wallet_id = w.wallet_id
            LEFT JOIN batches b
                ON p.wallet_id = b.wallet_id
               AND p.market_id = b.market_id
               AND b.is_active = 1
            WHERE p.position_status = $1
              AND w.wallet_type = $2
              AND w.is_active = 1
              AND b.batch_id IS NULL
            "#,
        )
        .bind(PositionStatus::Open)
        .bind(WalletType::Old)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Seed batch watermarks for a newly discovered wallet's needs-trades
    /// markets. Runs inside the discovery persistence transaction.
    pub async fn bulk_insert_watermarks(
        &self,
        conn: &mut PgConnection,
        rows: &[(i64, i64, Option<i64>)],
    ) -> Result<u64> {
        let mut written = 0u64;

        for chunk in rows.chunks(BULK_CHUNK_SIZE) {
            let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
                "INSERT INTO batches (wallet_id, market_id, latest_fetched_time, is_active) ",
            );
            builder.push_values(chunk, |mut b, (wallet_id, market_id, watermark)| {
                b.push_bind(wallet_id)
                    .push_bind(market_id)
                    .push_bind(watermark)
                    .push_bind(1i16);
            });
            builder.push(
                r#"
                ON CONFLICT (wallet_id, market_id) DO UPDATE SET
                    latest_fetched_time = EXCLUDED.latest_fetched_time,
                    is_active = 1,
                    last_updated_at = NOW()
                "#,
            );

            let result = builder.build().execute(&mut *conn).await?;
            written += result.rows_affected();
        }

        Ok(written)
    }
}
