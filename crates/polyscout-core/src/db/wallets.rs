//! Wallet and category-stat repository.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, QueryBuilder, Row};

use super::BULK_CHUNK_SIZE;
use crate::types::{Wallet, WalletType};
use crate::Result;

/// Wallet identity fields from a leaderboard snapshot run.
#[derive(Debug, Clone)]
pub struct LeaderboardWalletRow {
    pub proxy_wallet: String,
    pub username: String,
    pub x_username: Option<String>,
    pub verified_badge: bool,
    pub profile_image: Option<String>,
}

/// One category-stat snapshot row.
#[derive(Debug, Clone)]
pub struct CategoryStatRow {
    pub wallet_id: i64,
    pub category: String,
    pub time_period: String,
    pub rank: Option<i32>,
    pub volume: Decimal,
    pub pnl: Decimal,
}

/// Repository for the `wallets` and `wallet_category_stats` tables.
#[derive(Clone)]
pub struct WalletRepository {
    pool: PgPool,
}

impl WalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert or refresh a wallet, returning its id.
    ///
    /// Runs inside the caller's transaction: discovery persists the wallet
    /// and all of its related rows atomically.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_wallet(
        &self,
        conn: &mut PgConnection,
        proxy_wallet: &str,
        username: &str,
        x_username: Option<&str>,
        verified_badge: bool,
        profile_image: Option<&str>,
        wallet_type: WalletType,
    ) -> Result<i64> {
        let username = if username.is_empty() {
            format!("User_{}", &proxy_wallet[..proxy_wallet.len().min(8)])
        } else {
            username.to_string()
        };

        let row = sqlx::query(
            r#"
            INSERT INTO wallets (
                proxy_wallet, username, x_username, verified_badge,
                profile_image, is_active, platform, wallet_type, first_seen_at
            )
            VALUES ($1, $2, $3, $4, $5, 1, 'polymarket', $6, NOW())
            ON CONFLICT (proxy_wallet) DO UPDATE SET
                username = EXCLUDED.username,
                x_username = EXCLUDED.x_username,
                verified_badge = EXCLUDED.verified_badge,
                profile_image = EXCLUDED.profile_image,
                wallet_type = EXCLUDED.wallet_type,
                last_updated_at = NOW()
            RETURNING wallet_id
            "#,
        )
        .bind(proxy_wallet)
        .bind(&username)
        .bind(x_username)
        .bind(verified_badge)
        .bind(profile_image)
        .bind(wallet_type)
        .fetch_one(conn)
        .await?;

        Ok(row.get("wallet_id"))
    }

    /// Record per-category leaderboard stats for a wallet.
    pub async fn upsert_category_stats(
        &self,
        conn: &mut PgConnection,
        wallet_id: i64,
        categories: &[String],
        time_period: &str,
        rank: Option<i32>,
        volume: Decimal,
        pnl: Decimal,
    ) -> Result<()> {
        let snapshot_time = Utc::now();
        for category in categories {
            sqlx::query(
                r#"
                INSERT INTO wallet_category_stats (
                    wallet_id, category, time_period, rank, volume, pnl, snapshot_time
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (wallet_id, category, time_period) DO UPDATE SET
                    rank = EXCLUDED.rank,
                    volume = EXCLUDED.volume,
                    pnl = EXCLUDED.pnl,
                    snapshot_time = EXCLUDED.snapshot_time,
                    last_updated_at = NOW()
                "#,
            )
            .bind(wallet_id)
            .bind(category)
            .bind(time_period)
            .bind(rank)
            .bind(volume)
            .bind(pnl)
            .bind(snapshot_time)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// All OLD active wallets, least recently updated first.
    pub async fn get_old_active_wallets(&self) -> Result<Vec<Wallet>> {
        let wallets = sqlx::query_as::<_, Wallet>(
            r#"
            SELECT * FROM wallets
            WHERE wallet_type = 'OLD' AND is_active = 1
            ORDER BY last_updated_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(wallets)
    }

    /// Active wallets, optionally restricted to an id list. Used by the
    /// PnL scheduler's on-demand trigger path.
    pub async fn get_active_wallets(&self, wallet_ids: Option<&[i64]>) -> Result<Vec<Wallet>> {
        let wallets = match wallet_ids {
            Some(ids) => {
                sqlx::query_as::<_, Wallet>(
                    r#"
                    SELECT * FROM wallets
                    WHERE is_active = 1 AND wallet_id = ANY($1)
                    "#,
                )
                .bind(ids)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE is_active = 1")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(wallets)
    }

    /// Bulk upsert wallets seen on the leaderboard, returning their ids by
    /// proxy wallet.
    ///
    /// New wallets land as NEW; existing ones only get their timestamp
    /// touched so a wallet already promoted to OLD keeps its lifecycle.
    pub async fn bulk_upsert_leaderboard_wallets(
        &self,
        conn: &mut PgConnection,
        rows: &[LeaderboardWalletRow],
    ) -> Result<HashMap<String, i64>> {
        let mut ids = HashMap::with_capacity(rows.len());

        for chunk in rows.chunks(BULK_CHUNK_SIZE) {
            let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
                r#"
                INSERT INTO wallets (
                    proxy_wallet, username, x_username, verified_badge,
                    profile_image, is_active, platform, wallet_type, first_seen_at
                )
                "#,
            );
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(&row.proxy_wallet)
                    .push_bind(&row.username)
                    .push_bind(&row.x_username)
                    .push_bind(row.verified_badge)
                    .push_bind(&row.profile_image)
                    .push_bind(1i16)
                    .push_bind("polymarket")
                    .push_bind(WalletType::New)
                    .push_bind(Utc::now());
            });
            builder.push(
                r#"
                ON CONFLICT (proxy_wallet) DO UPDATE SET last_updated_at = NOW()
                RETURNING wallet_id, proxy_wallet
                "#,
            );

            let returned = builder.build().fetch_all(&mut *conn).await?;
            for row in returned {
                ids.insert(
                    row.get::<String, _>("proxy_wallet"),
                    row.get::<i64, _>("wallet_id"),
                );
            }
        }

        Ok(ids)
    }

    /// Bulk upsert category-stat snapshots.
    pub async fn bulk_upsert_category_stats(
        &self,
        conn: &mut PgConnection,
        stats: &[CategoryStatRow],
        snapshot_time: DateTime<Utc>,
    ) -> Result<u64> {
        let mut written = 0u64;

        for chunk in stats.chunks(BULK_CHUNK_SIZE) {
            let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
                r#"
                INSERT INTO wallet_category_stats (
                    wallet_id, category, time_period, rank, volume, pnl, snapshot_time
                )
                "#,
            );
            builder.push_values(chunk, |mut b, stat| {
                b.push_bind(stat.wallet_id)
                    .push_bind(&stat.category)
                    .push_bind(&stat.time_period)
                    .push_bind(stat.rank)
                    .push_bind(stat.volume)
                    .push_bind(stat.pnl)
                    .push_bind(snapshot_time);
            });
            builder.push(
                r#"
                ON CONFLICT (wallet_id, category, time_period) DO UPDATE SET
                    rank = EXCLUDED.rank,
                    volume = EXCLUDED.volume,
                    pnl = EXCLUDED.pnl,
                    snapshot_time = EXCLUDED.snapshot_time,
                    last_updated_at = NOW()
                "#,
            );

            let result = builder.build().execute(&mut *conn).await?;
            written += result.rows_affected();
        }

        Ok(written)
    }
}
