//! Leaderboard snapshot scheduler.
//!
//! Once a day, walks the monthly leaderboard per category, upserts every
//! wallet seen (new ones enter the store as NEW; existing wallets keep
//! their lifecycle) and records a category-stat snapshot per
//! (wallet, category, period).

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{info, warn};

use polyscout_core::api::{LeaderboardApi, LeaderboardEntry};
use polyscout_core::db::wallets::{CategoryStatRow, LeaderboardWalletRow};
use polyscout_core::db::WalletRepository;
use polyscout_core::Result;

use crate::stats::TickStats;
use wallet_discovery::candidates::SMART_MONEY_CATEGORIES;

const PAGE_SIZE: usize = 50;

/// Entries below this PnL are not worth snapshotting.
fn min_pnl_floor() -> Decimal {
    Decimal::new(10_000, 0)
}

/// A wallet accumulated across category pages, with its per-category stats.
#[derive(Debug, Clone)]
struct SnapshotWallet {
    identity: LeaderboardWalletRow,
    stats: Vec<(String, Option<i32>, Decimal, Decimal)>,
}

pub struct LeaderboardStatsScheduler {
    api: LeaderboardApi,
    wallets: WalletRepository,
    pool: PgPool,
}

impl LeaderboardStatsScheduler {
    pub fn new(api: LeaderboardApi, wallets: WalletRepository, pool: PgPool) -> Self {
        Self { api, wallets, pool }
    }

    /// Snapshot the leaderboard for one time period (normally "month").
    pub async fn tick(&self, time_period: &str) -> Result<TickStats> {
        let started = Instant::now();
        let mut stats = TickStats::default();

        let mut wallet_map: HashMap<String, SnapshotWallet> = HashMap::new();
        for category in SMART_MONEY_CATEGORIES {
            match self.fetch_category(category, &mut wallet_map).await {
                Ok(()) => stats.record_success(),
                Err(e) => {
                    warn!(category, error = %e, "category snapshot failed");
                    stats.record_failure(category, &e);
                }
            }
        }

        if wallet_map.is_empty() {
            info!(time_period, "no leaderboard wallets to snapshot");
            stats.finish(started);
            return Ok(stats);
        }

        self.persist_snapshot(time_period, &wallet_map).await?;

        stats.finish(started);
        info!(
            time_period,
            wallets = wallet_map.len(),
            duration_secs = stats.duration_seconds,
            "leaderboard snapshot complete"
        );
        Ok(stats)
    }

    async fn fetch_category(
        &self,
        category: &str,
        wallet_map: &mut HashMap<String, SnapshotWallet>,
    ) -> Result<()> {
        let mut offset = 0u32;

        loop {
            let page = self.api.fetch_page(category, offset).await?;
            if page.is_empty() {
                break;
            }

            let found_low_pnl = fold_page(category, &page, wallet_map, min_pnl_floor());
            if found_low_pnl || page.len() < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE as u32;
        }

        Ok(())
    }

    async fn persist_snapshot(
        &self,
        time_period: &str,
        wallet_map: &HashMap<String, SnapshotWallet>,
    ) -> Result<()> {
        let snapshot_time = Utc::now();
        let identities: Vec<LeaderboardWalletRow> = wallet_map
            .values()
            .map(|w| w.identity.clone())
            .collect();

        let mut tx = self.pool.begin().await?;
        let ids = self
            .wallets
            .bulk_upsert_leaderboard_wallets(&mut tx, &identities)
            .await?;

        let mut stat_rows: Vec<CategoryStatRow> = Vec::new();
        for wallet in wallet_map.values() {
            let Some(&wallet_id) = ids.get(&wallet.identity.proxy_wallet) else {
                warn!(wallet = %wallet.identity.proxy_wallet, "wallet missing after upsert");
                continue;
            };
            for (category, rank, volume, pnl) in &wallet.stats {
                stat_rows.push(CategoryStatRow {
                    wallet_id,
                    category: category.clone(),
                    time_period: time_period.to_string(),
                    rank: *rank,
                    volume: *volume,
                    pnl: *pnl,
                });
            }
        }

        let stats_written = self
            .wallets
            .bulk_upsert_category_stats(&mut tx, &stat_rows, snapshot_time)
            .await?;
        tx.commit().await?;

        info!(
            wallets = identities.len(),
            stats = stats_written,
            "leaderboard snapshot persisted"
        );
        Ok(())
    }
}

/// Fold one page into the accumulated wallet map. Returns true when an
/// entry dropped below the PnL floor (the category is exhausted).
fn fold_page(
    category: &str,
    page: &[LeaderboardEntry],
    wallet_map: &mut HashMap<String, SnapshotWallet>,
    min_pnl: Decimal,
) -> bool {
    for entry in page {
        if entry.pnl < min_pnl {
            return true;
        }

        let wallet = wallet_map
            .entry(entry.proxy_wallet.clone())
            .or_insert_with(|| SnapshotWallet {
                identity: LeaderboardWalletRow {
                    proxy_wallet: entry.proxy_wallet.clone(),
                    username: entry.user_name.clone(),
                    x_username: entry.x_username.clone(),
                    verified_badge: entry.verified_badge,
                    profile_image: entry.profile_image.clone(),
                },
                stats: Vec::new(),
            });
        wallet
            .stats
            .push((category.to_string(), entry.rank, entry.vol, entry.pnl));
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entry(proxy: &str, pnl: Decimal, rank: i32) -> LeaderboardEntry {
        LeaderboardEntry {
            proxy_wallet: proxy.to_string(),
            user_name: format!("user-{proxy}"),
            pnl,
            vol: dec!(1000),
            rank: Some(rank),
            ..Default::default()
        }
    }

    #[test]
    fn fold_stops_at_pnl_floor() {
        let mut map = HashMap::new();
        let page = vec![
            entry("0xa", dec!(50000), 1),
            entry("0xb", dec!(9000), 2),
            entry("0xc", dec!(40000), 3),
        ];
        let exhausted = fold_page("politics", &page, &mut map, dec!(10000));
        assert!(exhausted);
        // Entries after the floor hit are not folded.
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("0xa"));
    }

    #[test]
    fn wallet_seen_in_two_categories_accumulates_stats() {
        let mut map = HashMap::new();
        fold_page("politics", &[entry("0xa", dec!(50000), 1)], &mut map, dec!(10000));
        fold_page("crypto", &[entry("0xa", dec!(50000), 7)], &mut map, dec!(10000));
        assert_eq!(map.len(), 1);
        let wallet = &map["0xa"];
        assert_eq!(wallet.stats.len(), 2);
        assert_eq!(wallet.stats[0].0, "politics");
        assert_eq!(wallet.stats[1].0, "crypto");
        assert_eq!(wallet.stats[1].1, Some(7));
    }
}
