//! Candidate wallet fetching from the leaderboard.

use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::info;

use polyscout_core::api::{LeaderboardApi, LeaderboardEntry};
use polyscout_core::config::DiscoveryConfig;
use polyscout_core::Result;

/// Leaderboard categories scanned for candidates.
pub const SMART_MONEY_CATEGORIES: [&str; 9] = [
    "politics",
    "sports",
    "crypto",
    "finance",
    "culture",
    "mentions",
    "weather",
    "economics",
    "tech",
];

const PAGE_SIZE: usize = 50;

/// A wallet pulled off the leaderboard, before evaluation.
#[derive(Debug, Clone)]
pub struct WalletCandidate {
    pub proxy_wallet: String,
    pub username: String,
    pub all_time_pnl: Decimal,
    pub all_time_volume: Decimal,
    pub profile_image: Option<String>,
    pub x_username: Option<String>,
    pub verified_badge: bool,
    pub rank: Option<i32>,
    /// Every category leaderboard this wallet appeared in.
    pub categories: Vec<String>,
    /// Discovery order, for log correlation.
    pub number: usize,
}

impl WalletCandidate {
    fn from_entry(entry: &LeaderboardEntry, category: &str) -> Self {
        Self {
            proxy_wallet: entry.proxy_wallet.clone(),
            username: entry.user_name.clone(),
            all_time_pnl: entry.pnl,
            all_time_volume: entry.vol,
            profile_image: entry.profile_image.clone(),
            x_username: entry.x_username.clone(),
            verified_badge: entry.verified_badge,
            rank: entry.rank,
            categories: vec![category.to_string()],
            number: 0,
        }
    }

    pub fn short_address(&self) -> &str {
        &self.proxy_wallet[..self.proxy_wallet.len().min(10)]
    }
}

/// Walks every category leaderboard collecting candidates above the PnL
/// floor, deduplicating across categories.
pub struct CandidateFetcher {
    api: LeaderboardApi,
    config: DiscoveryConfig,
}

impl CandidateFetcher {
    pub fn new(api: LeaderboardApi, config: DiscoveryConfig) -> Self {
        Self { api, config }
    }

    /// Paginate each category until a page entry drops below `min_pnl` or
    /// the page comes back short. Blacklisted wallets never become
    /// candidates; a wallet seen in several categories accumulates them.
    pub async fn fetch_candidates(&self, min_pnl: Decimal) -> Result<Vec<WalletCandidate>> {
        let mut seen: HashMap<String, WalletCandidate> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        let mut counter = 0usize;

        info!(%min_pnl, "starting candidate discovery");

        for category in SMART_MONEY_CATEGORIES {
            let mut offset = 0u32;

            loop {
                let page = self.api.fetch_page(category, offset).await?;
                if page.is_empty() {
                    break;
                }

                let mut found_low_pnl = false;
                for entry in &page {
                    if entry.pnl < min_pnl {
                        info!(
                            category,
                            pnl = %entry.pnl,
                            %min_pnl,
                            "pnl floor reached, stopping category"
                        );
                        found_low_pnl = true;
                        break;
                    }

                    if self.config.is_blacklisted(&entry.proxy_wallet) {
                        info!(wallet = %&entry.proxy_wallet[..entry.proxy_wallet.len().min(10)], "blacklisted, skipping");
                        continue;
                    }

                    match seen.get_mut(&entry.proxy_wallet) {
                        Some(candidate) => {
                            if !candidate.categories.iter().any(|c| c == category) {
                                candidate.categories.push(category.to_string());
                            }
                        }
                        None => {
                            counter += 1;
                            let mut candidate = WalletCandidate::from_entry(entry, category);
                            candidate.number = counter;
                            info!(number = counter, wallet = %candidate.proxy_wallet, "new candidate");
                            order.push(entry.proxy_wallet.clone());
                            seen.insert(entry.proxy_wallet.clone(), candidate);
                        }
                    }
                }

                if found_low_pnl || page.len() < PAGE_SIZE {
                    break;
                }
                offset += PAGE_SIZE as u32;
            }
        }

        let candidates: Vec<WalletCandidate> = order
            .into_iter()
            .filter_map(|wallet| seen.remove(&wallet))
            .collect();
        info!(total = candidates.len(), "candidate discovery complete");
        Ok(candidates)
    }
}
