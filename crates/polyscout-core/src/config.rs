//! Configuration management for the polyscout ingestion pipeline.

use std::collections::HashSet;
use std::env;

use rust_decimal::Decimal;

use crate::{Error, Result};

/// Application configuration, assembled from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub rate_limit: RateLimitConfig,
    pub http: HttpConfig,
    pub workers: WorkerConfig,
    pub discovery: DiscoveryConfig,
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Per-endpoint-class token bucket rates. The documented upstream limits are
/// 150/150/200 per 10 s; defaults sit at 80% of those.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub positions_rate_limit: u32,
    pub closed_positions_rate_limit: u32,
    pub trades_rate_limit: u32,
    pub window_seconds: u64,
}

impl RateLimitConfig {
    /// The fallback rate used for endpoints outside the three hot classes.
    pub fn general_rate_limit(&self) -> u32 {
        self.positions_rate_limit
            .min(self.closed_positions_rate_limit)
            .min(self.trades_rate_limit)
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub pool_max_idle_per_host: usize,
    pub timeout_seconds: u64,
    pub max_retry_attempts: u32,
    pub retry_min_wait_seconds: u64,
    pub retry_max_wait_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub event_update_workers: usize,
    pub position_update_workers: usize,
    pub trade_workers: usize,
    pub pnl_scheduler_workers: usize,
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub min_leaderboard_pnl: Decimal,
    pub max_open_positions_with_future_end_date: usize,
    pub max_closed_positions: usize,
    pub trade_count_threshold: u64,
    pub position_count_threshold: u64,
    pub pnl_threshold: Decimal,
    pub activity_window_days: i64,
    pub blacklisted_wallets: HashSet<String>,
}

impl DiscoveryConfig {
    pub fn is_blacklisted(&self, proxy_wallet: &str) -> bool {
        self.blacklisted_wallets.contains(proxy_wallet)
    }
}

/// Scheduler tick intervals, in seconds.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub discovery_interval_secs: u64,
    pub position_refresh_interval_secs: u64,
    pub trade_sync_interval_secs: u64,
    pub closed_positions_interval_secs: u64,
    pub event_refresh_interval_secs: u64,
    pub wallet_pnl_interval_secs: u64,
    pub leaderboard_stats_interval_secs: u64,
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let blacklisted_wallets = env::var("BLACKLISTED_WALLETS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| Error::Config {
                    message: "DATABASE_URL environment variable not set".to_string(),
                })?,
                max_connections: env_parsed("DATABASE_MAX_CONNECTIONS", 20),
            },
            rate_limit: RateLimitConfig {
                positions_rate_limit: env_parsed("POSITIONS_RATE_LIMIT", 120),
                closed_positions_rate_limit: env_parsed("CLOSED_POSITIONS_RATE_LIMIT", 120),
                trades_rate_limit: env_parsed("TRADES_RATE_LIMIT", 160),
                window_seconds: env_parsed("RATE_LIMIT_WINDOW_SECONDS", 10),
            },
            http: HttpConfig {
                pool_max_idle_per_host: env_parsed("HTTP_POOL_MAXSIZE", 100),
                timeout_seconds: env_parsed("DEFAULT_TIMEOUT_SECONDS", 30),
                max_retry_attempts: env_parsed("MAX_RETRY_ATTEMPTS", 5),
                retry_min_wait_seconds: env_parsed("RETRY_MIN_WAIT_SECONDS", 1),
                retry_max_wait_seconds: env_parsed("RETRY_MAX_WAIT_SECONDS", 60),
            },
            workers: WorkerConfig {
                event_update_workers: env_parsed("PARALLEL_EVENT_UPDATE_WORKERS", 30),
                position_update_workers: env_parsed("PARALLEL_POSITION_UPDATE_WORKERS", 30),
                trade_workers: env_parsed("PARALLEL_TRADE_WORKERS", 30),
                pnl_scheduler_workers: env_parsed("PARALLEL_PNL_SCHEDULER_WORKERS", 50),
            },
            discovery: DiscoveryConfig {
                min_leaderboard_pnl: env_parsed("MIN_LEADERBOARD_PNL", Decimal::new(20_000, 0)),
                max_open_positions_with_future_end_date: env_parsed(
                    "MAX_OPEN_POSITIONS_WITH_FUTURE_END_DATE",
                    150,
                ),
                max_closed_positions: env_parsed("MAX_CLOSED_POSITIONS", 1000),
                trade_count_threshold: env_parsed("WALLET_FILTER_TRADE_COUNT_THRESHOLD", 20),
                position_count_threshold: env_parsed("WALLET_FILTER_POSITION_COUNT_THRESHOLD", 10),
                pnl_threshold: env_parsed("WALLET_FILTER_PNL_THRESHOLD", Decimal::new(10_000, 0)),
                activity_window_days: env_parsed("WALLET_FILTER_ACTIVITY_WINDOW_DAYS", 30),
                blacklisted_wallets,
            },
            schedule: ScheduleConfig {
                discovery_interval_secs: env_parsed("DISCOVERY_INTERVAL_SECS", 3600),
                position_refresh_interval_secs: env_parsed("POSITION_REFRESH_INTERVAL_SECS", 1800),
                trade_sync_interval_secs: env_parsed("TRADE_SYNC_INTERVAL_SECS", 900),
                closed_positions_interval_secs: env_parsed("CLOSED_POSITIONS_INTERVAL_SECS", 1800),
                event_refresh_interval_secs: env_parsed("EVENT_REFRESH_INTERVAL_SECS", 36_000),
                wallet_pnl_interval_secs: env_parsed("WALLET_PNL_INTERVAL_SECS", 86_400),
                leaderboard_stats_interval_secs: env_parsed(
                    "LEADERBOARD_STATS_INTERVAL_SECS",
                    86_400,
                ),
            },
        })
    }

    /// Configuration with defaults for tests (no environment access).
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgres://localhost/polyscout_test".to_string(),
                max_connections: 2,
            },
            rate_limit: RateLimitConfig {
                positions_rate_limit: 120,
                closed_positions_rate_limit: 120,
                trades_rate_limit: 160,
                window_seconds: 10,
            },
            http: HttpConfig {
                pool_max_idle_per_host: 100,
                timeout_seconds: 30,
                max_retry_attempts: 5,
                retry_min_wait_seconds: 1,
                retry_max_wait_seconds: 60,
            },
            workers: WorkerConfig {
                event_update_workers: 30,
                position_update_workers: 30,
                trade_workers: 30,
                pnl_scheduler_workers: 50,
            },
            discovery: DiscoveryConfig {
                min_leaderboard_pnl: Decimal::new(20_000, 0),
                max_open_positions_with_future_end_date: 150,
                max_closed_positions: 1000,
                trade_count_threshold: 20,
                position_count_threshold: 10,
                pnl_threshold: Decimal::new(10_000, 0),
                activity_window_days: 30,
                blacklisted_wallets: HashSet::new(),
            },
            schedule: ScheduleConfig {
                discovery_interval_secs: 3600,
                position_refresh_interval_secs: 1800,
                trade_sync_interval_secs: 900,
                closed_positions_interval_secs: 1800,
                event_refresh_interval_secs: 36_000,
                wallet_pnl_interval_secs: 86_400,
                leaderboard_stats_interval_secs: 86_400,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn general_rate_is_most_conservative() {
        let config = Config::test_config();
        assert_eq!(config.rate_limit.general_rate_limit(), 120);
    }

    #[test]
    fn blacklist_lookup() {
        let mut config = Config::test_config();
        config
            .discovery
            .blacklisted_wallets
            .insert("0xdead".to_string());
        assert!(config.discovery.is_blacklisted("0xdead"));
        assert!(!config.discovery.is_blacklisted("0xbeef"));
    }
}
