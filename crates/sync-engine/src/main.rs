//! polyscout daemon: wires configuration, the database pool, the
//! rate-limited HTTP clients, and the periodic scheduler loops.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use polyscout_core::api::{ActivityApi, EventsApi, LeaderboardApi, PositionsApi};
use polyscout_core::db::{
    self, BatchRepository, EventRepository, MarketRepository, PositionRepository, TradeRepository,
    WalletPnlRepository, WalletRepository,
};
use polyscout_core::http::{build_http_client, EndpointClass, LimiterRegistry, RateLimitedClient};
use polyscout_core::Config;

use sync_engine::batch_sync::BatchSyncScheduler;
use sync_engine::closed_positions::ClosedPositionScheduler;
use sync_engine::event_refresh::EventRefreshScheduler;
use sync_engine::leaderboard_stats::LeaderboardStatsScheduler;
use sync_engine::position_sync::PositionSyncScheduler;
use sync_engine::trade_sync::TradeSyncScheduler;
use sync_engine::wallet_pnl::WalletPnlScheduler;

use wallet_discovery::{CandidateFetcher, DiscoveryService, WalletEvaluator, WalletPersistence};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install()
        .context("installing prometheus exporter")?;

    let pool = db::create_pool(&config.database)
        .await
        .context("connecting to database")?;
    db::run_migrations(&pool).await.context("running migrations")?;
    info!("database ready");

    // Shared connection pool; one rate-limited client per endpoint class.
    let limiters = LimiterRegistry::new(&config.rate_limit);
    let http = build_http_client(&config.http)?;
    let client =
        |class: EndpointClass| RateLimitedClient::new(class, http.clone(), &limiters, &config.http);

    let positions_api = PositionsApi::new(
        client(EndpointClass::Positions),
        client(EndpointClass::ClosedPositions),
    );
    let activity_api = ActivityApi::new(client(EndpointClass::Trades));
    let events_api = EventsApi::new(client(EndpointClass::General));
    let leaderboard_api = LeaderboardApi::new(client(EndpointClass::General));

    let wallets = WalletRepository::new(pool.clone());
    let events = EventRepository::new(pool.clone());
    let markets = MarketRepository::new(pool.clone());
    let positions = PositionRepository::new(pool.clone());
    let trades = TradeRepository::new(pool.clone());
    let batches = BatchRepository::new(pool.clone());
    let pnl_repo = WalletPnlRepository::new(pool.clone());

    // Daily leaderboard snapshot: wallets enter the store as NEW with
    // per-category stats.
    let leaderboard_stats = Arc::new(LeaderboardStatsScheduler::new(
        leaderboard_api.clone(),
        wallets.clone(),
        pool.clone(),
    ));
    spawn_job(
        "leaderboard_stats",
        config.schedule.leaderboard_stats_interval_secs,
        move || {
            let scheduler = Arc::clone(&leaderboard_stats);
            async move {
                scheduler.tick("month").await?;
                Ok(())
            }
        },
    );

    // Discovery: leaderboard scan → evaluation → persistence.
    let discovery = Arc::new(DiscoveryService::new(
        CandidateFetcher::new(leaderboard_api, config.discovery.clone()),
        WalletEvaluator::new(
            positions_api.clone(),
            activity_api.clone(),
            config.discovery.clone(),
        ),
        WalletPersistence::new(pool.clone()),
    ));
    let min_pnl = config.discovery.min_leaderboard_pnl;
    spawn_job("discovery", config.schedule.discovery_interval_secs, {
        let discovery = Arc::clone(&discovery);
        move || {
            let discovery = Arc::clone(&discovery);
            async move {
                discovery.discover_and_persist(min_pnl).await?;
                Ok(())
            }
        }
    });

    let position_sync = Arc::new(PositionSyncScheduler::new(
        positions_api.clone(),
        wallets.clone(),
        positions.clone(),
        BatchSyncScheduler::new(batches.clone()),
        config.workers.position_update_workers,
    ));
    spawn_job(
        "position_sync",
        config.schedule.position_refresh_interval_secs,
        move || {
            let scheduler = Arc::clone(&position_sync);
            async move {
                scheduler.tick().await?;
                Ok(())
            }
        },
    );

    let trade_sync = Arc::new(TradeSyncScheduler::new(
        activity_api.clone(),
        trades.clone(),
        positions.clone(),
        config.workers.trade_workers,
    ));
    spawn_job(
        "trade_sync",
        config.schedule.trade_sync_interval_secs,
        move || {
            let scheduler = Arc::clone(&trade_sync);
            async move {
                scheduler.tick().await?;
                Ok(())
            }
        },
    );

    let closed_positions = Arc::new(ClosedPositionScheduler::new(
        positions_api.clone(),
        positions.clone(),
    ));
    spawn_job(
        "closed_positions",
        config.schedule.closed_positions_interval_secs,
        move || {
            let scheduler = Arc::clone(&closed_positions);
            async move {
                scheduler.tick().await?;
                Ok(())
            }
        },
    );

    let event_refresh = Arc::new(EventRefreshScheduler::new(
        events_api,
        events.clone(),
        markets.clone(),
        config.workers.event_update_workers,
    ));
    spawn_job(
        "event_refresh",
        config.schedule.event_refresh_interval_secs,
        move || {
            let scheduler = Arc::clone(&event_refresh);
            async move {
                scheduler.tick().await?;
                Ok(())
            }
        },
    );

    let wallet_pnl = Arc::new(WalletPnlScheduler::new(
        wallets.clone(),
        pnl_repo,
        config.workers.pnl_scheduler_workers,
    ));
    spawn_job(
        "wallet_pnl",
        config.schedule.wallet_pnl_interval_secs,
        move || {
            let scheduler = Arc::clone(&wallet_pnl);
            async move {
                scheduler.tick(None, None).await?;
                Ok(())
            }
        },
    );

    info!("all schedulers running");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    Ok(())
}

/// Spawn a periodic job. Ticks never overlap: the loop awaits the cycle
/// before sleeping, and a failed tick is logged and retried next interval.
fn spawn_job<F, Fut>(name: &'static str, interval_secs: u64, mut tick: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let interval = Duration::from_secs(interval_secs);
    tokio::spawn(async move {
        // Stagger startup so jobs do not all hit upstream at once.
        tokio::time::sleep(Duration::from_secs(10)).await;
        loop {
            info!(job = name, "tick started");
            if let Err(e) = tick().await {
                error!(job = name, error = %e, "tick failed");
            }
            tokio::time::sleep(interval).await;
        }
    });
}
