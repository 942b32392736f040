//! Database access layer for PostgreSQL.
//!
//! One repository per table family, each exposing intent-named operations.
//! Bulk writes go through `QueryBuilder` with `ON CONFLICT` upserts; the two
//! hot paths (market-wise current value, post-sync PnL) are single CTE-driven
//! UPDATE statements.

pub mod batches;
pub mod events;
pub mod markets;
pub mod positions;
pub mod trades;
pub mod wallet_pnl;
pub mod wallets;

use std::path::Path;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;
use crate::Result;

pub use batches::BatchRepository;
pub use events::EventRepository;
pub use markets::MarketRepository;
pub use positions::PositionRepository;
pub use trades::TradeRepository;
pub use wallet_pnl::WalletPnlRepository;
pub use wallets::WalletRepository;

/// Rows per bulk statement; keeps the bind-parameter count under
/// PostgreSQL's limit.
pub(crate) const BULK_CHUNK_SIZE: usize = 500;

/// Create a PostgreSQL connection pool.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;

    Ok(pool)
}

/// Run database migrations from the migrations directory.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let migrator = sqlx::migrate::Migrator::new(Path::new("./migrations")).await?;
    migrator.run(pool).await?;
    Ok(())
}
