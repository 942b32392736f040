//! Sync Engine
//!
//! The periodic schedulers that keep the store in step with upstream:
//! event/market refresh, position reconciliation, trade synchronization,
//! recently-closed enrichment, batch sync, and per-wallet PnL snapshots.

pub mod batch_sync;
pub mod closed_positions;
pub mod event_refresh;
pub mod leaderboard_stats;
pub mod pnl;
pub mod position_sync;
pub mod stats;
pub mod trade_sync;
pub mod triggers;
pub mod wallet_pnl;

pub use stats::TickStats;
pub use triggers::{TriggerHub, TriggerOutcome};
