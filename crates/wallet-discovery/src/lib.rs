//! Wallet Discovery
//!
//! Scans the Polymarket leaderboard for high-PnL wallets, evaluates each
//! candidate's recent activity and per-market PnL, and persists the wallets
//! that pass the quantitative gates together with their positions, trade
//! aggregates and sync watermarks.

pub mod candidates;
pub mod evaluation;
pub mod limits;
pub mod persistence;
pub mod service;

pub use candidates::{CandidateFetcher, WalletCandidate};
pub use evaluation::{EvaluationResult, WalletEvaluator};
pub use persistence::WalletPersistence;
pub use service::{DiscoveryReport, DiscoveryService};
