//! Entity model: persisted rows, domain enums, and the in-memory
//! Event → Market → Position hierarchy the schedulers work on.

mod enums;
pub mod hierarchy;
mod rows;

pub use enums::{EventCategory, PositionStatus, TradeStatus, TradeType, WalletType};
pub use hierarchy::{
    has_closed_positions_in_range, market_amounts_from_trades, BatchRef, EventNode, MarketAmounts,
    MarketNode, PositionSnapshot, WalletWithMarkets,
};
pub use rows::{
    Batch, Event, Market, Position, Trade, Wallet, WalletCategoryStat, WalletPnl,
};
