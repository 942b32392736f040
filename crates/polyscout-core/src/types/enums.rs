//! Domain enumerations with stable storage codes.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Kind of an aggregated trade row.
///
/// BUY and SPLIT put money into a market; SELL, MERGE and REDEEM take money
/// out. The integer codes are what the `trades.trade_type` column stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[repr(i16)]
pub enum TradeType {
    Buy = 1,
    Sell = 2,
    Merge = 3,
    Split = 4,
    Redeem = 5,
}

impl TradeType {
    /// Map an upstream activity record (`type`, `side`) to a domain type.
    pub fn from_api_type(api_type: &str, side: &str) -> Result<Self> {
        match api_type {
            "TRADE" => match side {
                "BUY" => Ok(TradeType::Buy),
                "SELL" => Ok(TradeType::Sell),
                other => Err(Error::MalformedUpstream(format!(
                    "invalid side '{other}' for TRADE activity"
                ))),
            },
            "MERGE" => Ok(TradeType::Merge),
            "SPLIT" => Ok(TradeType::Split),
            "REDEEM" => Ok(TradeType::Redeem),
            other => Err(Error::MalformedUpstream(format!(
                "unknown activity type: {other}"
            ))),
        }
    }

    /// Money leaves the wallet for these types.
    pub fn is_investment(&self) -> bool {
        matches!(self, TradeType::Buy | TradeType::Split)
    }

    /// Money returns to the wallet for these types.
    pub fn is_divestment(&self) -> bool {
        matches!(self, TradeType::Sell | TradeType::Merge | TradeType::Redeem)
    }
}

/// Lifecycle state of a position row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[repr(i16)]
pub enum PositionStatus {
    Open = 1,
    Closed = 2,
    ClosedNeedData = 3,
}

/// Trade synchronization state of a position row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[repr(i16)]
pub enum TradeStatus {
    Pending = 1,
    NeedToPullTrades = 2,
    TradesPulled = 3,
    PositionClosedNeedData = 4,
    Error = 5,
    NeedToCalculatePnl = 6,
    TradesSynced = 7,
}

/// Wallet lifecycle: NEW until the first full position ingestion, OLD after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
pub enum WalletType {
    New,
    Old,
}

impl WalletType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletType::New => "NEW",
            WalletType::Old => "OLD",
        }
    }
}

/// Closed set of event categories derived from upstream tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    Politics,
    Sports,
    Crypto,
    Culture,
    Mentions,
    Weather,
    Economy,
    Tech,
    Finance,
    Others,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Politics => "POLITICS",
            EventCategory::Sports => "SPORTS",
            EventCategory::Crypto => "CRYPTO",
            EventCategory::Culture => "CULTURE",
            EventCategory::Mentions => "MENTIONS",
            EventCategory::Weather => "WEATHER",
            EventCategory::Economy => "ECONOMY",
            EventCategory::Tech => "TECH",
            EventCategory::Finance => "FINANCE",
            EventCategory::Others => "OTHERS",
        }
    }

    const NAMED: [EventCategory; 9] = [
        EventCategory::Politics,
        EventCategory::Sports,
        EventCategory::Crypto,
        EventCategory::Culture,
        EventCategory::Mentions,
        EventCategory::Weather,
        EventCategory::Economy,
        EventCategory::Tech,
        EventCategory::Finance,
    ];

    /// Classify a tag label: exact match first, then whole-word containment
    /// (word boundaries are start/end of string, spaces and hyphens), else
    /// OTHERS.
    pub fn from_tag_label(label: &str) -> EventCategory {
        let label_upper = label.trim().to_uppercase();
        if label_upper.is_empty() {
            return EventCategory::Others;
        }

        for category in Self::NAMED {
            if category.as_str() == label_upper {
                return category;
            }
        }

        for category in Self::NAMED {
            if contains_whole_word(&label_upper, category.as_str()) {
                return category;
            }
        }

        EventCategory::Others
    }

    /// Classify an event from its tag list: the first tag that maps to a
    /// named category wins.
    pub fn from_tags<'a, I: IntoIterator<Item = &'a str>>(tags: I) -> EventCategory {
        for tag in tags {
            let category = Self::from_tag_label(tag);
            if category != EventCategory::Others {
                return category;
            }
        }
        EventCategory::Others
    }
}

fn contains_whole_word(haystack: &str, word: &str) -> bool {
    let mut search_from = 0;
    while let Some(pos) = haystack[search_from..].find(word) {
        let start = search_from + pos;
        let end = start + word.len();
        let boundary_before = start == 0
            || matches!(haystack.as_bytes()[start - 1], b' ' | b'-');
        let boundary_after = end == haystack.len()
            || matches!(haystack.as_bytes()[end], b' ' | b'-');
        if boundary_before && boundary_after {
            return true;
        }
        search_from = end;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_type_mapping() {
        assert_eq!(
            TradeType::from_api_type("TRADE", "BUY").unwrap(),
            TradeType::Buy
        );
        assert_eq!(
            TradeType::from_api_type("TRADE", "SELL").unwrap(),
            TradeType::Sell
        );
        assert_eq!(
            TradeType::from_api_type("MERGE", "").unwrap(),
            TradeType::Merge
        );
        assert_eq!(
            TradeType::from_api_type("SPLIT", "").unwrap(),
            TradeType::Split
        );
        assert_eq!(
            TradeType::from_api_type("REDEEM", "").unwrap(),
            TradeType::Redeem
        );
        assert!(TradeType::from_api_type("TRADE", "HOLD").is_err());
        assert!(TradeType::from_api_type("REWARD", "").is_err());
    }

    #[test]
    fn investment_classification() {
        assert!(TradeType::Buy.is_investment());
        assert!(TradeType::Split.is_investment());
        assert!(TradeType::Sell.is_divestment());
        assert!(TradeType::Merge.is_divestment());
        assert!(TradeType::Redeem.is_divestment());
        assert!(!TradeType::Redeem.is_investment());
    }

    #[test]
    fn category_exact_match() {
        assert_eq!(EventCategory::from_tag_label("crypto"), EventCategory::Crypto);
        assert_eq!(
            EventCategory::from_tag_label("Politics"),
            EventCategory::Politics
        );
    }

    #[test]
    fn category_whole_word_match() {
        assert_eq!(
            EventCategory::from_tag_label("Crypto Prices"),
            EventCategory::Crypto
        );
        assert_eq!(
            EventCategory::from_tag_label("US-Politics"),
            EventCategory::Politics
        );
        // "Cryptography" contains "CRYPTO" but not as a whole word.
        assert_eq!(
            EventCategory::from_tag_label("Cryptography"),
            EventCategory::Others
        );
    }

    #[test]
    fn category_from_tag_list() {
        assert_eq!(
            EventCategory::from_tags(["Breaking News", "Tech Giants"]),
            EventCategory::Tech
        );
        assert_eq!(
            EventCategory::from_tags(["Breaking News"]),
            EventCategory::Others
        );
        assert_eq!(EventCategory::from_tags([]), EventCategory::Others);
    }
}
