//! Typed adapters for the upstream Polymarket HTTP APIs.
//!
//! Adapters own pagination and return closed, typed records; raw JSON never
//! crosses this boundary. A 404 from upstream is "absent", not an error.

pub mod activity;
pub mod events;
pub mod leaderboard;
pub mod markets;
pub mod positions;

pub use activity::{ActivityApi, ActivityTransaction};
pub use events::{ApiEvent, ApiEventMarket, EventsApi};
pub use leaderboard::{LeaderboardApi, LeaderboardEntry};
pub use markets::{ApiMarketDetail, MarketsApi};
pub use positions::{ApiPosition, PositionsApi};

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

/// Data API host (positions, activity, leaderboard).
pub const DATA_API_BASE_URL: &str = "https://data-api.polymarket.com";
/// Gamma API host (events and markets by slug).
pub const GAMMA_API_BASE_URL: &str = "https://gamma-api.polymarket.com";

/// Parse an upstream date string as UTC.
///
/// Upstream mixes RFC 3339 timestamps and bare `YYYY-MM-DD` dates; a naive
/// timestamp is attached UTC.
pub fn parse_utc_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }
    None
}

/// Parse an upstream end date to a Unix timestamp at 23:59:59 UTC of that
/// day, so the whole date counts as "in range".
pub fn end_of_day_timestamp(raw: &str) -> Option<i64> {
    let parsed = parse_utc_datetime(raw)?;
    let end_of_day = parsed
        .date_naive()
        .and_time(NaiveTime::from_hms_opt(23, 59, 59)?);
    Some(Utc.from_utc_datetime(&end_of_day).timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_and_bare_dates() {
        let ts = parse_utc_datetime("2025-06-01T12:30:00Z").unwrap();
        assert_eq!(ts.timestamp(), 1748781000);

        let midnight = parse_utc_datetime("2025-06-01").unwrap();
        assert_eq!(midnight.format("%H:%M:%S").to_string(), "00:00:00");

        assert!(parse_utc_datetime("").is_none());
        assert!(parse_utc_datetime("not-a-date").is_none());
    }

    #[test]
    fn end_of_day_covers_full_date() {
        let start = parse_utc_datetime("2025-06-01").unwrap().timestamp();
        let eod = end_of_day_timestamp("2025-06-01").unwrap();
        assert_eq!(eod - start, 86_399);

        // RFC 3339 input with a time component still snaps to end of day.
        assert_eq!(end_of_day_timestamp("2025-06-01T04:00:00Z").unwrap(), eod);
    }
}
