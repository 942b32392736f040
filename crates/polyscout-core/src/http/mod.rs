//! Rate-limited HTTP access to the upstream platform.
//!
//! Every upstream call flows through a [`RateLimitedClient`]: a token-bucket
//! limiter keyed by endpoint class, a shared pooled `reqwest` client, retry
//! with exponential backoff, and Prometheus-style request metrics.

mod client;
mod limiter;
pub mod metrics;

pub use client::{build_http_client, RateLimitedClient};
pub use limiter::LimiterRegistry;

/// Endpoint classes with distinct upstream rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    Positions,
    ClosedPositions,
    Trades,
    General,
}

impl EndpointClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::Positions => "positions",
            EndpointClass::ClosedPositions => "closed_positions",
            EndpointClass::Trades => "trades",
            EndpointClass::General => "general",
        }
    }
}

impl std::fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
