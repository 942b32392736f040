//! Token-bucket limiters, one per endpoint class.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::info;

use super::EndpointClass;
use crate::config::RateLimitConfig;

/// Registry of per-class token buckets, built once at startup and shared
/// across every API adapter.
#[derive(Clone)]
pub struct LimiterRegistry {
    positions: Arc<DefaultDirectRateLimiter>,
    closed_positions: Arc<DefaultDirectRateLimiter>,
    trades: Arc<DefaultDirectRateLimiter>,
    general: Arc<DefaultDirectRateLimiter>,
}

impl LimiterRegistry {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            positions: Arc::new(build_limiter(
                EndpointClass::Positions,
                config.positions_rate_limit,
                config.window_seconds,
            )),
            closed_positions: Arc::new(build_limiter(
                EndpointClass::ClosedPositions,
                config.closed_positions_rate_limit,
                config.window_seconds,
            )),
            trades: Arc::new(build_limiter(
                EndpointClass::Trades,
                config.trades_rate_limit,
                config.window_seconds,
            )),
            general: Arc::new(build_limiter(
                EndpointClass::General,
                config.general_rate_limit(),
                config.window_seconds,
            )),
        }
    }

    pub fn limiter(&self, class: EndpointClass) -> Arc<DefaultDirectRateLimiter> {
        match class {
            EndpointClass::Positions => Arc::clone(&self.positions),
            EndpointClass::ClosedPositions => Arc::clone(&self.closed_positions),
            EndpointClass::Trades => Arc::clone(&self.trades),
            EndpointClass::General => Arc::clone(&self.general),
        }
    }
}

fn build_limiter(class: EndpointClass, rate: u32, window_seconds: u64) -> DefaultDirectRateLimiter {
    let rate = NonZeroU32::new(rate.max(1)).expect("rate is at least 1");
    // N requests per window = one replenished cell every window/N, with a
    // burst allowance of the full window.
    let period = Duration::from_secs(window_seconds.max(1)) / rate.get();
    let quota = Quota::with_period(period)
        .expect("period is non-zero")
        .allow_burst(rate);

    info!(
        class = class.as_str(),
        rate = rate.get(),
        window_seconds,
        "created rate limiter"
    );

    RateLimiter::direct(quota)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_rate_config() -> RateLimitConfig {
        RateLimitConfig {
            positions_rate_limit: 120,
            closed_positions_rate_limit: 120,
            trades_rate_limit: 160,
            window_seconds: 10,
        }
    }

    #[test]
    fn registry_builds_all_classes() {
        let registry = LimiterRegistry::new(&test_rate_config());
        for class in [
            EndpointClass::Positions,
            EndpointClass::ClosedPositions,
            EndpointClass::Trades,
            EndpointClass::General,
        ] {
            // A freshly built bucket admits at least one request immediately.
            assert!(registry.limiter(class).check().is_ok());
        }
    }

    #[tokio::test]
    async fn bucket_admits_burst_up_to_rate() {
        let limiter = build_limiter(EndpointClass::General, 5, 10);
        for _ in 0..5 {
            assert!(limiter.check().is_ok());
        }
        // Sixth immediate request exceeds the burst allowance.
        assert!(limiter.check().is_err());
    }
}
