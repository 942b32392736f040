//! Rate-limited HTTP client with retry and backoff.

use std::sync::Arc;
use std::time::{Duration, Instant};

use governor::DefaultDirectRateLimiter;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{error, warn};

use super::{metrics, EndpointClass, LimiterRegistry};
use crate::config::HttpConfig;
use crate::{Error, Result};

/// HTTP client bound to one endpoint class.
///
/// All requests acquire a token from the class limiter before hitting the
/// wire, and transient failures (connect errors, timeouts, HTTP 429/5xx)
/// are retried with exponential backoff. A 404 is not an error: it is
/// surfaced to the caller as `Ok(None)`.
#[derive(Clone)]
pub struct RateLimitedClient {
    client: reqwest::Client,
    limiter: Arc<DefaultDirectRateLimiter>,
    class: EndpointClass,
    max_attempts: u32,
    min_wait: Duration,
    max_wait: Duration,
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "accept",
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(
        "accept-language",
        HeaderValue::from_static("en-GB,en-US;q=0.9,en;q=0.8"),
    );
    headers.insert("origin", HeaderValue::from_static("https://polymarket.com"));
    headers.insert(
        "user-agent",
        HeaderValue::from_static(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36",
        ),
    );
    headers
}

/// Build the shared connection-pooled `reqwest` client every
/// [`RateLimitedClient`] clones from.
pub fn build_http_client(config: &HttpConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .default_headers(default_headers())
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .timeout(Duration::from_secs(config.timeout_seconds))
        .build()?)
}

impl RateLimitedClient {
    pub fn new(
        class: EndpointClass,
        shared_client: reqwest::Client,
        limiters: &LimiterRegistry,
        config: &HttpConfig,
    ) -> Self {
        Self {
            client: shared_client,
            limiter: limiters.limiter(class),
            class,
            max_attempts: config.max_retry_attempts.max(1),
            min_wait: Duration::from_secs(config.retry_min_wait_seconds),
            max_wait: Duration::from_secs(config.retry_max_wait_seconds),
        }
    }

    /// GET `url` with `query`, decode the JSON body as `T`.
    ///
    /// Returns `Ok(None)` on 404. Retries transient failures up to the
    /// configured attempt count, then fails with
    /// [`Error::UpstreamExhausted`].
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        let mut last_status: Option<u16> = None;

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                metrics::record_retry(self.class);
                let wait = self.backoff_for(attempt);
                warn!(
                    class = self.class.as_str(),
                    url,
                    attempt,
                    wait_secs = wait.as_secs(),
                    "retrying upstream request"
                );
                tokio::time::sleep(wait).await;
            }

            self.limiter.until_ready().await;
            metrics::inc_active(self.class);
            let started = Instant::now();
            let outcome = self.client.get(url).query(query).send().await;
            metrics::dec_active(self.class);

            match outcome {
                Ok(response) => {
                    let status = response.status();
                    last_status = Some(status.as_u16());

                    if status.is_success() {
                        metrics::record_success(self.class, started.elapsed());
                        return Ok(Some(response.json::<T>().await?));
                    }

                    if status == StatusCode::NOT_FOUND {
                        metrics::record_not_found(self.class);
                        return Ok(None);
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        metrics::record_rate_limited(self.class);
                        warn!(class = self.class.as_str(), url, "rate limit hit upstream");
                        continue;
                    }

                    if status.is_server_error() {
                        metrics::record_server_error(self.class);
                        warn!(
                            class = self.class.as_str(),
                            url,
                            status = status.as_u16(),
                            "upstream server error"
                        );
                        continue;
                    }

                    // Remaining 4xx are terminal for this request.
                    metrics::record_client_error(self.class);
                    error!(
                        class = self.class.as_str(),
                        url,
                        status = status.as_u16(),
                        "upstream client error"
                    );
                    return Err(Error::Api {
                        message: format!("upstream returned {status} for {url}"),
                        status: Some(status.as_u16()),
                    });
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    metrics::record_error(self.class);
                    warn!(class = self.class.as_str(), url, error = %e, "transient transport error");
                    continue;
                }
                Err(e) => {
                    metrics::record_error(self.class);
                    error!(class = self.class.as_str(), url, error = %e, "request failed");
                    return Err(e.into());
                }
            }
        }

        Err(Error::UpstreamExhausted {
            class: self.class,
            last_status,
        })
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        // 1s, 2s, 4s, ... capped at max_wait.
        let exp = attempt.saturating_sub(2).min(16);
        let wait = self.min_wait.saturating_mul(1u32 << exp);
        wait.min(self.max_wait)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with(min: u64, max: u64) -> RateLimitedClient {
        let http = HttpConfig {
            pool_max_idle_per_host: 2,
            timeout_seconds: 5,
            max_retry_attempts: 5,
            retry_min_wait_seconds: min,
            retry_max_wait_seconds: max,
        };
        let limiters = LimiterRegistry::new(&crate::config::RateLimitConfig {
            positions_rate_limit: 100,
            closed_positions_rate_limit: 100,
            trades_rate_limit: 100,
            window_seconds: 10,
        });
        let shared = build_http_client(&http).unwrap();
        RateLimitedClient::new(EndpointClass::General, shared, &limiters, &http)
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let client = client_with(1, 60);
        assert_eq!(client.backoff_for(2), Duration::from_secs(1));
        assert_eq!(client.backoff_for(3), Duration::from_secs(2));
        assert_eq!(client.backoff_for(4), Duration::from_secs(4));
        assert_eq!(client.backoff_for(5), Duration::from_secs(8));

        let tight = client_with(30, 60);
        assert_eq!(tight.backoff_for(4), Duration::from_secs(60));
    }
}
