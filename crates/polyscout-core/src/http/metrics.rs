//! Request metrics for the rate-limited HTTP client.

use std::time::Duration;

use super::EndpointClass;

pub fn record_success(class: EndpointClass, duration: Duration) {
    metrics::counter!("api_requests_total", "endpoint_class" => class.as_str(), "status" => "success")
        .increment(1);
    metrics::histogram!("api_request_duration_seconds", "endpoint_class" => class.as_str())
        .record(duration.as_secs_f64());
}

pub fn record_not_found(class: EndpointClass) {
    metrics::counter!("api_requests_total", "endpoint_class" => class.as_str(), "status" => "not_found")
        .increment(1);
}

pub fn record_rate_limited(class: EndpointClass) {
    metrics::counter!("api_rate_limit_hits_total", "endpoint_class" => class.as_str()).increment(1);
    metrics::counter!("api_requests_total", "endpoint_class" => class.as_str(), "status" => "rate_limited")
        .increment(1);
}

pub fn record_server_error(class: EndpointClass) {
    metrics::counter!("api_requests_total", "endpoint_class" => class.as_str(), "status" => "server_error")
        .increment(1);
}

pub fn record_client_error(class: EndpointClass) {
    metrics::counter!("api_requests_total", "endpoint_class" => class.as_str(), "status" => "client_error")
        .increment(1);
}

pub fn record_error(class: EndpointClass) {
    metrics::counter!("api_requests_total", "endpoint_class" => class.as_str(), "status" => "error")
        .increment(1);
}

pub fn record_retry(class: EndpointClass) {
    metrics::counter!("api_retry_attempts_total", "endpoint_class" => class.as_str()).increment(1);
}

pub fn inc_active(class: EndpointClass) {
    metrics::gauge!("api_active_requests", "endpoint_class" => class.as_str()).increment(1.0);
}

pub fn dec_active(class: EndpointClass) {
    metrics::gauge!("api_active_requests", "endpoint_class" => class.as_str()).decrement(1.0);
}
