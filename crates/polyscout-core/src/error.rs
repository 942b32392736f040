//! Error types for the polyscout ingestion pipeline.

use thiserror::Error;

use crate::http::EndpointClass;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Upstream API error: {message}")]
    Api { message: String, status: Option<u16> },

    #[error("Upstream retries exhausted for {class} (last status: {last_status:?})")]
    UpstreamExhausted {
        class: EndpointClass,
        last_status: Option<u16>,
    },

    #[error("Malformed upstream response: {0}")]
    MalformedUpstream(String),

    #[error("Invariant violation: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, Error>;
