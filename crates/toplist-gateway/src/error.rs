use thiserror::Error;
use toplist_middleware::{CacheError, TransportError};

#[derive(Error, Debug)]
pub enum Error {
    #[error("broker error: {0}")]
    Transport(#[from] TransportError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("no response from '{service}' within {timeout_ms}ms")]
    CorrelationTimeout { service: String, timeout_ms: u64 },

    #[error("join key '{key}' missing from source {source_index}")]
    MergeKeyMissing { source_index: usize, key: &'static str },

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid UTF-8 payload: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("configuration error: {0}")]
    Config(String),
}
