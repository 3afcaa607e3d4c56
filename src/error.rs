use std::time::Duration;

use thiserror::Error;

/// Raised only while compiling the extractor's selectors and patterns.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid selector `{selector}`: {reason}")]
    Selector { selector: &'static str, reason: String },

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Failure to obtain one date's listing page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("source answered with status {0}")]
    Status(reqwest::StatusCode),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache service unavailable")]
    Unavailable,

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cached payload could not be (de)serialized: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to write rss channel: {0}")]
    Rss(#[from] rss::Error),

    #[error("rss output is not utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
