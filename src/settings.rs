use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::cache::DEFAULT_TTL;
use crate::fetcher::FetcherConfig;
use crate::source::DEFAULT_BASE_URL;

/// Runtime settings: built-in defaults, then `cinematheque.toml` (optional),
/// then `CINEMATHEQUE_*` environment variables.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub days_to_fetch: usize,
    pub batch_size: usize,
    pub min_batch_delay_ms: u64,
    pub max_batch_delay_ms: u64,
    pub fetch_timeout_ms: u64,
    pub cache_ttl_secs: u64,
    pub source_base_url: String,
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Category pages in the older block layout; comma-separated in the env.
    pub category_urls: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let fetcher = FetcherConfig::default();
        Self {
            days_to_fetch: fetcher.days_to_fetch,
            batch_size: fetcher.batch_size,
            min_batch_delay_ms: fetcher.min_batch_delay.as_millis() as u64,
            max_batch_delay_ms: fetcher.max_batch_delay.as_millis() as u64,
            fetch_timeout_ms: fetcher.fetch_timeout.as_millis() as u64,
            cache_ttl_secs: DEFAULT_TTL.as_secs(),
            source_base_url: DEFAULT_BASE_URL.to_string(),
            redis_url: None,
            category_urls: fetcher.category_urls,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Like [`Settings::load`] but with an explicit (required) config file.
    pub fn load_from(file: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let builder = Config::builder()
            .set_default("days_to_fetch", defaults.days_to_fetch as i64)?
            .set_default("batch_size", defaults.batch_size as i64)?
            .set_default("min_batch_delay_ms", defaults.min_batch_delay_ms as i64)?
            .set_default("max_batch_delay_ms", defaults.max_batch_delay_ms as i64)?
            .set_default("fetch_timeout_ms", defaults.fetch_timeout_ms as i64)?
            .set_default("cache_ttl_secs", defaults.cache_ttl_secs as i64)?
            .set_default("source_base_url", defaults.source_base_url)?
            .set_default("category_urls", defaults.category_urls)?;

        let builder = match file {
            Some(path) => builder.add_source(File::from(path)),
            None => builder.add_source(File::with_name("cinematheque").required(false)),
        };

        builder
            .add_source(
                Environment::with_prefix("CINEMATHEQUE")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("category_urls"),
            )
            .build()?
            .try_deserialize()
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            days_to_fetch: self.days_to_fetch,
            batch_size: self.batch_size,
            min_batch_delay: Duration::from_millis(self.min_batch_delay_ms),
            max_batch_delay: Duration::from_millis(self.max_batch_delay_ms),
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
            category_urls: self.category_urls.clone(),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
