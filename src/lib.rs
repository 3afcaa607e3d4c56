//! Showtime aggregator for the Tel Aviv Cinematheque.
//!
//! Per-date listing pages are fetched in staggered batches, parsed into
//! [`Movie`] records, merged by title and kept in a cache.

pub mod cache;
pub mod error;
pub mod extract;
pub mod feed;
pub mod fetcher;
pub mod merge;
pub mod models;
pub mod service;
pub mod settings;
pub mod source;

pub use cache::{CacheGateway, CacheStore, MemoryStore, RedisStore};
pub use error::{CacheError, ExtractError, FeedError, FetchError};
pub use extract::ScheduleExtractor;
pub use feed::generate_rss;
pub use fetcher::{BatchedFetcher, FetcherConfig};
pub use merge::{MovieMap, merge_movies};
pub use models::{Movie, Screening};
pub use service::{DeleteOutcome, ScheduleService};
pub use settings::Settings;
pub use source::{CinemaSite, SchedulePages};
