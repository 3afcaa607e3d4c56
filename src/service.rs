use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::CacheGateway;
use crate::error::CacheError;
use crate::fetcher::BatchedFetcher;
use crate::models::Movie;

/// Result of an explicit cache deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub deleted: bool,
}

/// Cache-first access to the aggregate schedule.
pub struct ScheduleService {
    fetcher: BatchedFetcher,
    cache: CacheGateway,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl ScheduleService {
    pub fn new(fetcher: BatchedFetcher, cache: CacheGateway) -> Self {
        Self {
            fetcher,
            cache,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Cached aggregate if present, otherwise a live fetch that is cached
    /// behind the caller's back.
    pub async fn get_aggregate(&self) -> Vec<Movie> {
        if let Some(movies) = self.cache.get().await {
            info!(movies = movies.len(), "cache hit, returning cached movies");
            return movies;
        }

        info!("cache miss, fetching fresh movies");
        let movies = self.fetcher.fetch_movies().await;
        self.store_behind(&movies);
        movies
    }

    /// Live fetch regardless of the cache; the result still replaces it.
    pub async fn force_refresh(&self) -> Vec<Movie> {
        info!("forcing refresh of cinematheque movies");
        let movies = self.fetcher.fetch_movies().await;
        self.store_behind(&movies);
        movies
    }

    /// Movies from the category pages. Always live, never cached.
    pub async fn get_category_movies(&self) -> Vec<Movie> {
        info!("fetching category page movies");
        self.fetcher.fetch_category_movies().await
    }

    /// Fails only when the cache backend cannot be reached.
    pub async fn delete_cached_aggregate(&self) -> Result<DeleteOutcome, CacheError> {
        let deleted = self.cache.delete().await?;
        Ok(DeleteOutcome { deleted })
    }

    /// Waits for detached cache writes. Short-lived processes call this after
    /// their output is already written.
    pub async fn flush_pending_writes(&self) {
        let pending = std::mem::take(&mut *self.pending.lock());
        for handle in pending {
            if let Err(err) = handle.await {
                warn!(error = %err, "cache write task did not complete");
            }
        }
    }

    /// Detached write; its outcome is only logged by the gateway.
    fn store_behind(&self, movies: &[Movie]) {
        let cache = self.cache.clone();
        let snapshot = movies.to_vec();
        let ttl = cache.ttl();
        let handle = tokio::spawn(async move {
            cache.set(&snapshot, ttl).await;
        });

        let mut pending = self.pending.lock();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cache::{MemoryStore, RedisStore};
    use crate::error::FetchError;
    use crate::extract::ScheduleExtractor;
    use crate::fetcher::FetcherConfig;
    use crate::models::{LEGACY_VENUE, Screening, VENUE};
    use crate::source::{Page, SchedulePages};

    /// Every date serves the same one-movie page and counts requests.
    #[derive(Default)]
    struct CountingPages {
        hits: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl SchedulePages for CountingPages {
        async fn fetch_page(&self, date: &str) -> Result<Page, FetchError> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(Page {
                url: format!("https://www.cinema.co.il/shown/?date={date}"),
                body: r#"<div class="text-content"><div class="title">
                    <h3><a href="/event/paterson/">Paterson</a></h3><p>2016</p></div>
                    <span class="time">21:00</span></div>"#
                    .to_string(),
            })
        }

        async fn fetch_category_page(&self, url: &str) -> Result<Page, FetchError> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            if url.ends_with("/gone/") {
                return Err(FetchError::Status(reqwest::StatusCode::NOT_FOUND));
            }
            Ok(Page {
                url: url.to_string(),
                body: r#"<div class="title"><h3>Paterson</h3>
                    <div class="n_block_r"><p>26-01-2025 | ראשון | 21:15</p></div></div>"#
                    .to_string(),
            })
        }
    }

    fn service(pages: Arc<CountingPages>, cache: CacheGateway) -> ScheduleService {
        let config = FetcherConfig {
            days_to_fetch: 3,
            category_urls: vec![
                "https://www.cinema.co.il/members/".to_string(),
                "https://www.cinema.co.il/gone/".to_string(),
            ],
            ..FetcherConfig::default()
        };
        let fetcher = BatchedFetcher::new(pages, ScheduleExtractor::new().unwrap(), config);
        ScheduleService::new(fetcher, cache)
    }

    #[tokio::test]
    async fn miss_fetches_and_writes_behind() {
        let pages = Arc::new(CountingPages::default());
        let cache = CacheGateway::new(Arc::new(MemoryStore::new()));
        let svc = service(pages.clone(), cache.clone());

        let movies = svc.get_aggregate().await;
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].screenings.len(), 3);
        assert_eq!(pages.hits.load(Ordering::SeqCst), 3);

        svc.flush_pending_writes().await;
        assert_eq!(cache.get().await, Some(movies.clone()));

        // Served from cache now.
        let again = svc.get_aggregate().await;
        assert_eq!(again, movies);
        assert_eq!(pages.hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn force_refresh_bypasses_cached_value() {
        let pages = Arc::new(CountingPages::default());
        let cache = CacheGateway::new(Arc::new(MemoryStore::new()));
        let mut stale = Movie::new("Stale");
        stale.add_screening(Screening::new("2020-01-01 10:00", VENUE));
        cache.set(&[stale], cache.ttl()).await;

        let svc = service(pages.clone(), cache.clone());
        let fresh = svc.force_refresh().await;
        assert_eq!(fresh[0].title, "Paterson");

        svc.flush_pending_writes().await;
        let cached = cache.get().await.unwrap();
        assert_eq!(cached[0].title, "Paterson");
    }

    #[tokio::test]
    async fn aggregate_survives_missing_cache() {
        let pages = Arc::new(CountingPages::default());
        let svc = service(pages, CacheGateway::new(Arc::new(RedisStore::disabled())));

        let movies = svc.get_aggregate().await;
        svc.flush_pending_writes().await;
        assert_eq!(movies.len(), 1);
        assert!(matches!(
            svc.delete_cached_aggregate().await,
            Err(CacheError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn delete_distinguishes_missing_key() {
        let pages = Arc::new(CountingPages::default());
        let svc = service(pages, CacheGateway::new(Arc::new(MemoryStore::new())));

        svc.get_aggregate().await;
        svc.flush_pending_writes().await;

        assert_eq!(
            svc.delete_cached_aggregate().await.unwrap(),
            DeleteOutcome { deleted: true }
        );
        assert_eq!(
            svc.delete_cached_aggregate().await.unwrap(),
            DeleteOutcome { deleted: false }
        );
    }

    #[tokio::test]
    async fn category_movies_skip_failed_pages_and_leave_cache_alone() {
        let pages = Arc::new(CountingPages::default());
        let cache = CacheGateway::new(Arc::new(MemoryStore::new()));
        let svc = service(pages.clone(), cache.clone());

        let movies = svc.get_category_movies().await;
        svc.flush_pending_writes().await;

        assert_eq!(pages.hits.load(Ordering::SeqCst), 2);
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].title, "Paterson");
        assert_eq!(movies[0].screenings[0].date_time, "26-01-2025 21:15");
        assert_eq!(movies[0].screenings[0].venue, LEGACY_VENUE);
        assert_eq!(cache.get().await, None);
    }
}
