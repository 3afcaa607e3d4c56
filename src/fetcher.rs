use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, Local, NaiveDate};
use futures::{StreamExt, future, stream};
use tracing::{debug, error, info};

use crate::error::FetchError;
use crate::extract::ScheduleExtractor;
use crate::merge::merge_movies;
use crate::models::Movie;
use crate::source::{DEFAULT_CATEGORY_URLS, Page, SchedulePages};

/// Knobs of the batched fetch.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Days to cover, today included.
    pub days_to_fetch: usize,
    /// Requests per batch, also the in-batch concurrency bound.
    pub batch_size: usize,
    pub min_batch_delay: Duration,
    pub max_batch_delay: Duration,
    pub fetch_timeout: Duration,
    /// Category pages parsed in the older block layout.
    pub category_urls: Vec<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            days_to_fetch: 30,
            batch_size: 5,
            min_batch_delay: Duration::from_millis(500),
            max_batch_delay: Duration::from_millis(2000),
            fetch_timeout: Duration::from_secs(30),
            category_urls: DEFAULT_CATEGORY_URLS.iter().map(|u| u.to_string()).collect(),
        }
    }
}

/// Source of the inter-batch delay.
pub trait Jitter: Send + Sync {
    /// A delay within `[min, max]`.
    fn pick(&self, min: Duration, max: Duration) -> Duration;
}

/// Uniformly random delay, drawn fresh on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomJitter;

impl Jitter for RandomJitter {
    fn pick(&self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        let lo = u64::try_from(min.as_millis()).unwrap_or(u64::MAX);
        let hi = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(fastrand::u64(lo..=hi))
    }
}

/// One group of dates dispatched together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub index: usize,
    pub dates: Vec<String>,
    /// Wait before dispatch, measured from the start of the run.
    pub delay: Duration,
}

/// `YYYY-MM-DD` strings for `start`, `start + 1`, ... (`days` entries).
pub fn target_dates(start: NaiveDate, days: usize) -> Vec<String> {
    (0..days as u64)
        .filter_map(|offset| start.checked_add_days(Days::new(offset)))
        .map(|date| date.format("%Y-%m-%d").to_string())
        .collect()
}

/// Pulls many date pages without hammering the site.
///
/// Batches start staggered by a random delay but then overlap freely; inside a
/// batch at most `batch_size` requests are in flight. A date that errors or
/// times out contributes nothing and never fails the run.
pub struct BatchedFetcher {
    source: Arc<dyn SchedulePages>,
    extractor: ScheduleExtractor,
    config: FetcherConfig,
    jitter: Box<dyn Jitter>,
}

impl BatchedFetcher {
    pub fn new(
        source: Arc<dyn SchedulePages>,
        extractor: ScheduleExtractor,
        config: FetcherConfig,
    ) -> Self {
        Self {
            source,
            extractor,
            config,
            jitter: Box::new(RandomJitter),
        }
    }

    pub fn with_jitter(mut self, jitter: impl Jitter + 'static) -> Self {
        self.jitter = Box::new(jitter);
        self
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    fn batch_size(&self) -> usize {
        self.config.batch_size.max(1)
    }

    /// Splits `dates` into consecutive batches; batch 0 starts immediately.
    pub fn plan_batches(&self, dates: &[String]) -> Vec<Batch> {
        dates
            .chunks(self.batch_size())
            .enumerate()
            .map(|(index, chunk)| Batch {
                index,
                dates: chunk.to_vec(),
                delay: if index == 0 {
                    Duration::ZERO
                } else {
                    self.jitter
                        .pick(self.config.min_batch_delay, self.config.max_batch_delay)
                },
            })
            .collect()
    }

    /// Fetches `days_to_fetch` days starting today (local time).
    pub async fn fetch_movies(&self) -> Vec<Movie> {
        let today = Local::now().date_naive();
        let dates = target_dates(today, self.config.days_to_fetch);
        self.fetch_dates(&dates).await
    }

    pub async fn fetch_dates(&self, dates: &[String]) -> Vec<Movie> {
        info!(
            dates = dates.len(),
            batch_size = self.batch_size(),
            min_delay_ms = self.config.min_batch_delay.as_millis() as u64,
            max_delay_ms = self.config.max_batch_delay.as_millis() as u64,
            "starting batched fetch"
        );

        let batches = self.plan_batches(dates);
        let total = batches.len();
        info!(batches = total, "split dates into batches");

        let per_batch =
            future::join_all(batches.into_iter().map(|batch| self.run_batch(batch, total))).await;

        let movies = merge_movies(per_batch.into_iter().flatten());
        info!(movies = movies.len(), "total unique movies found");
        movies
    }

    async fn run_batch(&self, batch: Batch, total: usize) -> Vec<Vec<Movie>> {
        if !batch.delay.is_zero() {
            tokio::time::sleep(batch.delay).await;
        }
        debug!(
            batch = batch.index + 1,
            total,
            requests = batch.dates.len(),
            delay_ms = batch.delay.as_millis() as u64,
            "launching batch"
        );

        let first = batch.index * self.batch_size();
        stream::iter(batch.dates.into_iter().enumerate())
            .map(move |(i, date)| async move { self.fetch_date(&date, first + i + 1).await })
            .buffer_unordered(self.batch_size())
            .collect()
            .await
    }

    /// Fetches every configured category page and merges the results.
    pub async fn fetch_category_movies(&self) -> Vec<Movie> {
        self.fetch_categories(&self.config.category_urls).await
    }

    /// Category pages are few, so they go out together, bounded by
    /// `batch_size` and without inter-batch delays.
    pub async fn fetch_categories(&self, urls: &[String]) -> Vec<Movie> {
        info!(pages = urls.len(), "fetching category pages");
        let per_page: Vec<Vec<Movie>> = stream::iter(urls)
            .map(|url| self.fetch_category(url))
            .buffer_unordered(self.batch_size())
            .collect()
            .await;

        let movies = merge_movies(per_page);
        info!(movies = movies.len(), "total unique category movies found");
        movies
    }

    async fn fetch_date(&self, date: &str, position: usize) -> Vec<Movie> {
        debug!(position, %date, "fetching date");
        match self.timed(self.source.fetch_page(date)).await {
            Ok(page) => {
                let movies = self.extractor.parse_page(&page.body, Some(&page.url));
                debug!(position, %date, movies = movies.len(), "date parsed");
                movies
            }
            Err(err) => {
                error!(position, %date, error = %err, "date fetch failed, skipping");
                Vec::new()
            }
        }
    }

    async fn fetch_category(&self, url: &str) -> Vec<Movie> {
        match self.timed(self.source.fetch_category_page(url)).await {
            Ok(page) => {
                let movies = self.extractor.parse_legacy_page(&page.body);
                debug!(%url, movies = movies.len(), "category page parsed");
                movies
            }
            Err(err) => {
                error!(%url, error = %err, "category fetch failed, skipping");
                Vec::new()
            }
        }
    }

    async fn timed(
        &self,
        request: impl Future<Output = Result<Page, FetchError>>,
    ) -> Result<Page, FetchError> {
        tokio::time::timeout(self.config.fetch_timeout, request)
            .await
            .unwrap_or(Err(FetchError::Timeout(self.config.fetch_timeout)))
    }
}
