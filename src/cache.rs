use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::CacheError;
use crate::models::Movie;

/// Key the whole aggregate is stored under.
pub const CACHE_KEY: &str = "cinemathequeMovies";

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Minimal key/value backend the gateway needs.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    /// Opens a connection if none is usable. Called before every operation.
    async fn ensure_connected(&self) -> bool;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Returns whether a value was present.
    async fn del(&self, key: &str) -> Result<bool, CacheError>;
}

/// Redis backend with a lazily (re)opened multiplexed connection.
///
/// The process may be started fresh per request, so the connection is never
/// assumed to outlive a failure: any failed command drops it and the next
/// operation reconnects.
pub struct RedisStore {
    client: Option<redis::Client>,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisStore {
    pub fn new(url: Option<&str>) -> Result<Self, CacheError> {
        let client = match url {
            Some(url) => Some(redis::Client::open(url)?),
            None => {
                warn!("no redis url configured, cache features are unavailable");
                None
            }
        };
        Ok(Self {
            client,
            conn: Mutex::new(None),
        })
    }

    /// A store that never connects.
    pub fn disabled() -> Self {
        Self {
            client: None,
            conn: Mutex::new(None),
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        let client = self.client.as_ref().ok_or(CacheError::Unavailable)?;
        if let Some(conn) = self.conn.lock().as_ref() {
            return Ok(conn.clone());
        }

        // Lock released while connecting; a concurrent connect just overwrites.
        let conn = client.get_multiplexed_async_connection().await?;
        info!("redis client connected on demand");
        *self.conn.lock() = Some(conn.clone());
        Ok(conn)
    }

    fn drop_connection(&self) {
        self.conn.lock().take();
    }

    fn checked<T>(&self, result: redis::RedisResult<T>) -> Result<T, CacheError> {
        result.map_err(|err| {
            self.drop_connection();
            CacheError::from(err)
        })
    }
}

#[async_trait::async_trait]
impl CacheStore for RedisStore {
    async fn ensure_connected(&self) -> bool {
        match self.connection().await {
            Ok(_) => true,
            Err(CacheError::Unavailable) => false,
            Err(err) => {
                error!(error = %err, "failed to connect to redis on demand");
                false
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        let value = conn.get::<_, Option<String>>(key).await;
        self.checked(value)
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let stored = conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)).await;
        self.checked(stored)
    }

    async fn del(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        let removed = conn.del::<_, i64>(key).await;
        Ok(self.checked(removed)? > 0)
    }
}

/// In-process store with expiry, used by tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryStore {
    async fn ensure_connected(&self) -> bool {
        true
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((_, expires_at)) if *expires_at <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.entries
            .lock()
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, CacheError> {
        let mut entries = self.entries.lock();
        Ok(match entries.remove(key) {
            Some((_, expires_at)) => expires_at > Instant::now(),
            None => false,
        })
    }
}

/// Read-through / write-behind access to the cached aggregate.
///
/// Reads and writes degrade silently (miss, no-op); only an explicit delete
/// reports an unreachable backend.
#[derive(Clone)]
pub struct CacheGateway {
    store: Arc<dyn CacheStore>,
    key: String,
    ttl: Duration,
}

impl CacheGateway {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            key: CACHE_KEY.to_string(),
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn ensure_connected(&self) -> bool {
        self.store.ensure_connected().await
    }

    pub async fn get(&self) -> Option<Vec<Movie>> {
        if !self.ensure_connected().await {
            warn!("cache not available, skipping cache check");
            return None;
        }

        let raw = match self.store.get(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                error!(key = %self.key, error = %err, "cache read failed");
                return None;
            }
        };

        match serde_json::from_str::<Vec<Movie>>(&raw) {
            Ok(movies) => {
                debug!(key = %self.key, movies = movies.len(), "cache hit");
                Some(movies)
            }
            Err(err) => {
                error!(key = %self.key, error = %err, "cached payload is not a movie list");
                None
            }
        }
    }

    pub async fn set(&self, movies: &[Movie], ttl: Duration) {
        if !self.ensure_connected().await {
            warn!("cache not available, skipping cache write");
            return;
        }

        let payload = match serde_json::to_string(movies) {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = %err, "failed to serialize movies for cache");
                return;
            }
        };

        match self.store.set_ex(&self.key, payload, ttl).await {
            Ok(()) => info!(
                key = %self.key,
                movies = movies.len(),
                ttl_secs = ttl.as_secs(),
                "movies stored in cache"
            ),
            Err(err) => error!(key = %self.key, error = %err, "cache write failed"),
        }
    }

    /// Removes the aggregate. `Ok(false)` means there was nothing to remove.
    pub async fn delete(&self) -> Result<bool, CacheError> {
        if !self.ensure_connected().await {
            warn!("cache not available, cannot delete cache");
            return Err(CacheError::Unavailable);
        }

        let deleted = self.store.del(&self.key).await?;
        if deleted {
            info!(key = %self.key, "cache key deleted");
        } else {
            info!(key = %self.key, "cache key not found or already deleted");
        }
        Ok(deleted)
    }
}
