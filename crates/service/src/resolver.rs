//! Snapshot pointer resolution.

use crate::error::{ServiceError, ServiceResult};
use crate::metrics;
use async_trait::async_trait;
use fca_storage::ObjectStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use time::{Duration, OffsetDateTime};

/// How long resolved pointers stay cached.
const CACHE_TTL: Duration = Duration::minutes(5);

/// Maps a logical object name (e.g. `minimal/latest`) to a snapshot URL.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, name: &str) -> ServiceResult<String>;
}

/// Resolver reading the pointer object's body from the store. The worker
/// writes the retrieval URL into the body, so the trimmed body is the answer.
pub struct StoreResolver {
    store: Arc<dyn ObjectStore>,
}

impl StoreResolver {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Resolver for StoreResolver {
    async fn resolve(&self, name: &str) -> ServiceResult<String> {
        let body = self.store.get(name).await?;
        let url = String::from_utf8_lossy(&body).trim().to_string();

        if url.is_empty() {
            return Err(ServiceError::EmptyPointer(name.to_string()));
        }

        Ok(url)
    }
}

struct CacheEntry {
    value: String,
    expiry: OffsetDateTime,
}

/// Caching wrapper around another resolver. Entries live five minutes from
/// insertion; failures are never cached. The lock is held only around the
/// map read and the map write, so concurrent misses for the same name may
/// race the inner resolver; results are deterministic, so the duplicate work
/// is tolerated.
pub struct CachedResolver<R> {
    inner: R,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl<R: Resolver> CachedResolver<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn read(&self, name: &str) -> Option<String> {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .get(name)
            .filter(|entry| OffsetDateTime::now_utc() < entry.expiry)
            .map(|entry| entry.value.clone())
    }

    fn write(&self, name: &str, value: &str) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.insert(
            name.to_string(),
            CacheEntry {
                value: value.to_string(),
                expiry: OffsetDateTime::now_utc() + CACHE_TTL,
            },
        );
    }
}

#[async_trait]
impl<R: Resolver> Resolver for CachedResolver<R> {
    async fn resolve(&self, name: &str) -> ServiceResult<String> {
        if let Some(value) = self.read(name) {
            tracing::debug!(name, "cache hit");
            metrics::RESOLVER_CACHE_HITS.inc();
            return Ok(value);
        }

        let value = self.inner.resolve(name).await?;

        tracing::debug!(name, "cache miss");
        metrics::RESOLVER_CACHE_MISSES.inc();
        self.write(name, &value);

        Ok(value)
    }
}
