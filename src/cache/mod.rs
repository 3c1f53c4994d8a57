//! TTL-bound search result cache with single-flight de-duplication.
//!
//! The cache sits in front of the orchestrator's crawl path. Entries are
//! immutable once written and superseded (never mutated) after expiry.
//! `single_flight` gives concurrent logically-identical queries one
//! producer run: the first caller crawls, the rest rendezvous on a per-key
//! mutex and read the freshly written entry. This is per-key
//! de-duplication — the global Admission Slot in the orchestrator is a
//! separate, cross-key resource limiter.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::CrawlResult;
use crate::records::{CacheEntry, ProductRecord, QueryKey};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache storage error: {0}")]
    Storage(String),

    #[error("cache serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(err: sqlx::Error) -> Self {
        CacheError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

/// Row-store abstraction the cache persists through.
///
/// The storage row is `(query_key, platform_set, filters_hash,
/// results_json, created_at, expires_at)`, unique on the key triple.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn load(&self, key: &QueryKey) -> Result<Option<CacheEntry>, CacheError>;
    async fn save(&self, entry: &CacheEntry) -> Result<(), CacheError>;
}

/// Outcome of a single-flight lookup.
pub enum FlightOutcome<T> {
    /// Served from cache (fresh entry, or one written by the flight that
    /// beat us to the key).
    Cached(CacheEntry),
    /// This caller ran the producer.
    Produced(T),
}

/// The search cache façade.
pub struct SearchCache {
    store: Arc<dyn CacheStore>,
    flights: DashMap<QueryKey, Arc<tokio::sync::Mutex<()>>>,
}

impl SearchCache {
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            flights: DashMap::new(),
        }
    }

    /// Fresh-only read. A present-but-expired entry is a miss here; use
    /// [`SearchCache::get_stale`] for the degraded fallback path.
    pub async fn get(&self, key: &QueryKey) -> Result<Option<CacheEntry>, CacheError> {
        let entry = self.store.load(key).await?;
        Ok(entry.filter(|e| e.is_fresh(Utc::now())))
    }

    /// Read ignoring freshness — the stale-while-revalidate fallback when
    /// every live crawl fails. Stale data annotated as such beats an
    /// empty response for end users.
    pub async fn get_stale(&self, key: &QueryKey) -> Result<Option<CacheEntry>, CacheError> {
        self.store.load(key).await
    }

    /// Write a new entry superseding any prior one for the key.
    pub async fn put(
        &self,
        key: &QueryKey,
        results: Vec<ProductRecord>,
        ttl: Duration,
    ) -> Result<CacheEntry, CacheError> {
        let created_at = Utc::now();
        let entry = CacheEntry {
            key: key.clone(),
            results,
            created_at,
            expires_at: created_at + chrono::Duration::seconds(ttl.as_secs() as i64),
        };
        self.store.save(&entry).await?;
        Ok(entry)
    }

    /// Run `producer` at most once per key across concurrent identical
    /// requests.
    ///
    /// The fast path is a fresh cache hit. Otherwise callers serialize on
    /// a per-key mutex; whoever enters first runs the producer, and the
    /// rest re-check the cache after the flight lands. A store failure is
    /// logged and degrades to a direct produce — caching is an
    /// optimization, not a correctness dependency.
    pub async fn single_flight<T, F, Fut>(
        &self,
        key: &QueryKey,
        bypass_read: bool,
        producer: F,
    ) -> CrawlResult<FlightOutcome<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CrawlResult<T>>,
    {
        if !bypass_read {
            match self.get(key).await {
                Ok(Some(entry)) => {
                    debug!("cache hit, no crawl");
                    return Ok(FlightOutcome::Cached(entry));
                }
                Ok(None) => {}
                Err(e) => warn!("cache read failed, degrading to direct crawl: {e}"),
            }
        }

        let guard = self
            .flights
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _flight = guard.lock().await;

        // Another flight may have landed while we waited on the mutex.
        if !bypass_read {
            match self.get(key).await {
                Ok(Some(entry)) => {
                    debug!("cache filled by concurrent flight");
                    return Ok(FlightOutcome::Cached(entry));
                }
                Ok(None) => {}
                Err(e) => warn!("cache re-check failed: {e}"),
            }
        }

        let result = producer().await;

        // Late arrivals that never observed this flight's mutex entry will
        // create a fresh one and find the entry in the store instead.
        self.flights.remove(key);

        result.map(FlightOutcome::Produced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Platform, SearchFilters};

    fn key(query: &str) -> QueryKey {
        QueryKey::new(query, &[Platform::Lazada], &SearchFilters::default())
    }

    fn record(id: &str, price: f64) -> ProductRecord {
        ProductRecord {
            source_platform: Platform::Lazada,
            source_id: id.to_string(),
            title: format!("item {id}"),
            price,
            original_price: None,
            image_url: String::new(),
            product_url: String::new(),
            rating: None,
            rating_count: None,
            confidence: crate::records::ExtractionConfidence::Direct,
        }
    }

    #[tokio::test]
    async fn round_trip_until_expiry() {
        let cache = SearchCache::new(Arc::new(MemoryStore::new()));
        let k = key("dress");

        assert!(cache.get(&k).await.unwrap().is_none());

        cache
            .put(&k, vec![record("a", 10.0)], Duration::from_secs(60))
            .await
            .unwrap();

        let hit = cache.get(&k).await.unwrap().expect("fresh hit");
        assert_eq!(hit.results.len(), 1);
        assert_eq!(hit.results[0].source_id, "a");
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss_but_stale_readable() {
        let cache = SearchCache::new(Arc::new(MemoryStore::new()));
        let k = key("dress");

        cache
            .put(&k, vec![record("a", 10.0)], Duration::from_secs(0))
            .await
            .unwrap();

        assert!(cache.get(&k).await.unwrap().is_none(), "expired = miss");
        assert!(
            cache.get_stale(&k).await.unwrap().is_some(),
            "stale read still serves the superseded entry"
        );
    }

    #[tokio::test]
    async fn put_supersedes_prior_entry() {
        let cache = SearchCache::new(Arc::new(MemoryStore::new()));
        let k = key("dress");

        cache
            .put(&k, vec![record("old", 10.0)], Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .put(&k, vec![record("new", 12.0)], Duration::from_secs(60))
            .await
            .unwrap();

        let hit = cache.get(&k).await.unwrap().unwrap();
        assert_eq!(hit.results[0].source_id, "new");
    }

    #[tokio::test]
    async fn single_flight_runs_producer_once_for_identical_keys() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let cache = Arc::new(SearchCache::new(Arc::new(MemoryStore::new())));
        let produced = Arc::new(AtomicU32::new(0));
        let k = key("dress");

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let produced = produced.clone();
            let k = k.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .single_flight(&k, false, || async {
                        produced.fetch_add(1, Ordering::SeqCst);
                        // Producer writes back, as the orchestrator does.
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        cache
                            .put(&k, vec![record("a", 10.0)], Duration::from_secs(60))
                            .await
                            .map_err(|e| crate::error::CrawlError::CacheUnavailable(e.to_string()))?;
                        Ok(vec![record("a", 10.0)])
                    })
                    .await
            }));
        }

        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            match outcome {
                FlightOutcome::Cached(entry) => assert_eq!(entry.results[0].source_id, "a"),
                FlightOutcome::Produced(results) => assert_eq!(results[0].source_id, "a"),
            }
        }
        assert_eq!(produced.load(Ordering::SeqCst), 1, "exactly one crawl");
    }

    #[tokio::test]
    async fn bypass_read_skips_fresh_hit() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let cache = SearchCache::new(Arc::new(MemoryStore::new()));
        let produced = AtomicU32::new(0);
        let k = key("dress");

        cache
            .put(&k, vec![record("cached", 10.0)], Duration::from_secs(60))
            .await
            .unwrap();

        let outcome = cache
            .single_flight(&k, true, || async {
                produced.fetch_add(1, Ordering::SeqCst);
                Ok(vec![record("live", 11.0)])
            })
            .await
            .unwrap();

        assert_eq!(produced.load(Ordering::SeqCst), 1);
        assert!(matches!(outcome, FlightOutcome::Produced(_)));
    }
}
