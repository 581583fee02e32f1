//! Read-through byte cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::CacheError;

/// Source of truth behind a [`ReadThroughCache`].
#[async_trait]
pub trait BackingStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Loads the value stored under `key`.
    async fn load(&self, key: &str) -> Result<Bytes, Self::Error>;
}

#[async_trait]
impl<T> BackingStore for Arc<T>
where
    T: BackingStore + ?Sized,
{
    type Error = T::Error;

    async fn load(&self, key: &str) -> Result<Bytes, Self::Error> {
        (**self).load(key).await
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// Maximum number of entries; least recently used ones are evicted.
    /// `None` keeps every entry.
    pub capacity: Option<usize>,
    /// Upper bound for one backing store read.
    pub fetch_timeout: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: None,
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

/// Value returned by [`ReadThroughCache::fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRead {
    pub value: Bytes,
    /// True if the value came from the cache.
    pub hit: bool,
}

#[derive(Debug)]
struct Entry {
    value: Bytes,
    last_access: AtomicU64,
}

/// In-memory cache in front of a [`BackingStore`].
///
/// Failures are never cached: a failed or timed out load leaves the key
/// absent so the next read tries the store again.
pub struct ReadThroughCache<B> {
    backing: B,
    settings: CacheSettings,
    entries: RwLock<HashMap<String, Entry>>,
    clock: AtomicU64,
}

impl<B: BackingStore> ReadThroughCache<B> {
    pub fn new(backing: B, settings: CacheSettings) -> Self {
        Self {
            backing,
            settings,
            entries: RwLock::new(HashMap::new()),
            clock: AtomicU64::new(0),
        }
    }

    pub fn backing(&self) -> &B {
        &self.backing
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the cached value without touching the backing store.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let entries = self.entries.read().unwrap();
        let entry = entries.get(key)?;
        entry.last_access.store(self.tick(), Ordering::Relaxed);
        Some(entry.value.clone())
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn put(&self, key: impl Into<String>, value: Bytes) {
        let entry = self.entry(value);
        let mut entries = self.entries.write().unwrap();
        entries.insert(key.into(), entry);
        self.evict(&mut entries);
    }

    /// Caches a value loaded from the backing store unless the key was
    /// written meanwhile, and returns whichever value is now cached.
    fn populate(&self, key: &str, loaded: Bytes) -> Bytes {
        let mut entries = self.entries.write().unwrap();
        let value = match entries.get(key) {
            Some(current) => {
                tracing::debug!(key, "key written during load, keeping newer value");
                current.value.clone()
            }
            None => {
                let entry = self.entry(loaded.clone());
                entries.insert(key.to_string(), entry);
                loaded
            }
        };
        self.evict(&mut entries);
        value
    }

    fn entry(&self, value: Bytes) -> Entry {
        Entry {
            value,
            last_access: AtomicU64::new(self.tick()),
        }
    }

    fn evict(&self, entries: &mut HashMap<String, Entry>) {
        let Some(capacity) = self.settings.capacity else {
            return;
        };
        while entries.len() > capacity {
            let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_access.load(Ordering::Relaxed))
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            entries.remove(&oldest);
            tracing::debug!(key = %oldest, "cache entry evicted");
            metrics::counter!("cache_evictions_total").increment(1);
        }
    }

    /// Drops `key` from the cache. Returns true if it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.write().unwrap().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serves `key` from the cache, loading and caching it on a miss.
    #[tracing::instrument(skip(self))]
    pub async fn fetch(&self, key: &str) -> Result<CacheRead, CacheError<B::Error>> {
        if let Some(value) = self.get(key) {
            metrics::counter!("cache_hits_total").increment(1);
            return Ok(CacheRead { value, hit: true });
        }
        metrics::counter!("cache_misses_total").increment(1);

        let limit = self.settings.fetch_timeout;
        let value = match tokio::time::timeout(limit, self.backing.load(key)).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "backing store read failed");
                return Err(CacheError::Store(e));
            }
            Err(_) => {
                tracing::warn!(timeout_ms = limit.as_millis() as u64, "backing store read timed out");
                return Err(CacheError::Timeout(limit));
            }
        };

        let value = self.populate(key, value);
        Ok(CacheRead { value, hit: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, thiserror::Error)]
    #[error("missing: {0}")]
    struct Missing(String);

    #[derive(Default)]
    struct MapStore {
        values: Mutex<HashMap<String, Bytes>>,
        loads: AtomicUsize,
        delay: Option<Duration>,
    }

    impl MapStore {
        fn with(key: &str, value: &'static str) -> Self {
            let store = Self::default();
            store
                .values
                .lock()
                .unwrap()
                .insert(key.to_string(), Bytes::from_static(value.as_bytes()));
            store
        }
    }

    #[async_trait]
    impl BackingStore for MapStore {
        type Error = Missing;

        async fn load(&self, key: &str) -> Result<Bytes, Missing> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let value = self.values.lock().unwrap().get(key).cloned();
            value.ok_or_else(|| Missing(key.to_string()))
        }
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let cache = ReadThroughCache::new(MapStore::with("a.png", "img"), CacheSettings::default());

        let first = cache.fetch("a.png").await.unwrap();
        let second = cache.fetch("a.png").await.unwrap();

        assert!(!first.hit);
        assert!(second.hit);
        assert_eq!(first.value, second.value);
        assert_eq!(cache.backing().loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cache = ReadThroughCache::new(MapStore::default(), CacheSettings::default());

        assert!(matches!(cache.fetch("x").await, Err(CacheError::Store(_))));
        assert!(matches!(cache.fetch("x").await, Err(CacheError::Store(_))));
        assert_eq!(cache.backing().loads.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_times_out() {
        let store = MapStore {
            delay: Some(Duration::from_secs(10)),
            ..MapStore::with("a", "v")
        };
        let settings = CacheSettings {
            fetch_timeout: Duration::from_secs(1),
            ..CacheSettings::default()
        };
        let cache = ReadThroughCache::new(store, settings);

        let result = cache.fetch("a").await;

        assert!(matches!(result, Err(CacheError::Timeout(_))));
        assert!(cache.get("a").is_none());
    }

    #[tokio::test]
    async fn test_put_is_served_without_loading() {
        let cache = ReadThroughCache::new(MapStore::default(), CacheSettings::default());
        cache.put("a", Bytes::from_static(b"fresh"));

        let read = cache.fetch("a").await.unwrap();

        assert!(read.hit);
        assert_eq!(read.value, Bytes::from_static(b"fresh"));
        assert_eq!(cache.backing().loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_during_load_wins_over_loaded_value() {
        let store = MapStore {
            delay: Some(Duration::from_millis(100)),
            ..MapStore::with("a.png", "old")
        };
        let cache = Arc::new(ReadThroughCache::new(store, CacheSettings::default()));

        let reader = tokio::spawn({
            let cache = cache.clone();
            async move { cache.fetch("a.png").await.unwrap() }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.put("a.png", Bytes::from_static(b"new"));

        let read = reader.await.unwrap();

        assert!(!read.hit);
        assert_eq!(read.value, Bytes::from_static(b"new"));
        assert_eq!(cache.get("a.png"), Some(Bytes::from_static(b"new")));
    }

    #[test]
    fn test_lru_eviction() {
        let settings = CacheSettings {
            capacity: Some(2),
            ..CacheSettings::default()
        };
        let cache = ReadThroughCache::new(MapStore::default(), settings);
        cache.put("a", Bytes::from_static(b"1"));
        cache.put("b", Bytes::from_static(b"2"));
        assert!(cache.get("a").is_some());

        cache.put("c", Bytes::from_static(b"3"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_invalidate() {
        let cache = ReadThroughCache::new(MapStore::default(), CacheSettings::default());
        cache.put("a", Bytes::from_static(b"1"));

        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert!(cache.get("a").is_none());
    }
}
