//! In-memory asset store.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use resilience::BackingStore;
use tokio::sync::RwLock;

use crate::error::{AssetError, Result};
use crate::store::{AssetStore, validate_name};

/// In-memory asset store for tests and development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAssetStore {
    assets: Arc<RwLock<BTreeMap<String, Bytes>>>,
    fail_on_read: Arc<AtomicBool>,
    reads: Arc<AtomicUsize>,
}

impl InMemoryAssetStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes reads fail with `AssetError::Unavailable` while set.
    pub fn set_fail_on_read(&self, fail: bool) {
        self.fail_on_read.store(fail, Ordering::SeqCst);
    }

    /// Number of reads that reached this store.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn read(&self, name: &str) -> Result<Bytes> {
        validate_name(name)?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_read.load(Ordering::SeqCst) {
            return Err(AssetError::Unavailable(
                "simulated read failure".to_string(),
            ));
        }
        self.assets
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(name.to_string()))
    }

    async fn write(&self, name: &str, data: Bytes) -> Result<()> {
        validate_name(name)?;
        self.assets.write().await.insert(name.to_string(), data);
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        Ok(self.assets.read().await.contains_key(name))
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.assets.read().await.keys().cloned().collect())
    }

    async fn create_directories(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl BackingStore for InMemoryAssetStore {
    type Error = AssetError;

    async fn load(&self, key: &str) -> Result<Bytes> {
        self.read(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resilience::{CacheError, CacheSettings, ReadThroughCache};

    #[tokio::test]
    async fn test_write_read_list() {
        let store = InMemoryAssetStore::new();
        store.write("b.png", Bytes::from_static(b"2")).await.unwrap();
        store.write("a.png", Bytes::from_static(b"1")).await.unwrap();

        assert_eq!(store.read("a.png").await.unwrap(), Bytes::from_static(b"1"));
        assert_eq!(
            store.list().await.unwrap(),
            vec!["a.png".to_string(), "b.png".to_string()]
        );
    }

    #[tokio::test]
    async fn test_cache_reads_through_once() {
        let store = InMemoryAssetStore::new();
        store.write("a.png", Bytes::from_static(b"1")).await.unwrap();
        let cache = ReadThroughCache::new(store.clone(), CacheSettings::default());

        assert!(!cache.fetch("a.png").await.unwrap().hit);
        assert!(cache.fetch("a.png").await.unwrap().hit);
        assert_eq!(store.reads(), 1);
    }

    #[tokio::test]
    async fn test_cache_reports_store_errors() {
        let store = InMemoryAssetStore::new();
        let cache = ReadThroughCache::new(store.clone(), CacheSettings::default());

        let missing = cache.fetch("a.png").await;
        assert!(matches!(missing, Err(CacheError::Store(AssetError::NotFound(_)))));

        store.write("a.png", Bytes::from_static(b"1")).await.unwrap();
        store.set_fail_on_read(true);
        let failing = cache.fetch("a.png").await;
        assert!(matches!(failing, Err(CacheError::Store(AssetError::Unavailable(_)))));
    }
}
