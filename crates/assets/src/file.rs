//! Filesystem-backed asset store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use resilience::BackingStore;
use uuid::Uuid;

use crate::error::{AssetError, Result};
use crate::store::{AssetStore, validate_name};

/// Stores each asset as one file under a root directory.
#[derive(Debug, Clone)]
pub struct FileAssetStore {
    root: PathBuf,
}

impl FileAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        Ok(self.root.join(validate_name(name)?))
    }
}

#[async_trait]
impl AssetStore for FileAssetStore {
    #[tracing::instrument(skip(self))]
    async fn read(&self, name: &str) -> Result<Bytes> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => {
                metrics::counter!("asset_reads_total").increment(1);
                Ok(Bytes::from(data))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AssetError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip(self, data), fields(size = data.len()))]
    async fn write(&self, name: &str, data: Bytes) -> Result<()> {
        let path = self.path_for(name)?;
        // Each write stages its own sibling and renames it into place, so
        // readers never see a partial file and concurrent writers never share one.
        let staging = self.root.join(format!(".{}.partial", Uuid::new_v4()));
        let staged = match tokio::fs::write(&staging, &data).await {
            Ok(()) => tokio::fs::rename(&staging, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = staged {
            if let Err(cleanup) = tokio::fs::remove_file(&staging).await
                && cleanup.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!(staging = %staging.display(), error = %cleanup, "staging file left behind");
            }
            return Err(e.into());
        }
        metrics::counter!("asset_writes_total").increment(1);
        tracing::info!("asset stored");
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.path_for(name)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str()
                && validate_name(name).is_ok()
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn create_directories(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        tracing::debug!(root = %self.root.display(), "asset directories ready");
        Ok(())
    }
}

#[async_trait]
impl BackingStore for FileAssetStore {
    type Error = AssetError;

    async fn load(&self, key: &str) -> Result<Bytes> {
        self.read(key).await
    }
}
