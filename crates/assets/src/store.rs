//! Asset store trait.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{AssetError, Result};

const MAX_NAME_LEN: usize = 255;

/// Named blob storage.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Reads the asset stored under `name`.
    async fn read(&self, name: &str) -> Result<Bytes>;

    /// Stores `data` under `name`, replacing any previous content.
    async fn write(&self, name: &str, data: Bytes) -> Result<()>;

    async fn exists(&self, name: &str) -> Result<bool>;

    /// Returns every asset name in lexical order.
    async fn list(&self) -> Result<Vec<String>>;

    /// Prepares the storage layout. Safe to call repeatedly.
    async fn create_directories(&self) -> Result<()>;
}

/// Checks that `name` is a single, non-hidden path segment.
pub fn validate_name(name: &str) -> Result<&str> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
        && name.trim() == name;
    if valid {
        Ok(name)
    } else {
        Err(AssetError::InvalidName(name.to_string()))
    }
}
