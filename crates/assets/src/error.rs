//! Asset store error types.

use thiserror::Error;

/// Errors that can occur in asset store operations.
#[derive(Debug, Error)]
pub enum AssetError {
    /// No asset with this name exists.
    #[error("Asset not found: {0}")]
    NotFound(String),

    /// The name is empty or could escape the store root.
    #[error("Invalid asset name: {0:?}")]
    InvalidName(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The store cannot serve requests right now.
    #[error("Asset store unavailable: {0}")]
    Unavailable(String),
}

impl AssetError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AssetError::NotFound(_))
    }
}

/// Convenience type alias for asset store results.
pub type Result<T> = std::result::Result<T, AssetError>;
