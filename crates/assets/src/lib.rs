//! Binary asset storage.
//!
//! Assets are flat, named blobs (accommodation images). Reads on the hot
//! path go through a [`resilience::ReadThroughCache`]; every store here also
//! implements [`resilience::BackingStore`] for that purpose.

pub mod error;
pub mod file;
pub mod memory;
pub mod store;

pub use error::{AssetError, Result};
pub use file::FileAssetStore;
pub use memory::InMemoryAssetStore;
pub use store::{AssetStore, validate_name};
