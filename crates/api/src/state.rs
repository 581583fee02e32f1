//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use accommodation::AccommodationService;
use assets::{AssetError, AssetStore};
use resilience::{BackingStore, ReadThroughCache};
use saga::SagaOrchestrator;

use crate::auth::AuthGuard;

/// Read-through cache over the asset store.
pub type AssetCache = ReadThroughCache<Arc<dyn BackingStore<Error = AssetError>>>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub accommodations: AccommodationService,
    pub orchestrator: SagaOrchestrator,
    pub auth: AuthGuard,
    pub assets: Arc<dyn AssetStore>,
    pub asset_cache: AssetCache,
    /// How long a create request waits for the saga outcome.
    pub create_wait: Duration,
}
