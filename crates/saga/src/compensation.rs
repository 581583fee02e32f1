//! Compensating actions for completed saga steps.

use std::sync::Arc;

use accommodation::AccommodationStore;
use async_trait::async_trait;

use crate::error::{Result, SagaError};
use crate::instance::SagaInstance;

/// Undoes one completed step of a failed saga.
///
/// The orchestrator runs compensations for completed steps in reverse
/// order while the saga is `Compensating`. Implementations must be
/// idempotent: a compensation can run again after a crash or a retry.
#[async_trait]
pub trait Compensation: Send + Sync {
    async fn compensate(&self, saga: &SagaInstance) -> Result<()>;
}

/// Deletes the accommodation a saga created.
pub struct RemoveCreatedAccommodation {
    store: Arc<dyn AccommodationStore>,
}

impl RemoveCreatedAccommodation {
    pub fn new(store: Arc<dyn AccommodationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Compensation for RemoveCreatedAccommodation {
    #[tracing::instrument(skip(self, saga), fields(saga_id = %saga.id()))]
    async fn compensate(&self, saga: &SagaInstance) -> Result<()> {
        let created = match saga.accommodation() {
            Some(accommodation) => Some(accommodation.id),
            None => self.store.find_by_saga(saga.id()).await?.map(|a| a.id),
        };
        let Some(id) = created else {
            tracing::debug!("nothing to remove");
            return Ok(());
        };
        self.store
            .delete(id)
            .await
            .map_err(|e| SagaError::CompensationFailed {
                step: crate::create_accommodation::STEP_CREATE_ACCOMMODATION.to_string(),
                reason: e.to_string(),
            })?;
        tracing::info!(accommodation_id = %id, "created accommodation removed");
        Ok(())
    }
}
