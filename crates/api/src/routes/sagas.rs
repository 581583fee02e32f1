//! Saga status endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::SagaId;
use saga::{ErrorDescriptor, SagaInstance, SagaStatus};
use serde::Serialize;

use super::parse_id;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct SagaStatusResponse {
    pub saga_id: SagaId,
    pub saga_type: String,
    pub status: SagaStatus,
    pub attempt: u32,
    pub completed_steps: Vec<String>,
    pub accommodation_id: Option<String>,
    pub failure: Option<ErrorDescriptor>,
    pub history: Vec<SagaStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SagaInstance> for SagaStatusResponse {
    fn from(saga: SagaInstance) -> Self {
        Self {
            saga_id: saga.id(),
            saga_type: saga.saga_type().to_string(),
            status: saga.status(),
            attempt: saga.attempt(),
            completed_steps: saga.completed_steps().to_vec(),
            accommodation_id: saga.accommodation().map(|a| a.id.to_string()),
            failure: saga.failure().cloned(),
            history: saga.history().to_vec(),
            created_at: saga.created_at(),
            updated_at: saga.updated_at(),
        }
    }
}

/// GET /api/accommodations/sagas/{id}
#[tracing::instrument(skip(state))]
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SagaStatusResponse>, ApiError> {
    let saga_id: SagaId = parse_id(&id, "saga")?;
    let saga = state
        .orchestrator
        .status(saga_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Saga not found: {saga_id}")))?;
    Ok(Json(saga.into()))
}
