//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub auth_breaker: &'static str,
    pub sagas_in_flight: usize,
}

/// GET /health: returns system health status.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        auth_breaker: state.auth.breaker().state().as_str(),
        sagas_in_flight: state.orchestrator.in_flight(),
    })
}
