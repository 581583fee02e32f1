//! Accommodation creation, queries and host cleanup endpoints.

use std::sync::Arc;

use accommodation::{Accommodation, NewAccommodation, SearchQuery};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::NaiveDate;
use common::AccommodationId;
use saga::SagaError;
use serde::Serialize;

use super::parse_id;
use crate::authority::Principal;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct DeletedResponse {
    pub username: String,
    pub deleted: usize,
}

/// POST /api/accommodations/create: runs the creation saga and waits for it.
///
/// The listing is owned by the authenticated host regardless of the body.
#[tracing::instrument(skip(state, principal, payload), fields(username = %principal.username))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<NewAccommodation>,
) -> Result<(StatusCode, Json<Accommodation>), ApiError> {
    let payload = payload.hosted_by(principal.username);
    let saga_id = state.orchestrator.start(payload).await?;

    let saga = state.orchestrator.wait(saga_id, state.create_wait).await?;
    match saga.result() {
        Ok(accommodation) => Ok((StatusCode::CREATED, Json(accommodation))),
        Err(SagaError::StepFailed { error, .. }) => Err(ApiError::SagaFailed { saga_id, error }),
        Err(e) => Err(e.into()),
    }
}

/// GET /api/accommodations/
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Accommodation>>, ApiError> {
    Ok(Json(state.accommodations.list().await?))
}

/// GET /api/accommodations/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Accommodation>, ApiError> {
    let id: AccommodationId = parse_id(&id, "accommodation")?;
    state
        .accommodations
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Accommodation not found: {id}")))
}

/// GET /api/accommodations/myAccommodations/{username}
pub async fn by_username(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<Json<Vec<Accommodation>>, ApiError> {
    Ok(Json(state.accommodations.list_by_username(&username).await?))
}

/// GET /api/accommodations/search_by_location/{location}
pub async fn search_by_location(
    State(state): State<Arc<AppState>>,
    Path(location): Path<String>,
) -> Result<Json<Vec<Accommodation>>, ApiError> {
    let query = SearchQuery::by_location(location);
    Ok(Json(state.accommodations.search(&query).await?))
}

/// GET /api/accommodations/search_by_noGuests/{no_guests}
pub async fn search_by_guests(
    State(state): State<Arc<AppState>>,
    Path(no_guests): Path<String>,
) -> Result<Json<Vec<Accommodation>>, ApiError> {
    let guests: u32 = no_guests
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid number of guests: {no_guests}")))?;
    let query = SearchQuery::by_guests(guests);
    Ok(Json(state.accommodations.search(&query).await?))
}

/// GET /api/accommodations/search_by_date/{start}/{end}
pub async fn search_by_date(
    State(state): State<Arc<AppState>>,
    Path((start, end)): Path<(String, String)>,
) -> Result<Json<Vec<Accommodation>>, ApiError> {
    let start = parse_date(&start)?;
    let end = parse_date(&end)?;
    if end < start {
        return Err(ApiError::BadRequest(
            "End date must not precede start date".to_string(),
        ));
    }
    let query = SearchQuery::by_dates(start, end);
    Ok(Json(state.accommodations.search(&query).await?))
}

/// POST /api/accommodations/recommendations: resolves recommended ids.
pub async fn recommendations(
    State(state): State<Arc<AppState>>,
    Json(ids): Json<Vec<String>>,
) -> Result<Json<Vec<Accommodation>>, ApiError> {
    let ids = ids
        .iter()
        .map(|raw| parse_id::<AccommodationId>(raw, "accommodation"))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(state.accommodations.recommended(&ids).await?))
}

/// DELETE /api/accommodations/delete/{username}: removes a host's listings.
#[tracing::instrument(skip(state, principal))]
pub async fn delete_by_username(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(username): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    if principal.username != username {
        return Err(ApiError::Forbidden(
            "Hosts may only delete their own listings".to_string(),
        ));
    }
    let deleted = state.accommodations.delete_by_username(&username).await?;
    Ok(Json(DeletedResponse { username, deleted }))
}

fn parse_date(raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| ApiError::BadRequest(format!("Invalid date {raw:?}: {e}")))
}
