//! Accommodation grade endpoints.

use std::sync::Arc;

use accommodation::{AccommodationGrade, GradeSummary, NewGrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use common::{AccommodationId, GradeId};

use super::parse_id;
use crate::authority::Principal;
use crate::error::ApiError;
use crate::state::AppState;

/// POST /api/accommodations/accommodationGrade
#[tracing::instrument(skip(state, principal), fields(username = %principal.username))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(grade): Json<NewGrade>,
) -> Result<(StatusCode, Json<AccommodationGrade>), ApiError> {
    let grade = state.accommodations.grade(&principal.username, grade).await?;
    metrics::counter!("accommodation_grades_total").increment(1);
    Ok((StatusCode::CREATED, Json(grade)))
}

/// GET /api/accommodations/accommodationGrades/{id}
pub async fn list(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<GradeSummary>, ApiError> {
    let id: AccommodationId = parse_id(&id, "accommodation")?;
    Ok(Json(state.accommodations.grades(id).await?))
}

/// DELETE /api/accommodations/deleteAccommodationGrade/{id}
#[tracing::instrument(skip(state, principal), fields(username = %principal.username))]
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<AccommodationGrade>, ApiError> {
    let id: GradeId = parse_id(&id, "grade")?;
    Ok(Json(
        state.accommodations.delete_grade(&principal.username, id).await?,
    ))
}
