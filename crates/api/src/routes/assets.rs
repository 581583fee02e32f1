//! Accommodation image upload and cached download.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderName, StatusCode, header};
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

/// Response header telling whether a read was served from the cache.
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

#[derive(Serialize)]
pub struct StoredResponse {
    pub file_name: String,
    pub size: usize,
}

/// POST /api/accommodations/write/{file_name}: stores the raw body.
///
/// Writes go to the store first and then replace the cached copy.
#[tracing::instrument(skip(state, body), fields(size = body.len()))]
pub async fn write(
    State(state): State<Arc<AppState>>,
    Path(file_name): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<StoredResponse>), ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("Empty upload".to_string()));
    }
    state.assets.write(&file_name, body.clone()).await?;
    let size = body.len();
    state.asset_cache.put(file_name.clone(), body);
    Ok((StatusCode::CREATED, Json(StoredResponse { file_name, size })))
}

#[derive(Debug, Deserialize)]
pub struct CopyRequest {
    /// Existing asset to copy.
    pub source: String,
    /// Name of the new asset.
    pub file_name: String,
}

/// POST /api/accommodations/copy: stores a copy of an existing asset.
#[tracing::instrument(skip(state))]
pub async fn copy(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CopyRequest>,
) -> Result<(StatusCode, Json<StoredResponse>), ApiError> {
    ::assets::validate_name(&request.file_name)?;
    let data = state.assets.read(&request.source).await?;
    let size = data.len();
    state.assets.write(&request.file_name, data.clone()).await?;
    state.asset_cache.put(request.file_name.clone(), data);
    Ok((
        StatusCode::CREATED,
        Json(StoredResponse {
            file_name: request.file_name,
            size,
        }),
    ))
}

/// GET /api/accommodations/read/{file_name}: serves through the cache.
#[tracing::instrument(skip(state))]
pub async fn read(
    State(state): State<Arc<AppState>>,
    Path(file_name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    ::assets::validate_name(&file_name)?;
    let read = state.asset_cache.fetch(&file_name).await?;
    let cache_status = if read.hit { "HIT" } else { "MISS" };
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type(&file_name)),
            (X_CACHE, cache_status),
        ],
        read.value,
    ))
}

fn content_type(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
