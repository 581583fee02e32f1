//! API error types with HTTP response mapping.

use accommodation::{AccommodationError, StoreError};
use assets::AssetError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::SagaId;
use resilience::{BreakerError, CacheError};
use saga::{ErrorDescriptor, SagaError};
use thiserror::Error;

use crate::authority::AuthorityError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Missing or rejected credentials.
    Unauthorized(String),
    /// The caller may not perform this operation.
    Forbidden(String),
    /// The creation saga ended with a failure outcome.
    SagaFailed {
        saga_id: SagaId,
        error: ErrorDescriptor,
    },
    /// The saga outcome could not be confirmed in time.
    SagaPending { saga_id: SagaId },
    /// A dependency is unavailable or shielded by an open breaker.
    DependencyUnavailable(String),
    /// A dependency answered with an error.
    BadGateway(String),
    /// A dependency did not answer in time.
    GatewayTimeout(String),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, error_body(msg)),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, error_body(msg)),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, error_body(msg)),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, error_body(msg)),
            ApiError::SagaFailed { saga_id, error } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::json!({
                    "error": error.message,
                    "code": error.code,
                    "saga_id": saga_id,
                }),
            ),
            ApiError::SagaPending { saga_id } => (
                StatusCode::GATEWAY_TIMEOUT,
                serde_json::json!({
                    "error": "accommodation creation could not be confirmed in time",
                    "saga_id": saga_id,
                }),
            ),
            ApiError::DependencyUnavailable(msg) => {
                tracing::warn!(error = %msg, "dependency unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, error_body(msg))
            }
            ApiError::BadGateway(msg) => {
                tracing::warn!(error = %msg, "dependency error");
                (StatusCode::BAD_GATEWAY, error_body(msg))
            }
            ApiError::GatewayTimeout(msg) => (StatusCode::GATEWAY_TIMEOUT, error_body(msg)),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, error_body(msg))
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

fn error_body(message: String) -> serde_json::Value {
    serde_json::json!({ "error": message })
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) | StoreError::GradeNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            StoreError::Unavailable(_) => ApiError::DependencyUnavailable(err.to_string()),
        }
    }
}

impl From<AccommodationError> for ApiError {
    fn from(err: AccommodationError) -> Self {
        match err {
            AccommodationError::Validation(e) => ApiError::BadRequest(e.to_string()),
            AccommodationError::Store(e) => e.into(),
            AccommodationError::NotGradeOwner { .. } => ApiError::Forbidden(err.to_string()),
        }
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        match err {
            SagaError::WaitTimeout(saga_id) | SagaError::Timeout { saga_id, .. } => {
                ApiError::SagaPending { saga_id }
            }
            SagaError::NotFound(_) => ApiError::NotFound(err.to_string()),
            SagaError::ShuttingDown | SagaError::Transport(_) => {
                ApiError::DependencyUnavailable(err.to_string())
            }
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<BreakerError<AuthorityError>> for ApiError {
    fn from(err: BreakerError<AuthorityError>) -> Self {
        match err {
            BreakerError::Rejected(AuthorityError::Unauthorized(_)) => {
                ApiError::Unauthorized("invalid or expired token".to_string())
            }
            BreakerError::Rejected(e) => ApiError::Forbidden(e.to_string()),
            BreakerError::Open { .. } | BreakerError::ProbeInFlight { .. } => {
                ApiError::DependencyUnavailable(format!("authorization unavailable: {err}"))
            }
            BreakerError::Timeout(_) | BreakerError::Failed(_) => {
                ApiError::DependencyUnavailable(format!("authorization failed: {err}"))
            }
        }
    }
}

impl From<AssetError> for ApiError {
    fn from(err: AssetError) -> Self {
        match err {
            AssetError::NotFound(_) => ApiError::NotFound(err.to_string()),
            AssetError::InvalidName(_) => ApiError::BadRequest(err.to_string()),
            AssetError::Io(_) | AssetError::Unavailable(_) => ApiError::BadGateway(err.to_string()),
        }
    }
}

impl From<CacheError<AssetError>> for ApiError {
    fn from(err: CacheError<AssetError>) -> Self {
        match err {
            CacheError::Store(e) => e.into(),
            CacheError::Timeout(_) => ApiError::GatewayTimeout(err.to_string()),
        }
    }
}

/// Errors raised while wiring the application together.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Saga wiring failed: {0}")]
    Saga(#[from] SagaError),

    #[error("Asset store setup failed: {0}")]
    Assets(#[from] AssetError),
}
