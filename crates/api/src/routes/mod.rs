//! HTTP route handlers.

pub mod accommodations;
pub mod assets;
pub mod grades;
pub mod health;
pub mod metrics;
pub mod sagas;

use crate::error::ApiError;

/// Parses a typed UUID path segment.
pub(crate) fn parse_id<T>(raw: &str, what: &str) -> Result<T, ApiError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {what} id: {e}")))
}
