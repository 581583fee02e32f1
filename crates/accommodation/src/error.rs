//! Accommodation error types.

use chrono::NaiveDate;
use common::{AccommodationId, GradeId};
use thiserror::Error;

/// Reasons an accommodation or grade payload is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The accommodation name is empty or whitespace.
    #[error("Accommodation name must not be empty")]
    EmptyName,

    /// A text field exceeds its maximum length.
    #[error("Field '{field}' exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },

    /// Guest bounds are zero or inverted.
    #[error("Invalid guest range: min {min}, max {max}")]
    InvalidGuestRange { min: u32, max: u32 },

    /// The availability window ends before it starts.
    #[error("Availability window ends ({to}) before it starts ({from})")]
    InvalidAvailability { from: NaiveDate, to: NaiveDate },

    /// An amenity entry is blank.
    #[error("Amenities must not contain blank entries")]
    BlankAmenity,

    /// A grade is outside 1..=5.
    #[error("Grade must be between 1 and 5, got {0}")]
    InvalidGrade(u8),
}

/// Errors raised by an accommodation store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No accommodation with this id exists.
    #[error("Accommodation not found: {0}")]
    NotFound(AccommodationId),

    /// No grade with this id exists.
    #[error("Grade not found: {0}")]
    GradeNotFound(GradeId),

    /// The backing storage could not serve the request.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors from accommodation service operations.
#[derive(Debug, Error)]
pub enum AccommodationError {
    /// The request payload is invalid.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The store rejected or failed the operation.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Only the author of a grade may delete it.
    #[error("Grade {grade_id} belongs to another user")]
    NotGradeOwner { grade_id: GradeId },
}
