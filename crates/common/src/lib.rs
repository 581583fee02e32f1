//! Shared types for the accommodation service crates.

pub mod types;

pub use types::{AccommodationId, GradeId, SagaId};
