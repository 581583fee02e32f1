//! Accommodation domain for the booking platform.
//!
//! This crate provides:
//! - `NewAccommodation`, the payload carried through the creation saga, and its validation
//! - `Accommodation` and `AccommodationGrade` records
//! - the `AccommodationStore` boundary with an in-memory implementation
//! - `AccommodationService` for queries and grading

pub mod error;
pub mod grade;
pub mod memory;
pub mod model;
pub mod service;
pub mod store;

pub use error::{AccommodationError, StoreError, ValidationError};
pub use grade::{AccommodationGrade, NewGrade};
pub use memory::InMemoryAccommodationStore;
pub use model::{Accommodation, NewAccommodation};
pub use service::{AccommodationService, GradeSummary};
pub use store::{AccommodationStore, InsertOutcome, SearchQuery};
