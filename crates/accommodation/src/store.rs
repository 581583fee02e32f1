//! Storage boundary for accommodation records.

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{AccommodationId, GradeId, SagaId};

use crate::error::StoreError;
use crate::grade::AccommodationGrade;
use crate::model::{Accommodation, NewAccommodation};

/// Outcome of an insert keyed by saga id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new record was written.
    Inserted(Accommodation),
    /// The saga had already created this record; nothing was written.
    Existing(Accommodation),
}

impl InsertOutcome {
    /// Returns the record regardless of whether it was just written.
    pub fn accommodation(&self) -> &Accommodation {
        match self {
            InsertOutcome::Inserted(a) | InsertOutcome::Existing(a) => a,
        }
    }

    pub fn into_accommodation(self) -> Accommodation {
        match self {
            InsertOutcome::Inserted(a) | InsertOutcome::Existing(a) => a,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted(_))
    }
}

/// Filter for accommodation searches. Unset criteria match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub location: Option<String>,
    pub guests: Option<u32>,
    pub dates: Option<(NaiveDate, NaiveDate)>,
}

impl SearchQuery {
    pub fn by_location(location: impl Into<String>) -> Self {
        Self {
            location: Some(location.into()),
            ..Self::default()
        }
    }

    pub fn by_guests(guests: u32) -> Self {
        Self {
            guests: Some(guests),
            ..Self::default()
        }
    }

    pub fn by_dates(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            dates: Some((start, end)),
            ..Self::default()
        }
    }

    pub fn matches(&self, accommodation: &Accommodation) -> bool {
        if let Some(ref location) = self.location
            && !accommodation.matches_location(location)
        {
            return false;
        }
        if let Some(guests) = self.guests
            && !accommodation.accepts_guests(guests)
        {
            return false;
        }
        if let Some((start, end)) = self.dates
            && !accommodation.is_available_between(start, end)
        {
            return false;
        }
        true
    }
}

/// Persistent storage for accommodations and their grades.
///
/// Listing methods return records ordered by creation time.
#[async_trait]
pub trait AccommodationStore: Send + Sync {
    /// Inserts the record created by `saga_id` unless that saga already created one.
    ///
    /// Must be atomic with respect to concurrent calls for the same saga id.
    async fn insert_for_saga(
        &self,
        saga_id: SagaId,
        new: NewAccommodation,
    ) -> Result<InsertOutcome, StoreError>;

    /// Returns the record created by `saga_id`, if any.
    async fn find_by_saga(&self, saga_id: SagaId) -> Result<Option<Accommodation>, StoreError>;

    async fn get(&self, id: AccommodationId) -> Result<Option<Accommodation>, StoreError>;

    /// Returns the records among `ids` that exist, in the order given.
    async fn get_many(&self, ids: &[AccommodationId]) -> Result<Vec<Accommodation>, StoreError>;

    async fn list(&self) -> Result<Vec<Accommodation>, StoreError>;

    async fn list_by_username(&self, username: &str) -> Result<Vec<Accommodation>, StoreError>;

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Accommodation>, StoreError>;

    /// Removes one record and its grades. Returns false if it did not exist.
    async fn delete(&self, id: AccommodationId) -> Result<bool, StoreError>;

    /// Removes every record owned by `username`. Returns the number removed.
    async fn delete_by_username(&self, username: &str) -> Result<usize, StoreError>;

    /// Stores a grade. Fails with `NotFound` if the accommodation does not exist.
    async fn insert_grade(&self, grade: AccommodationGrade) -> Result<(), StoreError>;

    async fn grades_for(&self, id: AccommodationId) -> Result<Vec<AccommodationGrade>, StoreError>;

    async fn get_grade(&self, id: GradeId) -> Result<Option<AccommodationGrade>, StoreError>;

    /// Removes a grade, returning it. Fails with `GradeNotFound` if absent.
    async fn delete_grade(&self, id: GradeId) -> Result<AccommodationGrade, StoreError>;
}
