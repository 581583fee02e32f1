//! Accommodation grades left by guests.

use chrono::{DateTime, Utc};
use common::{AccommodationId, GradeId};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A guest's grade request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGrade {
    pub accommodation_id: AccommodationId,
    pub grade: u8,
}

impl NewGrade {
    pub fn new(accommodation_id: AccommodationId, grade: u8) -> Self {
        Self {
            accommodation_id,
            grade,
        }
    }

    /// Grades run from 1 to 5 inclusive.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if (1..=5).contains(&self.grade) {
            Ok(())
        } else {
            Err(ValidationError::InvalidGrade(self.grade))
        }
    }
}

/// A stored grade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccommodationGrade {
    pub id: GradeId,
    pub accommodation_id: AccommodationId,
    pub username: String,
    pub grade: u8,
    pub created_at: DateTime<Utc>,
}

impl AccommodationGrade {
    pub fn from_new(new: NewGrade, username: impl Into<String>) -> Self {
        Self {
            id: GradeId::new(),
            accommodation_id: new.accommodation_id,
            username: username.into(),
            grade: new.grade,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_bounds() {
        let id = AccommodationId::new();
        assert!(NewGrade::new(id, 1).validate().is_ok());
        assert!(NewGrade::new(id, 5).validate().is_ok());
        assert_eq!(
            NewGrade::new(id, 0).validate(),
            Err(ValidationError::InvalidGrade(0))
        );
        assert_eq!(
            NewGrade::new(id, 6).validate(),
            Err(ValidationError::InvalidGrade(6))
        );
    }
}
