//! Accommodation records and the creation payload.

use chrono::{DateTime, NaiveDate, Utc};
use common::{AccommodationId, SagaId};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

const MAX_NAME_LEN: usize = 100;
const MAX_LOCATION_LEN: usize = 200;

fn one() -> u32 {
    1
}

/// Attributes of an accommodation to be created.
///
/// This is the saga payload: it travels with the command so the
/// participant needs no state between steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccommodation {
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default = "one")]
    pub min_guests: u32,
    #[serde(default = "one")]
    pub max_guests: u32,
    /// Nightly price in cents.
    #[serde(default)]
    pub price_per_night: Option<u64>,
    #[serde(default)]
    pub available_from: Option<NaiveDate>,
    #[serde(default)]
    pub available_to: Option<NaiveDate>,
    /// Host that owns the listing.
    #[serde(default)]
    pub username: String,
}

impl NewAccommodation {
    /// Creates a payload with only a name; everything else takes defaults.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: String::new(),
            amenities: Vec::new(),
            min_guests: 1,
            max_guests: 1,
            price_per_night: None,
            available_from: None,
            available_to: None,
            username: String::new(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_guests(mut self, min: u32, max: u32) -> Self {
        self.min_guests = min;
        self.max_guests = max;
        self
    }

    pub fn with_availability(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.available_from = Some(from);
        self.available_to = Some(to);
        self
    }

    pub fn with_amenities<I, A>(mut self, amenities: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.amenities = amenities.into_iter().map(Into::into).collect();
        self
    }

    pub fn hosted_by(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Checks the payload against the listing rules.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(ValidationError::TooLong {
                field: "name",
                max: MAX_NAME_LEN,
            });
        }
        if self.location.chars().count() > MAX_LOCATION_LEN {
            return Err(ValidationError::TooLong {
                field: "location",
                max: MAX_LOCATION_LEN,
            });
        }
        if self.min_guests == 0 || self.max_guests < self.min_guests {
            return Err(ValidationError::InvalidGuestRange {
                min: self.min_guests,
                max: self.max_guests,
            });
        }
        if let (Some(from), Some(to)) = (self.available_from, self.available_to)
            && to < from
        {
            return Err(ValidationError::InvalidAvailability { from, to });
        }
        if self.amenities.iter().any(|a| a.trim().is_empty()) {
            return Err(ValidationError::BlankAmenity);
        }
        Ok(())
    }
}

/// A persisted accommodation listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accommodation {
    pub id: AccommodationId,
    /// Saga that created this record; unique across records.
    pub saga_id: Option<SagaId>,
    pub name: String,
    pub location: String,
    pub amenities: Vec<String>,
    pub min_guests: u32,
    pub max_guests: u32,
    pub price_per_night: Option<u64>,
    pub available_from: Option<NaiveDate>,
    pub available_to: Option<NaiveDate>,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl Accommodation {
    /// Builds a record from a validated payload.
    pub fn from_new(new: NewAccommodation, saga_id: Option<SagaId>) -> Self {
        Self {
            id: AccommodationId::new(),
            saga_id,
            name: new.name.trim().to_string(),
            location: new.location,
            amenities: new.amenities,
            min_guests: new.min_guests,
            max_guests: new.max_guests,
            price_per_night: new.price_per_night,
            available_from: new.available_from,
            available_to: new.available_to,
            username: new.username,
            created_at: Utc::now(),
        }
    }

    /// Returns true if the location contains `query`, ignoring case.
    pub fn matches_location(&self, query: &str) -> bool {
        self.location
            .to_lowercase()
            .contains(&query.trim().to_lowercase())
    }

    /// Returns true if a party of `guests` fits.
    pub fn accepts_guests(&self, guests: u32) -> bool {
        (self.min_guests..=self.max_guests).contains(&guests)
    }

    /// Returns true if the stay `[start, end]` falls inside the availability window.
    ///
    /// Open bounds are unrestricted.
    pub fn is_available_between(&self, start: NaiveDate, end: NaiveDate) -> bool {
        if end < start {
            return false;
        }
        let from_ok = self.available_from.is_none_or(|from| from <= start);
        let to_ok = self.available_to.is_none_or(|to| end <= to);
        from_ok && to_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_named_payload_is_valid() {
        assert!(NewAccommodation::named("Cabin").validate().is_ok());
    }

    #[test]
    fn test_blank_name_rejected() {
        assert_eq!(
            NewAccommodation::named("   ").validate(),
            Err(ValidationError::EmptyName)
        );
    }

    #[test]
    fn test_long_name_rejected() {
        let result = NewAccommodation::named("x".repeat(101)).validate();
        assert!(matches!(
            result,
            Err(ValidationError::TooLong { field: "name", .. })
        ));
    }

    #[test]
    fn test_guest_range_rules() {
        assert!(NewAccommodation::named("A").with_guests(0, 2).validate().is_err());
        assert!(NewAccommodation::named("A").with_guests(3, 2).validate().is_err());
        assert!(NewAccommodation::named("A").with_guests(2, 6).validate().is_ok());
    }

    #[test]
    fn test_inverted_availability_rejected() {
        let result = NewAccommodation::named("A")
            .with_availability(date(2025, 6, 10), date(2025, 6, 1))
            .validate();
        assert!(matches!(
            result,
            Err(ValidationError::InvalidAvailability { .. })
        ));
    }

    #[test]
    fn test_blank_amenity_rejected() {
        let result = NewAccommodation::named("A")
            .with_amenities(["wifi", " "])
            .validate();
        assert_eq!(result, Err(ValidationError::BlankAmenity));
    }

    #[test]
    fn test_missing_fields_take_defaults_when_deserialized() {
        let new: NewAccommodation = serde_json::from_str(r#"{"name":"Cabin"}"#).unwrap();
        assert_eq!(new, NewAccommodation::named("Cabin"));
    }

    #[test]
    fn test_query_helpers() {
        let acc = Accommodation::from_new(
            NewAccommodation::named(" Cabin ")
                .with_location("Novi Sad, Serbia")
                .with_guests(2, 4)
                .with_availability(date(2025, 6, 1), date(2025, 6, 30)),
            None,
        );

        assert_eq!(acc.name, "Cabin");
        assert!(acc.matches_location("novi sad"));
        assert!(!acc.matches_location("Belgrade"));
        assert!(acc.accepts_guests(3));
        assert!(!acc.accepts_guests(5));
        assert!(acc.is_available_between(date(2025, 6, 5), date(2025, 6, 10)));
        assert!(!acc.is_available_between(date(2025, 5, 30), date(2025, 6, 2)));
        assert!(!acc.is_available_between(date(2025, 6, 10), date(2025, 6, 5)));
    }

    #[test]
    fn test_open_window_is_always_available() {
        let acc = Accommodation::from_new(NewAccommodation::named("A"), None);
        assert!(acc.is_available_between(date(2030, 1, 1), date(2030, 1, 5)));
    }
}
