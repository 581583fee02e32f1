//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The status of a saga in its lifecycle.
///
/// State transitions:
/// ```text
/// Started ──┬──► AccommodationCreated ──► Completed
///           └──► Compensating ──┬──► Compensated
///                               └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStatus {
    /// The creation command has been published; no reply yet.
    Started,

    /// The participant confirmed the accommodation was persisted.
    AccommodationCreated,

    /// A step failed and compensating actions are running.
    Compensating,

    /// Compensating actions undid every completed step (terminal state).
    Compensated,

    /// The saga failed and nothing could be or was compensated (terminal state).
    Failed,

    /// Every step completed (terminal state).
    Completed,
}

impl SagaStatus {
    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaStatus::Completed | SagaStatus::Compensated | SagaStatus::Failed
        )
    }

    /// Returns true if the saga may move from this status to `next`.
    pub fn can_transition_to(&self, next: SagaStatus) -> bool {
        matches!(
            (self, next),
            (SagaStatus::Started, SagaStatus::AccommodationCreated)
                | (SagaStatus::Started, SagaStatus::Compensating)
                | (SagaStatus::AccommodationCreated, SagaStatus::Completed)
                | (SagaStatus::AccommodationCreated, SagaStatus::Compensating)
                | (SagaStatus::Compensating, SagaStatus::Compensated)
                | (SagaStatus::Compensating, SagaStatus::Failed)
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Started => "STARTED",
            SagaStatus::AccommodationCreated => "ACCOMMODATION_CREATED",
            SagaStatus::Compensating => "COMPENSATING",
            SagaStatus::Compensated => "COMPENSATED",
            SagaStatus::Failed => "FAILED",
            SagaStatus::Completed => "COMPLETED",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SagaStatus; 6] = [
        SagaStatus::Started,
        SagaStatus::AccommodationCreated,
        SagaStatus::Compensating,
        SagaStatus::Compensated,
        SagaStatus::Failed,
        SagaStatus::Completed,
    ];

    #[test]
    fn test_terminal_states() {
        assert!(!SagaStatus::Started.is_terminal());
        assert!(!SagaStatus::AccommodationCreated.is_terminal());
        assert!(!SagaStatus::Compensating.is_terminal());
        assert!(SagaStatus::Compensated.is_terminal());
        assert!(SagaStatus::Failed.is_terminal());
        assert!(SagaStatus::Completed.is_terminal());
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        assert!(SagaStatus::Started.can_transition_to(SagaStatus::AccommodationCreated));
        assert!(SagaStatus::AccommodationCreated.can_transition_to(SagaStatus::Completed));
        assert!(!SagaStatus::Started.can_transition_to(SagaStatus::Completed));
    }

    #[test]
    fn test_failure_transitions() {
        assert!(SagaStatus::Started.can_transition_to(SagaStatus::Compensating));
        assert!(SagaStatus::Compensating.can_transition_to(SagaStatus::Failed));
        assert!(SagaStatus::Compensating.can_transition_to(SagaStatus::Compensated));
        assert!(!SagaStatus::Started.can_transition_to(SagaStatus::Failed));
    }

    #[test]
    fn test_display() {
        assert_eq!(SagaStatus::Started.to_string(), "STARTED");
        assert_eq!(
            SagaStatus::AccommodationCreated.to_string(),
            "ACCOMMODATION_CREATED"
        );
        assert_eq!(SagaStatus::Completed.to_string(), "COMPLETED");
    }

    #[test]
    fn test_serialization_matches_display() {
        for status in ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
        }
    }
}
