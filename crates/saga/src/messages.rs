//! Command and reply payloads exchanged by the create-accommodation saga.

use accommodation::{Accommodation, NewAccommodation, ValidationError};
use serde::{Deserialize, Serialize};

/// Error code for payloads rejected by validation.
pub const CODE_VALIDATION_FAILED: &str = "validation_failed";

/// Error code for commands that could not be decoded.
pub const CODE_MALFORMED_COMMAND: &str = "malformed_command";

/// Error code for store faults in the participant.
pub const CODE_STORAGE_UNAVAILABLE: &str = "storage_unavailable";

/// Error code recorded when the retry budget is exhausted.
pub const CODE_TIMEOUT: &str = "timeout";

/// Error code for success replies that carry no record.
pub const CODE_MALFORMED_REPLY: &str = "malformed_reply";

/// Command asking the participant to persist an accommodation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccommodationCommand {
    pub payload: NewAccommodation,
}

/// Machine-readable failure reason carried by replies and failed sagas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub code: String,
    pub message: String,
}

impl ErrorDescriptor {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn validation(error: &ValidationError) -> Self {
        Self::new(CODE_VALIDATION_FAILED, error.to_string())
    }

    pub fn malformed(reason: impl std::fmt::Display) -> Self {
        Self::new(CODE_MALFORMED_COMMAND, reason.to_string())
    }

    pub fn storage(reason: impl std::fmt::Display) -> Self {
        Self::new(CODE_STORAGE_UNAVAILABLE, reason.to_string())
    }

    pub fn timeout(attempts: u32) -> Self {
        Self::new(
            CODE_TIMEOUT,
            format!("no reply after {attempts} attempt(s)"),
        )
    }

    /// Returns true if this descriptor records an exhausted retry budget.
    pub fn is_timeout(&self) -> bool {
        self.code == CODE_TIMEOUT
    }
}

impl std::fmt::Display for ErrorDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Outcome reported by a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplyOutcome {
    Success,
    Failure { error: ErrorDescriptor },
}

impl ReplyOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ReplyOutcome::Success)
    }
}

/// Reply to a [`CreateAccommodationCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccommodationReply {
    pub outcome: ReplyOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accommodation: Option<Accommodation>,
}

impl CreateAccommodationReply {
    pub fn success(accommodation: Accommodation) -> Self {
        Self {
            outcome: ReplyOutcome::Success,
            accommodation: Some(accommodation),
        }
    }

    pub fn failure(error: ErrorDescriptor) -> Self {
        Self {
            outcome: ReplyOutcome::Failure { error },
            accommodation: None,
        }
    }
}
