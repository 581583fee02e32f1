//! Transport error types.

use thiserror::Error;

/// Errors reported by a message channel.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The channel has been closed and accepts no more traffic.
    #[error("Message channel is closed")]
    Closed,

    /// A message could not be published.
    #[error("Failed to publish on '{subject}': {reason}")]
    Publish { subject: String, reason: String },
}

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, TransportError>;
