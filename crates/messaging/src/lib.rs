//! Message channel abstraction for saga commands and replies.
//!
//! Components never talk to a transport directly. They publish [`Envelope`]s
//! to a subject and subscribe handlers to a subject within a queue group:
//!
//! - delivery is at-least-once, so handlers must be idempotent
//! - ordering across subjects is not guaranteed
//! - among subscribers sharing a queue group on one subject, exactly one
//!   receives each message; each distinct queue group receives its own copy
//! - publish failures are reported to the caller, the channel never retries

pub mod channel;
pub mod envelope;
pub mod error;
pub mod memory;

pub use channel::{MessageChannel, MessageHandler, Subscription, handler_fn};
pub use envelope::Envelope;
pub use error::{Result, TransportError};
pub use memory::InMemoryChannel;
