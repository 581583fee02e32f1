//! Resilience primitives for calls that leave the process.
//!
//! - [`CircuitBreaker`] stops calling a dependency that keeps failing and
//!   lets a single probe through once a cool-down has passed.
//! - [`ReadThroughCache`] serves byte values from memory and falls back to a
//!   [`BackingStore`] on a miss.
//!
//! Both are plain values: construct them once and share them by `Arc`.

pub mod breaker;
pub mod cache;
pub mod error;

pub use breaker::{BreakerSettings, BreakerState, CircuitBreaker, Classify, FailureClass};
pub use cache::{BackingStore, CacheRead, CacheSettings, ReadThroughCache};
pub use error::{BreakerError, CacheError};
