//! Modular common utilities shared across bilimon crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - (always): time abstraction ([`time::Clock`], [`time::SystemClock`])
//!   and async coordination ([`sync::RefreshGate`])
//! - `test-utils`: deterministic test doubles ([`testing::MockClock`])

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod time;

pub mod sync;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "test-utils", test))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
pub use sync::{RefreshGate, RefreshOutcome};
pub use time::{Clock, SystemClock};
