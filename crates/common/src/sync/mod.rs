//! Async coordination primitives.
//!
//! - [`refresh_gate`]: single-flight guard for refreshing shared state

pub mod refresh_gate;

pub use refresh_gate::{RefreshGate, RefreshOutcome};
