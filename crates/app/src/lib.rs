//! # bilimon App
//!
//! Binary layer - wiring and process lifecycle.
//!
//! This crate contains:
//! - Application context (dependency injection)
//! - The JSON-lines record sink
//! - Logging setup
//!
//! ## Architecture
//! - Depends on `domain`, `core`, and `infra`
//! - Owns startup: config, credentials or login, scheduler

pub mod context;
pub mod sink;
pub mod utils;

// Re-export for convenience
pub use context::AppContext;
pub use sink::JsonLinesSink;
