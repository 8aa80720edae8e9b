//! # bilimon Domain
//!
//! Domain types and models for bilimon.
//!
//! This crate contains:
//! - Domain data types (credential bag, signing key pair, tasks, poll
//!   targets, fetched records)
//! - Domain error types and Result definitions
//! - Configuration structures
//! - Domain constants (signing permutation table, TTLs, endpoints)
//!
//! ## Architecture
//! - No dependencies on other bilimon crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
