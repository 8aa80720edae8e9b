//! # bilimon Core
//!
//! Pure logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - WBI request signing and ticket digest computation
//! - Response classification and the recovery table the fetcher
//!   dispatches on
//! - Port interfaces (traits) for the record sink and login flow
//!
//! ## Architecture Principles
//! - Only depends on `bilimon-common` and `bilimon-domain`
//! - No HTTP, filesystem, or runtime code
//! - Deterministic given a [`bilimon_common::Clock`]

pub mod auth;
pub mod fetch;
pub mod polling;
pub mod signing;

pub use auth::ports::LoginFlow;
pub use fetch::classify::{
    classify_code, classify_response, recovery_for, FailureClass, RecoveryAction, RECOVERY_TABLE,
};
pub use polling::ports::RecordSink;
pub use signing::ticket::ticket_hexsign;
pub use signing::wbi::{
    encode_query, mixin_key, sanitize_value, SignError, SignedParams, WbiSigner,
};
