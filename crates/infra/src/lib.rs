//! # bilimon Infrastructure
//!
//! Infrastructure implementations of core domain ports.
//!
//! This crate contains:
//! - HTTP client and the platform API client
//! - Credential, signing-key and ticket state shared by all tasks
//! - The retrying fetcher and QR login flow
//! - The per-task scheduler and the polling executor
//! - Configuration loading
//!
//! ## Architecture
//! - Implements traits defined in `bilimon-core`
//! - Depends on `bilimon-common`, `bilimon-domain` and `bilimon-core`
//! - Contains all "impure" code (network, filesystem, runtime)

pub mod auth;
pub mod bili;
pub mod config;
pub mod errors;
pub mod http;
pub mod scheduling;
pub mod storage;

// Re-export commonly used items
pub use auth::{CredentialStore, KeyCacheError, SharedAuthContext, SignedKeyCache, TicketGenerator};
pub use bili::{BiliApi, BiliApiConfig, QrLoginFlow, RetryableFetcher};
pub use errors::InfraError;
pub use scheduling::{PollExecutor, TaskExecutor, TaskScheduler, TaskSchedulerConfig};
