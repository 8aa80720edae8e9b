//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for bilimon
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum BiliMonError {
    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),

    /// Transport failure or non-success HTTP status.
    #[error("Network error: {0}")]
    Network(String),

    /// Login or credential refresh failed.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Neither the cookie file nor the persisted session yielded tokens.
    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),

    /// The remote reported the resource as missing.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A bug or a panicked task execution.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for bilimon operations
pub type Result<T> = std::result::Result<T, BiliMonError>;
