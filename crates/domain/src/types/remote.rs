//! Classified outcome of one logical remote fetch.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Why a fetch did not produce a payload.
///
/// Closed set: every response is classified into exactly one variant
/// before any recovery decision is made.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum RemoteFailure {
    /// Remote code -403; the session needs an elevated ticket.
    #[error("authentication denied by remote")]
    AuthDenied,

    /// Remote code -352; the WBI signature was not accepted.
    #[error("request signature rejected by remote")]
    SignatureRejected,

    #[error("remote resource not found")]
    NotFound,

    /// Connection failure, timeout, or an undecodable body.
    #[error("transport failure: {detail}")]
    Transport { detail: String },

    #[error("remote error {code}: {message}")]
    Unknown { code: i64, message: String },

    /// Shutdown was requested before the request was issued.
    #[error("fetch cancelled before the request was issued")]
    Cancelled,
}

impl RemoteFailure {
    /// Transport failure with a human-readable detail.
    pub fn transport(detail: impl Into<String>) -> Self {
        Self::Transport { detail: detail.into() }
    }

    /// Short label for structured log fields.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::AuthDenied => "auth_denied",
            Self::SignatureRejected => "signature_rejected",
            Self::NotFound => "not_found",
            Self::Transport { .. } => "transport",
            Self::Unknown { .. } => "unknown",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Successful payload (the full response body) or a classified failure.
pub type RemoteResult = std::result::Result<Value, RemoteFailure>;

/// Standard `{code, message, data}` response wrapper used by every
/// platform endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Envelope {
    /// `0` on success.
    pub code: i64,
    #[serde(default, alias = "msg")]
    pub message: String,
    #[serde(default)]
    pub data: Value,
}
