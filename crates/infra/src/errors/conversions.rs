//! Conversions from external infrastructure errors into domain errors.

use std::fmt;

use bilimon_domain::{BiliMonError, RemoteFailure};
use reqwest::Error as HttpError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfraError(pub BiliMonError);

impl fmt::Display for InfraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for InfraError {}

impl From<InfraError> for BiliMonError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<BiliMonError> for InfraError {
    fn from(value: BiliMonError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoBiliMonError {
    fn into_bilimon(self) -> BiliMonError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → BiliMonError */
/* -------------------------------------------------------------------------- */

impl IntoBiliMonError for HttpError {
    fn into_bilimon(self) -> BiliMonError {
        if self.is_timeout() {
            return BiliMonError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return BiliMonError::Network("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                401 | 403 => BiliMonError::Auth(message),
                404 => BiliMonError::NotFound(message),
                400..=499 => BiliMonError::InvalidInput(message),
                _ => BiliMonError::Network(message),
            };
        }

        if self.is_decode() {
            return BiliMonError::Serialization(format!("HTTP body decode failed: {self}"));
        }

        BiliMonError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_bilimon())
    }
}

/* -------------------------------------------------------------------------- */
/* std::io::Error → BiliMonError */
/* -------------------------------------------------------------------------- */

impl IntoBiliMonError for std::io::Error {
    fn into_bilimon(self) -> BiliMonError {
        match self.kind() {
            std::io::ErrorKind::NotFound => BiliMonError::NotFound(self.to_string()),
            _ => BiliMonError::Io(self.to_string()),
        }
    }
}

impl From<std::io::Error> for InfraError {
    fn from(value: std::io::Error) -> Self {
        InfraError(value.into_bilimon())
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json / toml → BiliMonError */
/* -------------------------------------------------------------------------- */

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        InfraError(BiliMonError::Serialization(format!("JSON: {value}")))
    }
}

impl From<toml::de::Error> for InfraError {
    fn from(value: toml::de::Error) -> Self {
        InfraError(BiliMonError::Config(format!("Invalid TOML format: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* RemoteFailure → BiliMonError */
/* -------------------------------------------------------------------------- */

impl IntoBiliMonError for RemoteFailure {
    fn into_bilimon(self) -> BiliMonError {
        let message = self.to_string();
        match self {
            Self::AuthDenied | Self::SignatureRejected => BiliMonError::Auth(message),
            Self::NotFound => BiliMonError::NotFound(message),
            Self::Transport { .. } | Self::Unknown { .. } => BiliMonError::Network(message),
            Self::Cancelled => BiliMonError::Internal(message),
        }
    }
}

impl From<RemoteFailure> for InfraError {
    fn from(value: RemoteFailure) -> Self {
        InfraError(value.into_bilimon())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
