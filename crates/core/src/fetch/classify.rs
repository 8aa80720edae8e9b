//! Response classification and recovery dispatch.
//!
//! Every response is reduced to one [`RemoteFailure`] (or success) exactly
//! once; what to do about a failure is looked up in [`RECOVERY_TABLE`].
//! Adding a recoverable code means adding a row there.

use bilimon_domain::constants::{
    CODE_AUTH_DENIED, CODE_NOT_FOUND, CODE_NOT_FOUND_NEG, CODE_OK, CODE_SIGNATURE_REJECTED,
};
use bilimon_domain::{Envelope, RemoteFailure, RemoteResult};
use serde::Deserialize;
use serde_json::Value;

/// Fieldless view of [`RemoteFailure`] used as the recovery table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    AuthDenied,
    SignatureRejected,
    NotFound,
    Transport,
    Unknown,
    Cancelled,
}

impl From<&RemoteFailure> for FailureClass {
    fn from(failure: &RemoteFailure) -> Self {
        match failure {
            RemoteFailure::AuthDenied => Self::AuthDenied,
            RemoteFailure::SignatureRejected => Self::SignatureRejected,
            RemoteFailure::NotFound => Self::NotFound,
            RemoteFailure::Transport { .. } => Self::Transport,
            RemoteFailure::Unknown { .. } => Self::Unknown,
            RemoteFailure::Cancelled => Self::Cancelled,
        }
    }
}

/// Local recovery the fetcher may attempt once per logical fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecoveryAction {
    /// Mint an elevated ticket, then re-issue the same request.
    MintTicket,
    /// Force-refresh the signing keys, re-sign, then re-issue.
    RefreshKeys,
}

/// Failure classes with a local recovery. Anything absent is surfaced
/// immediately.
pub const RECOVERY_TABLE: &[(FailureClass, RecoveryAction)] = &[
    (FailureClass::AuthDenied, RecoveryAction::MintTicket),
    (FailureClass::SignatureRejected, RecoveryAction::RefreshKeys),
];

/// Recovery registered for `failure`, if any.
pub fn recovery_for(failure: &RemoteFailure) -> Option<RecoveryAction> {
    let class = FailureClass::from(failure);
    RECOVERY_TABLE.iter().find(|(key, _)| *key == class).map(|(_, action)| *action)
}

/// Classify an embedded status code.
///
/// # Errors
///
/// Every non-zero code maps to a [`RemoteFailure`].
pub fn classify_code(code: i64, message: &str) -> Result<(), RemoteFailure> {
    match code {
        CODE_OK => Ok(()),
        CODE_AUTH_DENIED => Err(RemoteFailure::AuthDenied),
        CODE_SIGNATURE_REJECTED => Err(RemoteFailure::SignatureRejected),
        CODE_NOT_FOUND | CODE_NOT_FOUND_NEG => Err(RemoteFailure::NotFound),
        other => Err(RemoteFailure::Unknown { code: other, message: message.to_string() }),
    }
}

/// Classify a complete HTTP response.
///
/// HTTP 404 wins over the body. Otherwise the embedded `code` decides; a
/// body that is not a `{code, ...}` envelope is a transport failure. On
/// success the full decoded body is returned unchanged.
///
/// # Errors
///
/// Returns the classified failure.
pub fn classify_response(http_status: u16, body: &str) -> RemoteResult {
    if http_status == 404 {
        return Err(RemoteFailure::NotFound);
    }

    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) if (200..300).contains(&http_status) => {
            return Err(RemoteFailure::transport(format!("undecodable body: {e}")));
        }
        Err(_) => return Err(RemoteFailure::transport(format!("HTTP {http_status}"))),
    };

    let envelope = Envelope::deserialize(&value).map_err(|e| {
        RemoteFailure::transport(format!("HTTP {http_status}, body is not an envelope: {e}"))
    })?;

    classify_code(envelope.code, &envelope.message)?;
    Ok(value)
}
