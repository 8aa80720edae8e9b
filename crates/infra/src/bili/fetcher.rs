//! One logical GET with classified, bounded recovery.
//!
//! Each response is classified once. A failure with a row in
//! [`bilimon_core::RECOVERY_TABLE`] gets its recovery at most once per
//! fetch; everything else is surfaced as is. Transport failures are never
//! retried here, the scheduler's backoff covers them.

use std::collections::BTreeMap;
use std::sync::Arc;

use bilimon_core::{classify_response, encode_query, recovery_for, RecoveryAction};
use bilimon_domain::constants::MAX_LOGGED_BODY_BYTES;
use bilimon_domain::{PollRequest, RemoteFailure, RemoteResult, SignedKeyPair};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::auth::SharedAuthContext;

/// Issues platform GETs through the shared auth state, applying
/// [`RECOVERY_TABLE`](bilimon_core::RECOVERY_TABLE) recoveries.
#[derive(Debug, Clone)]
pub struct RetryableFetcher {
    auth: Arc<SharedAuthContext>,
}

impl RetryableFetcher {
    /// Fetcher over the shared auth state.
    pub const fn new(auth: Arc<SharedAuthContext>) -> Self {
        Self { auth }
    }

    /// Fetch `request`, returning the full response body on success.
    ///
    /// Signed requests whose keys cannot be obtained are sent unsigned;
    /// a resulting signature rejection then goes through the normal key
    /// refresh.
    ///
    /// # Errors
    ///
    /// The classified [`RemoteFailure`] once no recovery applies, or
    /// [`RemoteFailure::Cancelled`] when `cancel` fires before a request
    /// or a recovery call is issued.
    #[instrument(
        skip(self, request, cancel),
        fields(endpoint = %request.endpoint, signed = request.signed)
    )]
    pub async fn fetch(&self, request: &PollRequest, cancel: &CancellationToken) -> RemoteResult {
        let mut key_generation = None;
        let mut query = if request.signed {
            match self.auth.keys().get(false).await {
                Ok(handle) => {
                    key_generation = Some(handle.generation);
                    self.signed_query(&request.params, &handle.keys)
                        .unwrap_or_else(|| encode_query(&request.params))
                }
                Err(e) => {
                    warn!(error = %e, "sending signed request without signature");
                    encode_query(&request.params)
                }
            }
        } else {
            encode_query(&request.params)
        };

        let ticket_generation = self.auth.tickets().generation();
        let mut attempted: Vec<RecoveryAction> = Vec::with_capacity(2);
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                debug!(attempt, "fetch cancelled");
                return Err(RemoteFailure::Cancelled);
            }
            attempt += 1;

            let failure = match self.issue(&request.endpoint, &query, attempt).await {
                Ok(payload) => return Ok(payload),
                Err(failure) => failure,
            };

            let Some(action) = recovery_for(&failure) else {
                return Err(failure);
            };
            if attempted.contains(&action) {
                warn!(attempt, class = failure.label(), ?action, "recovery already spent");
                return Err(failure);
            }
            attempted.push(action);

            if cancel.is_cancelled() {
                debug!(attempt, ?action, "fetch cancelled before recovery");
                return Err(RemoteFailure::Cancelled);
            }

            match action {
                RecoveryAction::MintTicket => {
                    if let Err(e) = self.auth.tickets().mint_after(ticket_generation).await {
                        warn!(error = %e, "ticket mint failed");
                        return Err(failure);
                    }
                }
                RecoveryAction::RefreshKeys => {
                    if !request.signed {
                        return Err(failure);
                    }
                    let observed =
                        key_generation.unwrap_or_else(|| self.auth.keys().generation());
                    let handle = match self.auth.keys().force_refresh(observed).await {
                        Ok(handle) => handle,
                        Err(e) => {
                            warn!(error = %e, "key refresh failed");
                            return Err(failure);
                        }
                    };
                    key_generation = Some(handle.generation);
                    match self.signed_query(&request.params, &handle.keys) {
                        Some(signed) => query = signed,
                        None => return Err(failure),
                    }
                }
            }

            info!(attempt, class = failure.label(), ?action, "retrying after recovery");
        }
    }

    async fn issue(&self, endpoint: &str, query: &str, attempt: u32) -> RemoteResult {
        let response = match self.auth.api().get(endpoint, query).await {
            Ok(response) => response,
            Err(e) => {
                let failure = RemoteFailure::transport(e.to_string());
                warn!(attempt, class = failure.label(), error = %e, "request failed");
                return Err(failure);
            }
        };

        let result = classify_response(response.status, &response.body);
        match &result {
            Ok(_) => debug!(attempt, status = response.status, "fetch succeeded"),
            Err(failure) => warn!(
                attempt,
                status = response.status,
                class = failure.label(),
                %failure,
                body = truncate_body(&response.body),
                "remote call failed"
            ),
        }
        result
    }

    fn signed_query(
        &self,
        params: &BTreeMap<String, String>,
        keys: &SignedKeyPair,
    ) -> Option<String> {
        match self.auth.signer().sign(params, keys) {
            Ok(signed) => Some(signed.to_query_string()),
            Err(e) => {
                warn!(error = %e, "could not sign request");
                None
            }
        }
    }
}

fn truncate_body(body: &str) -> &str {
    if body.len() <= MAX_LOGGED_BODY_BYTES {
        return body;
    }
    let mut end = MAX_LOGGED_BODY_BYTES;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
