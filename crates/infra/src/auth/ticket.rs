//! Elevated-auth ticket minting.
//!
//! A ticket is requested with an HMAC of the current timestamp and merged
//! into the credential bag under [`TICKET_COOKIE`]. Mints are single-flight:
//! tasks that saw the same rejection share one request.

use std::sync::Arc;

use bilimon_common::{Clock, RefreshGate, RefreshOutcome};
use bilimon_core::ticket_hexsign;
use bilimon_domain::constants::{CODE_OK, TICKET_COOKIE};
use bilimon_domain::CredentialBag;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::bili::BiliApi;

/// Ticket minting failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TicketError {
    /// The endpoint failed or answered with a non-zero code.
    #[error("ticket unavailable: {0}")]
    Unavailable(String),
}

/// Mints `bili_ticket` and merges it into the session, at most one
/// request in flight per generation.
pub struct TicketGenerator {
    api: Arc<BiliApi>,
    clock: Arc<dyn Clock>,
    gate: RefreshGate,
}

impl std::fmt::Debug for TicketGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketGenerator")
            .field("generation", &self.gate.generation())
            .finish_non_exhaustive()
    }
}

impl TicketGenerator {
    /// Generator at generation 0.
    pub fn new(api: Arc<BiliApi>, clock: Arc<dyn Clock>) -> Self {
        Self { api, clock, gate: RefreshGate::new() }
    }

    /// Number of successful mints so far.
    pub fn generation(&self) -> u64 {
        self.gate.generation()
    }

    /// Mint a ticket now.
    ///
    /// # Errors
    ///
    /// [`TicketError::Unavailable`] on transport failure or a non-zero
    /// remote code.
    pub async fn mint(&self) -> Result<String, TicketError> {
        match self.mint_after(self.generation()).await? {
            RefreshOutcome::Refreshed { value, .. } => Ok(value),
            RefreshOutcome::Coalesced { .. } => self
                .api
                .credentials()
                .snapshot()
                .get(TICKET_COOKIE)
                .map(str::to_string)
                .ok_or_else(|| TicketError::Unavailable("no ticket after concurrent mint".into())),
        }
    }

    /// Mint unless another caller already minted since `observed`.
    ///
    /// # Errors
    ///
    /// See [`TicketGenerator::mint`].
    pub async fn mint_after(&self, observed: u64) -> Result<RefreshOutcome<String>, TicketError> {
        self.gate.refresh(observed, || self.request_ticket()).await
    }

    #[instrument(skip(self))]
    async fn request_ticket(&self) -> Result<String, TicketError> {
        let ts = self.clock.unix_seconds();
        let hexsign = ticket_hexsign(ts).map_err(|e| TicketError::Unavailable(e.to_string()))?;
        let csrf = self.api.credentials().snapshot().csrf().unwrap_or_default().to_string();

        let envelope = self
            .api
            .gen_web_ticket(&hexsign, ts, &csrf)
            .await
            .map_err(|e| TicketError::Unavailable(e.to_string()))?;

        if envelope.code != CODE_OK {
            warn!(code = envelope.code, message = %envelope.message, "ticket request rejected");
            return Err(TicketError::Unavailable(format!(
                "remote code {}: {}",
                envelope.code, envelope.message
            )));
        }

        let ticket = envelope
            .data
            .get("ticket")
            .and_then(serde_json::Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TicketError::Unavailable("response carries no ticket".into()))?
            .to_string();

        let tokens = CredentialBag::from_pairs([(TICKET_COOKIE, ticket.as_str())]);
        if let Err(e) = self.api.credentials().merge_tokens(&tokens).await {
            warn!(error = %e, "ticket merged in memory but session file not updated");
        }

        info!("minted elevated ticket");
        Ok(ticket)
    }
}
