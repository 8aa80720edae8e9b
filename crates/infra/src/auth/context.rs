//! Owned bundle of the shared authentication state.
//!
//! One instance is built at startup and handed to every task's fetcher by
//! `Arc`. It is the only mutable state tasks share.

use std::sync::Arc;

use bilimon_common::Clock;
use bilimon_core::WbiSigner;
use bilimon_domain::{Config, Result};

use crate::auth::{CredentialStore, KeySource, NavKeySource, SignedKeyCache, TicketGenerator};
use crate::bili::{BiliApi, BiliApiConfig};

/// Cheaply cloneable handle to the API client and every piece of shared
/// auth state.
#[derive(Clone)]
pub struct SharedAuthContext {
    api: Arc<BiliApi>,
    keys: Arc<SignedKeyCache>,
    tickets: Arc<TicketGenerator>,
    signer: WbiSigner,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SharedAuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedAuthContext")
            .field("keys", &self.keys)
            .field("tickets", &self.tickets)
            .finish_non_exhaustive()
    }
}

impl SharedAuthContext {
    /// Wire the production graph from configuration. Credentials are not
    /// loaded; call `credentials().load()` before starting tasks.
    ///
    /// # Errors
    ///
    /// Returns `BiliMonError::Config` when the HTTP client cannot be built.
    pub fn from_config(config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let credentials = Arc::new(CredentialStore::new(&config.credentials, Arc::clone(&clock)));
        let api = Arc::new(BiliApi::new(BiliApiConfig::from(&config.http), credentials)?);
        let tickets = Arc::new(TicketGenerator::new(Arc::clone(&api), Arc::clone(&clock)));
        let source: Arc<dyn KeySource> = Arc::new(NavKeySource::new(
            Arc::clone(&api),
            Arc::clone(&tickets),
            Arc::clone(&clock),
        ));
        let keys = Arc::new(SignedKeyCache::new(
            source,
            Arc::clone(&clock),
            config.credentials.key_cache_file.clone(),
        ));
        Ok(Self::new(api, keys, tickets, clock))
    }

    /// Assemble from already-built parts.
    pub fn new(
        api: Arc<BiliApi>,
        keys: Arc<SignedKeyCache>,
        tickets: Arc<TicketGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let signer = WbiSigner::new(Arc::clone(&clock));
        Self { api, keys, tickets, signer, clock }
    }

    /// Platform API client.
    pub const fn api(&self) -> &Arc<BiliApi> {
        &self.api
    }

    /// Credential store the API client reads cookies from.
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        self.api.credentials()
    }

    /// Signing-key cache.
    pub const fn keys(&self) -> &Arc<SignedKeyCache> {
        &self.keys
    }

    /// Ticket generator.
    pub const fn tickets(&self) -> &Arc<TicketGenerator> {
        &self.tickets
    }

    /// Request signer on the shared clock.
    pub const fn signer(&self) -> &WbiSigner {
        &self.signer
    }

    /// Shared clock.
    pub const fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}
