//! Session token storage.
//!
//! Load order is the flat cookie file first, then the JSON session file
//! written by a previous login. Every mutation is persisted to the session
//! file. No expiry is enforced here; the remote tells us when a session is
//! no longer accepted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bilimon_common::Clock;
use bilimon_domain::config::CredentialsConfig;
use bilimon_domain::{BiliMonError, CredentialBag, PersistedSession, Result};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::errors::InfraError;
use crate::storage::{read_json_if_exists, write_json_atomic};

/// Process-wide credential bag shared by every task.
///
/// Reads hand out an immutable snapshot; writers swap the snapshot and
/// persist it while holding the write lock, so file order matches memory
/// order.
pub struct CredentialStore {
    cookie_file: PathBuf,
    session_file: PathBuf,
    clock: Arc<dyn Clock>,
    current: RwLock<Arc<CredentialBag>>,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("cookie_file", &self.cookie_file)
            .field("session_file", &self.session_file)
            .field("tokens", &self.current.read().len())
            .finish_non_exhaustive()
    }
}

impl CredentialStore {
    /// Empty store over the configured files; call [`CredentialStore::load`]
    /// to populate it.
    pub fn new(paths: &CredentialsConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            cookie_file: paths.cookie_file.clone(),
            session_file: paths.session_file.clone(),
            clock,
            current: RwLock::new(Arc::new(CredentialBag::new())),
            write_lock: Mutex::new(()),
        }
    }

    /// Load the bag from disk into memory.
    ///
    /// # Errors
    ///
    /// Returns `BiliMonError::NotAuthenticated` when neither source yields
    /// any token, and `BiliMonError::Io` when the cookie file exists but
    /// cannot be read.
    #[instrument(skip(self), fields(cookie_file = %self.cookie_file.display()))]
    pub async fn load(&self) -> Result<Arc<CredentialBag>> {
        if let Some(bag) = self.load_cookie_file().await? {
            info!(tokens = bag.len(), "loaded credentials from cookie file");
            return Ok(self.replace(bag));
        }

        if let Some(bag) = self.load_session_file().await {
            info!(
                tokens = bag.len(),
                session_file = %self.session_file.display(),
                "loaded credentials from saved session"
            );
            return Ok(self.replace(bag));
        }

        Err(BiliMonError::NotAuthenticated(format!(
            "no tokens in {} or {}",
            self.cookie_file.display(),
            self.session_file.display()
        )))
    }

    async fn load_cookie_file(&self) -> Result<Option<CredentialBag>> {
        let raw = match tokio::fs::read_to_string(&self.cookie_file).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("cookie file not present");
                return Ok(None);
            }
            Err(e) => return Err(InfraError::from(e).into()),
        };

        let bag = CredentialBag::parse_cookie_string(&raw);
        Ok((!bag.is_empty()).then_some(bag))
    }

    /// A corrupt session file is treated as absent so the caller falls
    /// through to login.
    async fn load_session_file(&self) -> Option<CredentialBag> {
        match read_json_if_exists::<PersistedSession>(&self.session_file).await {
            Ok(Some(session)) => {
                let bag = session.into_bag();
                (!bag.is_empty()).then_some(bag)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(
                    session_file = %self.session_file.display(),
                    error = %e,
                    "ignoring unreadable session file"
                );
                None
            }
        }
    }

    /// Replace the bag (after a login) and persist it.
    ///
    /// # Errors
    ///
    /// Returns the persistence error; memory is updated regardless.
    #[instrument(skip(self, bag), fields(tokens = bag.len()))]
    pub async fn persist(&self, bag: CredentialBag) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.replace(bag);
        self.write_session(&snapshot).await
    }

    /// Overwrite or add `tokens` and persist the merged bag.
    ///
    /// # Errors
    ///
    /// Returns the persistence error; memory is updated regardless.
    #[instrument(skip(self, tokens), fields(tokens = tokens.len()))]
    pub async fn merge_tokens(&self, tokens: &CredentialBag) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let merged = {
            let mut next = (**self.current.read()).clone();
            next.merge(tokens);
            next
        };
        let snapshot = self.replace(merged);
        self.write_session(&snapshot).await
    }

    /// Current bag. Cheap; no I/O.
    pub fn snapshot(&self) -> Arc<CredentialBag> {
        Arc::clone(&self.current.read())
    }

    /// `Cookie` header for the current bag, `None` when empty.
    pub fn cookie_header(&self) -> Option<String> {
        let bag = self.snapshot();
        (!bag.is_empty()).then(|| bag.to_cookie_header())
    }

    /// Where sessions are persisted.
    pub fn session_file(&self) -> &Path {
        &self.session_file
    }

    fn replace(&self, bag: CredentialBag) -> Arc<CredentialBag> {
        let bag = Arc::new(bag);
        *self.current.write() = Arc::clone(&bag);
        bag
    }

    async fn write_session(&self, bag: &CredentialBag) -> Result<()> {
        let session = bag.to_persisted(self.clock.unix_seconds());
        write_json_atomic(&self.session_file, &session).await
    }
}
