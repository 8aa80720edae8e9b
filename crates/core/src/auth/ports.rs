//! Port interfaces for interactive login

use async_trait::async_trait;
use bilimon_domain::{CredentialBag, Result};

/// Obtains a fresh credential bag when no stored session exists.
#[async_trait]
pub trait LoginFlow: Send + Sync {
    /// Run the login interaction to completion and make the new bag the
    /// active, persisted session.
    ///
    /// Returns `BiliMonError::Auth` when the user never completes it.
    async fn login(&self) -> Result<CredentialBag>;
}
