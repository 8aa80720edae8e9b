//! Shared authentication state: session tokens, signing keys, tickets.

pub mod context;
pub mod credential_store;
pub mod key_cache;
pub mod ticket;

pub use context::SharedAuthContext;
pub use credential_store::CredentialStore;
pub use key_cache::{KeyCacheError, KeyHandle, KeySource, NavKeySource, SignedKeyCache};
pub use ticket::{TicketError, TicketGenerator};
