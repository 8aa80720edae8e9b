//! Domain types and models

pub mod credentials;
pub mod keys;
pub mod record;
pub mod remote;
pub mod target;
pub mod task;
pub mod timestamp;

pub use credentials::{CookiePair, CredentialBag, PersistedSession};
pub use keys::SignedKeyPair;
pub use record::FetchedRecord;
pub use remote::{Envelope, RemoteFailure, RemoteResult};
pub use target::{PollRequest, PollTarget};
pub use task::{IntervalUnit, Task};
