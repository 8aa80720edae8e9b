//! Single-flight refresh guard.
//!
//! Many tasks can observe the same stale value (an expired signing key, a
//! rejected ticket) at the same moment. Each of them calls
//! [`RefreshGate::refresh`] with the generation it observed; the first one
//! through the lock runs the refresh and bumps the generation, every later
//! caller that observed the old generation returns
//! [`RefreshOutcome::Coalesced`] and re-reads the shared value instead of
//! hitting the network again.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

/// Result of a call to [`RefreshGate::refresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome<T> {
    /// This caller ran the refresh.
    Refreshed {
        /// Value produced by the refresh closure.
        value: T,
        /// Generation after the refresh.
        generation: u64,
    },
    /// Another caller refreshed after `observed`; the shared value is
    /// already newer than what this caller saw.
    Coalesced {
        /// Current generation.
        generation: u64,
    },
}

impl<T> RefreshOutcome<T> {
    /// Generation the shared value is at after this call.
    pub const fn generation(&self) -> u64 {
        match self {
            Self::Refreshed { generation, .. } | Self::Coalesced { generation } => *generation,
        }
    }

    /// `true` when this caller performed the refresh itself.
    pub const fn is_refreshed(&self) -> bool {
        matches!(self, Self::Refreshed { .. })
    }
}

/// Generation-counted single-flight lock.
#[derive(Debug, Default)]
pub struct RefreshGate {
    generation: AtomicU64,
    lock: Mutex<()>,
}

impl RefreshGate {
    /// Create a gate at generation 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation. Starts at 0 and increases by one per
    /// successful refresh.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Run `refresh` unless someone else already refreshed since
    /// `observed`.
    ///
    /// The generation is only bumped when `refresh` succeeds, so a failed
    /// attempt lets the next waiter try again.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `refresh`.
    pub async fn refresh<F, Fut, T, E>(&self, observed: u64, refresh: F) -> Result<RefreshOutcome<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _guard = self.lock.lock().await;

        let current = self.generation.load(Ordering::Acquire);
        if current != observed {
            return Ok(RefreshOutcome::Coalesced { generation: current });
        }

        let value = refresh().await?;
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        Ok(RefreshOutcome::Refreshed { value, generation })
    }
}
