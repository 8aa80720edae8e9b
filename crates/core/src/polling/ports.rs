//! Port interfaces for fetched-record storage

use async_trait::async_trait;
use bilimon_domain::{FetchedRecord, Result};

/// Append-only destination for successful fetches.
///
/// Called exactly once per successful fetch; implementations must not
/// buffer records across calls.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn write(&self, record: &FetchedRecord) -> Result<()>;
}
