//! Executor that fetches a task's target and hands the payload to a sink.

use std::sync::Arc;

use async_trait::async_trait;
use bilimon_common::Clock;
use bilimon_core::RecordSink;
use bilimon_domain::{FetchedRecord, RemoteFailure, Task};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::bili::RetryableFetcher;
use crate::errors::InfraError;
use crate::scheduling::TaskExecutor;

/// Executor that fetches a task's target and records the payload.
pub struct PollExecutor {
    fetcher: RetryableFetcher,
    sink: Arc<dyn RecordSink>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PollExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollExecutor").field("fetcher", &self.fetcher).finish_non_exhaustive()
    }
}

impl PollExecutor {
    /// Executor writing successful fetches to `sink`, stamped by `clock`.
    pub fn new(
        fetcher: RetryableFetcher,
        sink: Arc<dyn RecordSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { fetcher, sink, clock }
    }
}

#[async_trait]
impl TaskExecutor for PollExecutor {
    /// One fetch, and one sink write when it succeeds.
    #[instrument(skip(self, task, cancel), fields(task_id = %task.id))]
    async fn run(&self, task: &Task, cancel: &CancellationToken) -> Result<(), InfraError> {
        let request = task.target.request();
        let payload = match self.fetcher.fetch(&request, cancel).await {
            Ok(payload) => payload,
            Err(RemoteFailure::Cancelled) => return Ok(()),
            Err(failure) => return Err(failure.into()),
        };

        let fetched_at = DateTime::<Utc>::from(self.clock.system_time());
        let record = FetchedRecord::new(task.id.clone(), fetched_at, payload);
        self.sink.write(&record).await?;

        debug!(%fetched_at, "record written");
        Ok(())
    }
}
