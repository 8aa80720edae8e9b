//! Application context - dependency injection container

use std::sync::Arc;

use bilimon_common::{Clock, SystemClock};
use bilimon_core::{LoginFlow, RecordSink};
use bilimon_domain::{BiliMonError, Config, CredentialBag, Result};
use bilimon_infra::config::resolve_tasks;
use bilimon_infra::{
    PollExecutor, RetryableFetcher, SharedAuthContext, TaskScheduler, TaskSchedulerConfig,
};
use tracing::{info, warn};

use crate::sink::JsonLinesSink;

/// Application context - holds the shared auth state and the sink every
/// task writes to.
pub struct AppContext {
    /// Loaded configuration.
    pub config: Config,
    /// Shared credentials, keys and tickets.
    pub auth: Arc<SharedAuthContext>,
    /// Where fetched records go.
    pub sink: Arc<JsonLinesSink>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("auth", &self.auth)
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    /// Wire the production graph on the system clock.
    ///
    /// # Errors
    ///
    /// Returns `BiliMonError::Config` when the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// # Errors
    ///
    /// See [`AppContext::new`].
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let auth = Arc::new(SharedAuthContext::from_config(&config, Arc::clone(&clock))?);
        let sink = Arc::new(JsonLinesSink::new(config.sink.output_dir.clone()));
        Ok(Self { config, auth, sink, clock })
    }

    /// Load stored credentials, falling back to `login` when there are
    /// none.
    ///
    /// # Errors
    ///
    /// Propagates credential I/O errors and login failures.
    pub async fn ensure_authenticated(&self, login: &dyn LoginFlow) -> Result<Arc<CredentialBag>> {
        match self.auth.credentials().load().await {
            Ok(bag) => Ok(bag),
            Err(BiliMonError::NotAuthenticated(reason)) => {
                warn!(%reason, "no stored session, starting interactive login");
                login.login().await?;
                let bag = self.auth.credentials().snapshot();
                info!(tokens = bag.len(), "session established");
                Ok(bag)
            }
            Err(e) => Err(e),
        }
    }

    /// Scheduler over the configured tasks, not yet started.
    ///
    /// # Errors
    ///
    /// Returns `BiliMonError::InvalidInput` when two tasks share an id.
    pub fn build_scheduler(&self) -> Result<TaskScheduler> {
        let tasks = resolve_tasks(&self.config);
        let fetcher = RetryableFetcher::new(Arc::clone(&self.auth));
        let sink: Arc<dyn RecordSink> = Arc::clone(&self.sink) as Arc<dyn RecordSink>;
        let executor = Arc::new(PollExecutor::new(fetcher, sink, Arc::clone(&self.clock)));

        let scheduler =
            TaskScheduler::new(TaskSchedulerConfig::from(&self.config.scheduler), tasks, executor)?;
        Ok(scheduler)
    }
}
