//! Independent periodic workers, one per task.
//!
//! Each worker owns its task's `next_due` and loops
//! `Idle -> Due -> Running -> Idle` until the scheduler is stopped:
//!
//! - idle sleeps are capped at the tick so a stop is observed within one
//!   tick even for hour-long intervals
//! - after an execution `next_due = completion + interval`; an overrun
//!   never produces a burst of catch-up runs
//! - a failed execution adds a fixed backoff on top; a panicking
//!   execution counts as failed
//! - disabled tasks stay due and are re-checked every tick
//!
//! Workers share nothing but the executor, so a slow or failing task never
//! delays another one.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use async_trait::async_trait;
//! use bilimon_domain::{PollTarget, Task};
//! use bilimon_infra::errors::InfraError;
//! use bilimon_infra::scheduling::{
//!     SchedulerResult, TaskExecutor, TaskScheduler, TaskSchedulerConfig,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! struct NoopExecutor;
//!
//! #[async_trait]
//! impl TaskExecutor for NoopExecutor {
//!     async fn run(&self, _task: &Task, _cancel: &CancellationToken) -> Result<(), InfraError> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> SchedulerResult<()> {
//! let task = Task::new("fans", Duration::from_secs(60), PollTarget::FollowerStat { mid: 2 });
//! let mut scheduler =
//!     TaskScheduler::new(TaskSchedulerConfig::default(), vec![task], Arc::new(NoopExecutor))?;
//!
//! scheduler.start()?;
//! // ... application runs ...
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bilimon_domain::config::SchedulerConfig;
use bilimon_domain::{BiliMonError, Task};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::errors::InfraError;
use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Work performed on each due tick of a task.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Execute `task` once. `cancel` fires when the scheduler is stopping.
    async fn run(&self, task: &Task, cancel: &CancellationToken) -> Result<(), InfraError>;
}

/// Configuration for the task scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSchedulerConfig {
    /// Upper bound on a single idle sleep.
    pub tick: Duration,
    /// Extra delay after a failed execution.
    pub failure_backoff: Duration,
    /// How long `stop` waits for in-flight executions.
    pub shutdown_grace: Duration,
}

impl Default for TaskSchedulerConfig {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for TaskSchedulerConfig {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            tick: Duration::from_millis(config.tick_millis.max(1)),
            failure_backoff: Duration::from_secs(config.failure_backoff_secs),
            shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
        }
    }
}

/// Task scheduler with explicit lifecycle management.
pub struct TaskScheduler {
    config: TaskSchedulerConfig,
    tasks: Vec<Task>,
    enabled: HashMap<String, Arc<AtomicBool>>,
    executor: Arc<dyn TaskExecutor>,
    handles: Vec<JoinHandle<()>>,
    cancellation: CancellationToken,
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("config", &self.config)
            .field("tasks", &self.tasks.len())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl TaskScheduler {
    /// Register `tasks`; nothing runs until [`TaskScheduler::start`].
    ///
    /// # Errors
    ///
    /// [`SchedulerError::DuplicateTask`] when two tasks share an id.
    pub fn new(
        config: TaskSchedulerConfig,
        tasks: Vec<Task>,
        executor: Arc<dyn TaskExecutor>,
    ) -> SchedulerResult<Self> {
        let mut enabled = HashMap::with_capacity(tasks.len());
        for task in &tasks {
            if enabled.insert(task.id.clone(), Arc::new(AtomicBool::new(task.enabled))).is_some() {
                return Err(SchedulerError::DuplicateTask(task.id.clone()));
            }
        }

        Ok(Self {
            config,
            tasks,
            enabled,
            executor,
            handles: Vec::new(),
            cancellation: CancellationToken::new(),
        })
    }

    /// Spawn one worker per task, disabled ones included.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::AlreadyRunning`] when called twice without `stop`.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.cancellation = CancellationToken::new();

        for task in &self.tasks {
            let enabled = self
                .enabled
                .get(&task.id)
                .map(Arc::clone)
                .ok_or_else(|| SchedulerError::UnknownTask(task.id.clone()))?;
            let worker = Worker {
                task: task.clone(),
                enabled,
                executor: Arc::clone(&self.executor),
                tick: self.config.tick,
                failure_backoff: self.config.failure_backoff,
                cancel: self.cancellation.clone(),
            };
            self.handles.push(tokio::spawn(worker.run()));
        }

        info!(tasks = self.tasks.len(), "Task scheduler started");
        Ok(())
    }

    /// Signal every worker and wait up to the grace period for in-flight
    /// executions. Workers still busy after that are left to finish on
    /// their own.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NotRunning`] when not started.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation.cancel();

        let deadline = Instant::now() + self.config.shutdown_grace;
        let mut lingering = 0usize;
        for mut handle in self.handles.drain(..) {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "task worker ended abnormally"),
                Err(_) => lingering += 1,
            }
        }

        if lingering > 0 {
            warn!(
                lingering,
                grace_secs = self.config.shutdown_grace.as_secs_f64(),
                "shutdown grace elapsed with executions in flight"
            );
        }

        info!("Task scheduler stopped");
        Ok(())
    }

    /// `true` between `start` and `stop`.
    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    /// Enable or disable a task without removing it.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownTask`] when no task has this id.
    pub fn set_enabled(&self, task_id: &str, enabled: bool) -> SchedulerResult<()> {
        let flag = self
            .enabled
            .get(task_id)
            .ok_or_else(|| SchedulerError::UnknownTask(task_id.to_string()))?;
        flag.store(enabled, Ordering::Release);
        info!(task_id, enabled, "task toggled");
        Ok(())
    }

    /// Current enabled flag, `None` for an unknown id.
    pub fn is_enabled(&self, task_id: &str) -> Option<bool> {
        self.enabled.get(task_id).map(|flag| flag.load(Ordering::Acquire))
    }

    /// Registered task ids in configuration order.
    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|task| task.id.as_str())
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

struct Worker {
    task: Task,
    enabled: Arc<AtomicBool>,
    executor: Arc<dyn TaskExecutor>,
    tick: Duration,
    failure_backoff: Duration,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) {
        let task_id = self.task.id.as_str();
        let mut next_due = if self.task.start_now {
            Instant::now()
        } else {
            due_after(Instant::now(), self.task.interval)
        };
        debug!(task_id, interval_secs = self.task.interval.as_secs_f64(), "worker started");

        loop {
            let now = Instant::now();
            let due = now >= next_due;
            if !due || !self.enabled.load(Ordering::Acquire) {
                let wake = if due { now + self.tick } else { next_due.min(now + self.tick) };
                tokio::select! {
                    () = self.cancel.cancelled() => break,
                    () = tokio::time::sleep_until(wake) => continue,
                }
            }

            if self.cancel.is_cancelled() {
                break;
            }

            let started = Instant::now();
            let outcome = self.execute_once().await;
            let completed = Instant::now();
            let elapsed_ms = completed.duration_since(started).as_millis();

            next_due = due_after(completed, self.task.interval);
            match outcome {
                Ok(()) => debug!(task_id, elapsed_ms, "task execution finished"),
                Err(e) => {
                    next_due = due_after(next_due, self.failure_backoff);
                    warn!(task_id, elapsed_ms, error = %e, "task execution failed");
                }
            }
        }

        debug!(task_id, "worker stopped");
    }

    /// Run the executor on its own task so a panic counts as a failed
    /// execution instead of ending the worker.
    async fn execute_once(&self) -> Result<(), InfraError> {
        let executor = Arc::clone(&self.executor);
        let task = self.task.clone();
        let cancel = self.cancel.clone();
        match tokio::spawn(async move { executor.run(&task, &cancel).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                Err(BiliMonError::Internal(format!("task execution panicked: {e}")).into())
            }
        }
    }
}

/// `base + delay`, clamped to a far-future instant when the sum does not
/// fit.
fn due_after(base: Instant, delay: Duration) -> Instant {
    base.checked_add(delay).unwrap_or_else(|| base + FAR_FUTURE)
}

// roughly 30 years
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use bilimon_domain::PollTarget;

    use super::*;

    struct Counting {
        runs: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl TaskExecutor for Counting {
        async fn run(&self, _task: &Task, _cancel: &CancellationToken) -> Result<(), InfraError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(BiliMonError::Network("down".into()).into())
            } else {
                Ok(())
            }
        }
    }

    fn task(id: &str, secs: u64) -> Task {
        Task::new(id, Duration::from_secs(secs), PollTarget::FollowerStat { mid: 1 })
    }

    fn config() -> TaskSchedulerConfig {
        TaskSchedulerConfig {
            tick: Duration::from_secs(1),
            failure_backoff: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(5),
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let executor = Arc::new(Counting { runs: AtomicUsize::new(0), fail: false });
        let err =
            TaskScheduler::new(config(), vec![task("a", 1), task("a", 2)], executor).unwrap_err();
        assert_eq!(err, SchedulerError::DuplicateTask("a".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle_errors() {
        let executor = Arc::new(Counting { runs: AtomicUsize::new(0), fail: false });
        let mut scheduler = TaskScheduler::new(config(), vec![task("a", 5)], executor).unwrap();

        assert_eq!(scheduler.stop().await, Err(SchedulerError::NotRunning));
        scheduler.start().unwrap();
        assert_eq!(scheduler.start(), Err(SchedulerError::AlreadyRunning));
        assert_eq!(
            scheduler.set_enabled("missing", false),
            Err(SchedulerError::UnknownTask("missing".into()))
        );
        scheduler.stop().await.unwrap();
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn first_run_waits_one_interval_unless_start_now() {
        let executor = Arc::new(Counting { runs: AtomicUsize::new(0), fail: false });
        let mut scheduler = TaskScheduler::new(
            config(),
            vec![task("later", 5), task("now", 5).with_start_now(true)],
            executor.clone(),
        )
        .unwrap();
        scheduler.start().unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(executor.runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(executor.runs.load(Ordering::SeqCst), 3);

        scheduler.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failure_adds_backoff() {
        let executor = Arc::new(Counting { runs: AtomicUsize::new(0), fail: true });
        let mut scheduler = TaskScheduler::new(
            config(),
            vec![task("flaky", 2).with_start_now(true)],
            executor.clone(),
        )
        .unwrap();
        scheduler.start().unwrap();

        // runs at t=0, then next due at 0 + 2 + 10
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(executor.runs.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(executor.runs.load(Ordering::SeqCst), 2);

        scheduler.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_task_is_skipped_until_enabled() {
        let executor = Arc::new(Counting { runs: AtomicUsize::new(0), fail: false });
        let mut scheduler = TaskScheduler::new(
            config(),
            vec![task("off", 2).with_enabled(false).with_start_now(true)],
            executor.clone(),
        )
        .unwrap();
        scheduler.start().unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(executor.runs.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.is_enabled("off"), Some(false));

        scheduler.set_enabled("off", true).unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(executor.runs.load(Ordering::SeqCst), 1);

        scheduler.stop().await.unwrap();
    }

    #[test]
    fn due_after_clamps_instead_of_overflowing() {
        let now = Instant::now();
        assert_eq!(due_after(now, Duration::from_secs(5)), now + Duration::from_secs(5));
        assert!(due_after(now, Duration::MAX) > now + Duration::from_secs(86_400 * 365));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_interval_keeps_worker_alive() {
        let executor = Arc::new(Counting { runs: AtomicUsize::new(0), fail: true });
        let huge = Task::new("huge", Duration::MAX, PollTarget::FollowerStat { mid: 1 })
            .with_start_now(true);
        let mut scheduler = TaskScheduler::new(config(), vec![huge], executor.clone()).unwrap();
        scheduler.start().unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(executor.runs.load(Ordering::SeqCst), 1);
        assert!(!scheduler.handles[0].is_finished(), "worker must survive the first run");

        scheduler.stop().await.unwrap();
    }

    struct Panicking {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl TaskExecutor for Panicking {
        async fn run(&self, _task: &Task, _cancel: &CancellationToken) -> Result<(), InfraError> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            assert!(run > 0, "first execution blows up");
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_execution_is_a_failure_with_backoff() {
        let executor = Arc::new(Panicking { runs: AtomicUsize::new(0) });
        let mut scheduler = TaskScheduler::new(
            config(),
            vec![task("boom", 2).with_start_now(true)],
            executor.clone(),
        )
        .unwrap();
        scheduler.start().unwrap();

        // panics at t=0, next due at 0 + 2 + 10
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(executor.runs.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(executor.runs.load(Ordering::SeqCst), 2);
        assert!(!scheduler.handles[0].is_finished());

        scheduler.stop().await.unwrap();
    }
}
