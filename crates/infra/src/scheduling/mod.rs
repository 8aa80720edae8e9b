//! Periodic task execution.

pub mod error;
pub mod poll_executor;
pub mod task_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use poll_executor::PollExecutor;
pub use task_scheduler::{TaskExecutor, TaskScheduler, TaskSchedulerConfig};
