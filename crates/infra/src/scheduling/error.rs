//! Scheduler error types

use bilimon_domain::BiliMonError;
use thiserror::Error;

use crate::errors::InfraError;

/// Scheduler-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// Scheduler is already running
    #[error("Scheduler already running")]
    AlreadyRunning,

    /// Scheduler is not running
    #[error("Scheduler not running")]
    NotRunning,

    /// No task with this id was registered
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    /// Two tasks share an id
    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),
}

impl From<SchedulerError> for InfraError {
    fn from(err: SchedulerError) -> Self {
        let bilimon_err = match err {
            SchedulerError::UnknownTask(_) => BiliMonError::NotFound(err.to_string()),
            SchedulerError::AlreadyRunning
            | SchedulerError::NotRunning
            | SchedulerError::DuplicateTask(_) => BiliMonError::InvalidInput(err.to_string()),
        };
        InfraError(bilimon_err)
    }
}

impl From<SchedulerError> for BiliMonError {
    fn from(err: SchedulerError) -> Self {
        InfraError::from(err).into()
    }
}

/// Convenience type alias for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
