//! Scheduler error types.

use std::time::Duration;

use thiserror::Error;

/// Why a scheduled action did not produce a scaling outcome.
///
/// Carried inside a `SchedulerActivity`; payloads are strings so activities
/// can be cloned to every listener.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error("repository error: {0}")]
    Repository(String),

    #[error("resource error: {0}")]
    Resource(String),

    #[error("policy error: {0}")]
    Policy(String),

    #[error("measure error: {0}")]
    Measure(String),

    #[error("scale error: {0}")]
    Scale(String),

    #[error("metric notify error: {0}")]
    MetricNotify(String),

    #[error("action timed out after {0:?}")]
    TimedOut(Duration),

    #[error("group disabled: {0}")]
    GroupDisabled(String),

    #[error("action already running for group {0}")]
    AlreadyRunning(String),

    #[error("action ended without reporting a result")]
    Aborted,
}

impl ActionError {
    /// True for the outcomes the scheduler produces without running an action.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::GroupDisabled(_) | Self::AlreadyRunning(_))
    }
}

/// Errors returned to callers of the scheduler handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("scheduler is not running")]
    Closed,
}
