//! Autoscaler error types.

use thiserror::Error;

use fleetscale_scheduler::SchedulerError;
use fleetscale_state::StateError;

/// Errors raised while building a scaling policy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("scale down value {down} must be less than scale up value {up}")]
    InvalidThresholds { down: f64, up: f64 },

    #[error("invalid bounds: {0}")]
    InvalidBounds(String),

    #[error("rule overlaps an existing rule: {0}")]
    Overlap(String),
}

/// Errors raised by resource backends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("resource backend error: {0}")]
    Backend(String),

    #[error("no resource backend for group {0}")]
    Unavailable(String),
}

/// Errors that end one monitor tick early.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("listing groups: {0}")]
    State(#[from] StateError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}
