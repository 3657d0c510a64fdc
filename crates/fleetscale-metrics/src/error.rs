//! Metrics error types.

use thiserror::Error;

/// Errors raised by metrics backends and the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricsError {
    #[error("unknown metric {0:?}")]
    UnknownMetric(String),

    #[error("invalid metrics configuration: {0}")]
    Config(String),

    #[error("failed to measure group {group}: {reason}")]
    Measure { group: String, reason: String },

    #[error("failed to update metrics for group {group}: {reason}")]
    Update { group: String, reason: String },
}

pub type MetricsResult<T> = Result<T, MetricsError>;
