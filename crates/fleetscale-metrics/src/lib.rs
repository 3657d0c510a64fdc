//! fleetscale-metrics — load measurement for autoscale groups.
//!
//! A metrics backend measures the current load of a group and is told about
//! the group's instances whenever its topology changes, so that it can
//! reconfigure scraping.
//!
//! # Architecture
//!
//! ```text
//! MetricsRegistry (built once at startup, shared read-only)
//!   ├── "load" → FileLoad (values from <stats_dir>/<group name>)
//!   └── ...    → other backends registered by the daemon
//!
//! MetricNotifier
//!   └── narrow hook a scaling policy fires when the count is about to change
//! ```

pub mod error;
pub mod file_load;
pub mod metrics;

pub use error::{MetricsError, MetricsResult};
pub use file_load::FileLoad;
pub use metrics::{MeasureFuture, MetricNotifier, Metrics, MetricsRegistry, ResourceAllocation};
