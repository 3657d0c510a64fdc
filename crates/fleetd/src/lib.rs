//! fleetd — the fleetscale daemon.
//!
//! Assembles the control loop from the library crates:
//! - State store (redb)
//! - Metrics registry (file load)
//! - Local resource backend
//! - Check action + scheduler
//! - Activity manager + status/notification observers
//! - Group monitor

pub mod config;
pub mod daemon;
pub mod group_file;

pub use config::FleetConfig;
pub use daemon::Daemon;
pub use group_file::GroupFile;
