//! fleetscale-scheduler — runs per-group scaling actions.
//!
//! The scheduler owns the disabled-group set and executes one action per
//! `Schedule` request, bounded by a global timeout. Every request produces
//! exactly one [`SchedulerActivity`], which the [`ActivityManager`] then
//! replicates to any number of observers.
//!
//! # Architecture
//!
//! ```text
//! SchedulerHandle ──(Schedule / EnableGroup / DisableGroup)──► Scheduler loop
//!                                                               ├── disabled set
//!                                                               ├── in-flight set
//!                                                               └── spawn per action
//!                                                                     └── GroupAction::perform → ActionStatus
//! Scheduler ──(SchedulerActivity, cap 1000)──► ActivityManager ──► listener 1..N
//! ```

pub mod action;
pub mod activity;
pub mod error;
pub mod scheduler;

pub use action::{ActionOutcome, ActionReporter, ActionStatus, GroupAction};
pub use activity::ActivityManager;
pub use error::{ActionError, SchedulerError};
pub use scheduler::{
    ACTIVITY_CAPACITY, Scheduler, SchedulerActivity, SchedulerCommand, SchedulerConfig,
    SchedulerHandle,
};
