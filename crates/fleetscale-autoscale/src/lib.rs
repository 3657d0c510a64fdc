//! fleetscale-autoscale — keeps groups sized to their observed load.
//!
//! Ties the state store, the metrics backends and the scheduler together:
//!
//! - [`Monitor`] enrolls stored groups into the [`RunList`] and the scheduler
//! - [`Check`] is the scheduler's action: measure, decide, scale, warm up
//! - [`Policy`] implementations turn (count, value) into a new count
//! - [`StatusRecorder`] and [`Notifier`] consume the activity stream
//!
//! # Scaling decision
//!
//! ```text
//! value   = Metrics::measure(group.name)
//! count   = ResourceManager::count()
//! target  = Policy::scale(count, value)       // ValuePolicy or RulePolicy
//! changed = ResourceManager::scale(target - count)
//! if changed:
//!     Metrics::update(group.name, allocations)
//!     sleep(policy.warm_up)
//! ```

pub mod check;
pub mod error;
pub mod monitor;
pub mod observer;
pub mod policy;
pub mod resource;
pub mod run_list;
pub mod scale_rule;

pub use check::Check;
pub use error::{MonitorError, PolicyError, ResourceError};
pub use monitor::Monitor;
pub use observer::{Notification, Notifier, StatusRecorder};
pub use policy::{Policy, RulePolicy, ValuePolicy, build_policy};
pub use resource::{
    LocalResource, LocalResourceFactory, ResourceFuture, ResourceManager, ResourceManagerFactory,
};
pub use run_list::RunList;
pub use scale_rule::{FloatBounds, IntBounds, ScaleRule, ScaleRuleSet};
