//! fleetscale-state — embedded state store for fleetscale.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for autoscale groups and their scaling history.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Status history uses composite keys (`{group_id}:{created_at_ms}`) so that
//! a prefix scan returns one group's events in time order.
//!
//! The control loop only reads groups. It reaches the store through the
//! [`Repository`] trait, which the `StateStore` implements and tests replace
//! with in-memory fakes.

pub mod error;
pub mod repository;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use repository::Repository;
pub use store::StateStore;
pub use types::*;
