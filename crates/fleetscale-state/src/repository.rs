//! The read contract the control loop holds against group storage.

use crate::error::StateResult;
use crate::store::StateStore;
use crate::types::{Group, GroupStatus};

/// Group storage as seen by the monitor, the check action and the
/// activity observers.
///
/// The control loop never creates, updates or deletes groups; that is the
/// API layer's job. `get_group` returns [`crate::StateError::NotFound`] for
/// an unknown id.
pub trait Repository: Send + Sync {
    /// List every stored group.
    fn list_groups(&self) -> StateResult<Vec<Group>>;

    /// Load a single group by id.
    fn get_group(&self, id: &str) -> StateResult<Group>;

    /// Append a scaling event to a group's history.
    fn add_group_status(&self, status: &GroupStatus) -> StateResult<()>;
}

impl Repository for StateStore {
    fn list_groups(&self) -> StateResult<Vec<Group>> {
        StateStore::list_groups(self)
    }

    fn get_group(&self, id: &str) -> StateResult<Group> {
        StateStore::get_group(self, id)?
            .ok_or_else(|| crate::StateError::NotFound(format!("group {id}")))
    }

    fn add_group_status(&self, status: &GroupStatus) -> StateResult<()> {
        StateStore::add_group_status(self, status)
    }
}
