//! StateStore — redb-backed state persistence for fleetscale.
//!
//! Provides typed CRUD operations over groups and their scaling history.
//! All values are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(GROUPS).map_err(map_err!(Table))?;
        txn.open_table(GROUP_STATUS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Groups ─────────────────────────────────────────────────────

    /// Insert or update a group. The group is validated first.
    pub fn put_group(&self, group: &Group) -> StateResult<()> {
        group.validate()?;
        let value = serde_json::to_vec(group).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(GROUPS).map_err(map_err!(Table))?;
            table
                .insert(group.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(group_id = %group.id, "group stored");
        Ok(())
    }

    /// Get a group by id.
    pub fn get_group(&self, id: &str) -> StateResult<Option<Group>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(GROUPS).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let group: Group =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(group))
            }
            None => Ok(None),
        }
    }

    /// List all groups, ordered by id.
    pub fn list_groups(&self) -> StateResult<Vec<Group>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(GROUPS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let group: Group =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(group);
        }
        Ok(results)
    }

    /// Delete a group by id. Returns true if it existed.
    ///
    /// The group's scaling history is kept.
    pub fn delete_group(&self, id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(GROUPS).map_err(map_err!(Table))?;
            existed = table.remove(id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(group_id = %id, existed, "group deleted");
        Ok(existed)
    }

    // ── Status history ─────────────────────────────────────────────

    /// Append a scaling event.
    pub fn add_group_status(&self, status: &GroupStatus) -> StateResult<()> {
        let value = serde_json::to_vec(status).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let key = {
            let mut table = txn.open_table(GROUP_STATUS).map_err(map_err!(Table))?;
            let mut seq = 0;
            let mut key = status.table_key(seq);
            while table.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                seq += 1;
                key = status.table_key(seq);
            }
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            key
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "group status stored");
        Ok(())
    }

    /// Most recent scaling events for a group, newest first.
    pub fn group_history(&self, group_id: &str, limit: usize) -> StateResult<Vec<GroupStatus>> {
        let prefix = format!("{group_id}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(GROUP_STATUS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let status: GroupStatus =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(status);
            }
        }
        results.reverse();
        results.truncate(limit);
        Ok(results)
    }

    /// The latest scaling event of every group that has one.
    pub fn latest_statuses(&self) -> StateResult<Vec<GroupStatus>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(GROUP_STATUS).map_err(map_err!(Table))?;
        let mut results: Vec<GroupStatus> = Vec::new();
        // Keys sort by group, then time: the last entry per group wins.
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let status: GroupStatus =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            match results.last_mut() {
                Some(last) if last.group_id == status.group_id => *last = status,
                _ => results.push(status),
            }
        }
        Ok(results)
    }
}
