//! RunList — the set of groups currently enrolled with the scheduler.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

/// Concurrency-safe membership set of enrolled group ids.
///
/// Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct RunList {
    ids: Arc<RwLock<HashSet<String>>>,
}

impl RunList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enroll a group. Returns false if it was already enrolled.
    pub async fn add(&self, id: &str) -> bool {
        let added = self.ids.write().await.insert(id.to_string());
        if added {
            debug!(group_id = %id, "added to run list");
        }
        added
    }

    /// Retire a group. Returns false if it was not enrolled.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.ids.write().await.remove(id);
        if removed {
            debug!(group_id = %id, "removed from run list");
        }
        removed
    }

    pub async fn is_running(&self, id: &str) -> bool {
        self.ids.read().await.contains(id)
    }

    /// Enrolled ids, sorted.
    pub async fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.ids.read().await.iter().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn reset(&self) {
        self.ids.write().await.clear();
        debug!("run list reset");
    }
}
