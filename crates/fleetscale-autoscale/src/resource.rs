//! Resource backends — the compute a group scales.
//!
//! The control loop sees a backend only through [`ResourceManager`]. The
//! [`LocalResourceFactory`] hands out in-memory backends, which lets the
//! daemon run without a cloud provider.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::RwLock;
use tracing::info;

use fleetscale_metrics::ResourceAllocation;
use fleetscale_state::Group;

use crate::error::ResourceError;

/// Boxed future returned by [`ResourceManager`] methods.
pub type ResourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ResourceError>> + Send + 'a>>;

/// A scalable set of compute instances.
pub trait ResourceManager: Send + Sync {
    /// Current number of instances.
    fn count(&self) -> ResourceFuture<'_, u32>;

    /// Add (positive) or remove (negative) instances. Returns whether the
    /// topology changed.
    fn scale<'a>(&'a self, group: &'a Group, delta: i64) -> ResourceFuture<'a, bool>;

    /// Instances currently allocated.
    fn allocated(&self) -> ResourceFuture<'_, Vec<ResourceAllocation>>;
}

/// Resolves the backend that owns a group's instances.
pub trait ResourceManagerFactory: Send + Sync {
    fn resource_for(&self, group: &Group) -> Result<Arc<dyn ResourceManager>, ResourceError>;
}

// ── Local backend ───────────────────────────────────────────────

/// In-memory instance counter.
#[derive(Debug, Default)]
pub struct LocalResource {
    count: RwLock<u32>,
}

impl LocalResource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_count(count: u32) -> Self {
        Self {
            count: RwLock::new(count),
        }
    }
}

impl ResourceManager for LocalResource {
    fn count(&self) -> ResourceFuture<'_, u32> {
        Box::pin(async move { Ok(*self.count.read().await) })
    }

    fn scale<'a>(&'a self, group: &'a Group, delta: i64) -> ResourceFuture<'a, bool> {
        Box::pin(async move {
            if delta == 0 {
                return Ok(false);
            }
            let mut count = self.count.write().await;
            let before = *count;
            let target = (i64::from(before) + delta).clamp(0, i64::from(u32::MAX));
            *count = u32::try_from(target).unwrap_or(u32::MAX);

            info!(group_id = %group.id, delta, before, after = *count, "local resource scaled");
            Ok(*count != before)
        })
    }

    fn allocated(&self) -> ResourceFuture<'_, Vec<ResourceAllocation>> {
        Box::pin(async move {
            let count = *self.count.read().await;
            Ok((1..=count)
                .map(|i| ResourceAllocation {
                    name: format!("instance-{i}"),
                    address: String::new(),
                })
                .collect())
        })
    }
}

/// One shared [`LocalResource`] per group id.
#[derive(Debug, Default, Clone)]
pub struct LocalResourceFactory {
    resources: Arc<Mutex<HashMap<String, Arc<LocalResource>>>>,
}

impl LocalResourceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The backend for a group id, created empty on first use.
    pub fn local(&self, group_id: &str) -> Arc<LocalResource> {
        let mut resources = self.resources.lock().unwrap_or_else(|e| e.into_inner());
        resources
            .entry(group_id.to_string())
            .or_insert_with(|| Arc::new(LocalResource::new()))
            .clone()
    }
}

impl ResourceManagerFactory for LocalResourceFactory {
    fn resource_for(&self, group: &Group) -> Result<Arc<dyn ResourceManager>, ResourceError> {
        Ok(self.local(&group.id))
    }
}
