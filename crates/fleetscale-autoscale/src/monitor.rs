//! Monitor — background loop that keeps the scheduler's groups in sync with
//! the store.
//!
//! Every tick lists the stored groups. Groups not yet in the [`RunList`] are
//! enrolled and handed to the scheduler (`EnableGroup` then `Schedule`);
//! enrolled groups that disappeared from the store are retired with
//! `DisableGroup`. The monitor never runs a check itself.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use fleetscale_scheduler::SchedulerHandle;
use fleetscale_state::Repository;

use crate::error::MonitorError;
use crate::run_list::RunList;

/// Default time between reconciliations.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

pub struct Monitor {
    repo: Arc<dyn Repository>,
    run_list: RunList,
    interval: Duration,
}

impl Monitor {
    pub fn new(repo: Arc<dyn Repository>, run_list: RunList) -> Self {
        Self {
            repo,
            run_list,
            interval: DEFAULT_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn run_list(&self) -> &RunList {
        &self.run_list
    }

    /// Reconcile once.
    pub async fn tick(&self, scheduler: &SchedulerHandle) -> Result<(), MonitorError> {
        let groups = self.repo.list_groups()?;
        let mut listed = HashSet::with_capacity(groups.len());

        for group in &groups {
            listed.insert(group.id.as_str());
            if self.run_list.add(&group.id).await {
                info!(group_id = %group.id, name = %group.name, "enrolling group");
                scheduler.enable_group(&group.id)?;
                scheduler.schedule(&group.id)?;
            }
        }

        for id in self.run_list.list().await {
            if !listed.contains(id.as_str()) {
                info!(group_id = %id, "retiring group");
                self.run_list.remove(&id).await;
                scheduler.disable_group(&id)?;
            }
        }

        debug!(groups = groups.len(), "monitor tick complete");
        Ok(())
    }

    /// Reconcile every interval until shutdown, then clear the run list.
    pub async fn run(self, scheduler: SchedulerHandle, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis() as u64, "monitor started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(e) = self.tick(&scheduler).await {
                        error!(error = %e, "monitor tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("monitor shutting down");
                    break;
                }
            }
        }

        self.run_list.reset().await;
    }
}
