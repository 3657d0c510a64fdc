//! Control loop wiring.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

use fleetscale_autoscale::{
    Check, LocalResourceFactory, Monitor, Notification, Notifier, RunList, StatusRecorder,
};
use fleetscale_metrics::{FileLoad, MetricsRegistry};
use fleetscale_scheduler::{ActivityManager, Scheduler, SchedulerConfig, SchedulerHandle};
use fleetscale_state::Repository;

use crate::config::FleetConfig;

/// A running control loop.
pub struct Daemon {
    scheduler: SchedulerHandle,
    run_list: RunList,
    resources: LocalResourceFactory,
    notifications: Option<mpsc::Receiver<Notification>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Daemon {
    /// Build every component and spawn its task. Must run inside a tokio runtime.
    pub fn start(config: &FleetConfig, repo: Arc<dyn Repository>) -> anyhow::Result<Self> {
        config.validate()?;

        // ── Backends ───────────────────────────────────────────────

        let file_load = FileLoad::new(&config.stats_dir)
            .with_context(|| format!("stats dir {}", config.stats_dir.display()))?;
        let registry = MetricsRegistry::new().with(config.metric_type.clone(), Arc::new(file_load));
        info!(metric_types = ?registry.metric_types(), "metrics registry ready");

        let resources = LocalResourceFactory::new();

        // ── Scheduler + observers ──────────────────────────────────

        let check = Check::new(repo.clone(), Arc::new(resources.clone()), registry);
        let (scheduler, activity) = Scheduler::new(
            Arc::new(check),
            SchedulerConfig {
                action_timeout: config.action_timeout()?,
                reschedule_after: config.reschedule_after()?,
            },
        );
        let handle = scheduler.handle();

        let mut activity_manager = ActivityManager::new(activity);
        let (recorder, recorder_tx) = StatusRecorder::new(repo.clone());
        let (notifier, notifier_tx, notifications) = Notifier::new(repo.clone());
        activity_manager.register_listener(recorder_tx);
        activity_manager.register_listener(notifier_tx);

        let run_list = RunList::new();
        let monitor = Monitor::new(repo, run_list.clone()).with_interval(config.monitor_interval()?);

        // ── Tasks ──────────────────────────────────────────────────

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(scheduler.run(shutdown_rx.clone())),
            tokio::spawn(activity_manager.run(shutdown_rx.clone())),
            tokio::spawn(recorder.run(shutdown_rx.clone())),
            tokio::spawn(notifier.run(shutdown_rx.clone())),
            tokio::spawn(monitor.run(handle.clone(), shutdown_rx)),
        ];
        info!("control loop started");

        Ok(Self {
            scheduler: handle,
            run_list,
            resources,
            notifications: Some(notifications),
            shutdown_tx,
            tasks,
        })
    }

    /// Handle for operator commands (re-enabling a group, forcing a check).
    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    pub fn run_list(&self) -> &RunList {
        &self.run_list
    }

    pub fn resources(&self) -> &LocalResourceFactory {
        &self.resources
    }

    /// The notification stream. Available once.
    pub fn take_notifications(&mut self) -> Option<mpsc::Receiver<Notification>> {
        self.notifications.take()
    }

    /// Signal every task to stop and wait for them.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("control loop stopped");
    }
}
