//! Activity observers.
//!
//! Both observers own the receiving end of a listener channel that is
//! registered with the `ActivityManager`, and run until that channel closes
//! or shutdown is signalled.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use fleetscale_scheduler::{ACTIVITY_CAPACITY, SchedulerActivity};
use fleetscale_state::{GroupStatus, Repository};

/// Capacity of each observer's inbound activity channel. Matches the
/// scheduler's own stream so a full backlog fits in every listener.
pub const LISTENER_CAPACITY: usize = ACTIVITY_CAPACITY;

/// Capacity of the notification output channel.
pub const NOTIFICATION_CAPACITY: usize = 100;

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ── Status history ──────────────────────────────────────────────

/// Persists every successful scaling change to the group's history.
pub struct StatusRecorder {
    repo: Arc<dyn Repository>,
    activity: mpsc::Receiver<SchedulerActivity>,
}

impl StatusRecorder {
    /// Create the recorder and the sender to register as a listener.
    pub fn new(repo: Arc<dyn Repository>) -> (Self, mpsc::Sender<SchedulerActivity>) {
        let (tx, rx) = mpsc::channel(LISTENER_CAPACITY);
        (Self { repo, activity: rx }, tx)
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                event = self.activity.recv() => {
                    match event {
                        Some(activity) => {
                            self.record(&activity);
                        }
                        None => break,
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("status recorder stopped");
    }

    /// Store the activity if it is a successful change. Returns whether a
    /// status was written.
    pub fn record(&self, activity: &SchedulerActivity) -> bool {
        if activity.is_error() || activity.delta == 0 {
            return false;
        }

        let status = GroupStatus {
            group_id: activity.id.clone(),
            delta: activity.delta,
            total: activity.count,
            created_at: epoch_millis(),
        };
        match self.repo.add_group_status(&status) {
            Ok(()) => {
                debug!(group_id = %status.group_id, delta = status.delta, total = status.total, "group status recorded");
                true
            }
            Err(e) => {
                error!(group_id = %status.group_id, error = %e, "unable to add group status");
                false
            }
        }
    }
}

// ── Notifications ───────────────────────────────────────────────

/// A user-facing scaling notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: u64,
    pub group_id: String,
    pub name: String,
    pub delta: i64,
    pub count: u32,
    pub message: String,
    pub is_error: bool,
}

/// Turns scaling changes and failures into [`Notification`]s.
pub struct Notifier {
    repo: Arc<dyn Repository>,
    activity: mpsc::Receiver<SchedulerActivity>,
    output: mpsc::Sender<Notification>,
    next_id: u64,
}

impl Notifier {
    /// Create the notifier, the sender to register as a listener, and the
    /// notification stream.
    pub fn new(
        repo: Arc<dyn Repository>,
    ) -> (
        Self,
        mpsc::Sender<SchedulerActivity>,
        mpsc::Receiver<Notification>,
    ) {
        let (activity_tx, activity_rx) = mpsc::channel(LISTENER_CAPACITY);
        let (output_tx, output_rx) = mpsc::channel(NOTIFICATION_CAPACITY);
        let notifier = Self {
            repo,
            activity: activity_rx,
            output: output_tx,
            next_id: 1,
        };
        (notifier, activity_tx, output_rx)
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                event = self.activity.recv() => {
                    let Some(activity) = event else { break };
                    let Some(notification) = self.notification_for(&activity) else {
                        continue;
                    };
                    if self.output.send(notification).await.is_err() {
                        info!("notification stream closed");
                        break;
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("notifier stopped");
    }

    /// Build the notification for an activity, if it warrants one.
    pub fn notification_for(&mut self, activity: &SchedulerActivity) -> Option<Notification> {
        if !activity.is_error() && activity.delta == 0 {
            return None;
        }

        let group = match self.repo.get_group(&activity.id) {
            Ok(group) => group,
            Err(e) => {
                error!(group_id = %activity.id, error = %e, "unable to load group");
                return None;
            }
        };

        let id = self.next_id;
        self.next_id += 1;

        let notification = match &activity.error {
            Some(e) => Notification {
                id,
                group_id: activity.id.clone(),
                name: group.name,
                delta: 0,
                count: 0,
                message: e.to_string(),
                is_error: true,
            },
            None => Notification {
                id,
                group_id: activity.id.clone(),
                name: group.name,
                delta: activity.delta,
                count: activity.count,
                message: String::new(),
                is_error: false,
            },
        };
        info!(group_id = %notification.group_id, is_error = notification.is_error, "sending notification");
        Some(notification)
    }
}
