//! Scheduler — executes scaling actions and tracks disabled groups.
//!
//! The `Scheduler` is the event loop that:
//! - Accepts `Schedule`, `EnableGroup` and `DisableGroup` commands in order
//! - Spawns one timeout-bounded action per accepted `Schedule`
//! - Disables a group whose action fails or times out
//! - Publishes exactly one `SchedulerActivity` per `Schedule`
//!
//! The loop never awaits an action. Completions come back on a private
//! channel that is drained before the next command, so a failure's disable
//! is in effect for every command sent after its activity was observed.
//!
//! With `reschedule_after` set, a group has at most one pending re-enqueue.
//! `DisableGroup` cancels it; a timer that fires after being cancelled or
//! replaced is dropped.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::action::{ActionOutcome, GroupAction};
use crate::error::{ActionError, SchedulerError};

/// Capacity of the outbound activity stream.
pub const ACTIVITY_CAPACITY: usize = 1000;

/// Requests accepted by the scheduler loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCommand {
    Schedule(String),
    EnableGroup(String),
    DisableGroup(String),
}

/// The outcome of one `Schedule` request.
///
/// `delta` and `count` are meaningful only when `error` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerActivity {
    pub id: String,
    pub error: Option<ActionError>,
    pub delta: i64,
    pub count: u32,
}

impl SchedulerActivity {
    fn from_result(id: String, result: Result<ActionOutcome, ActionError>) -> Self {
        match result {
            Ok(outcome) => Self {
                id,
                error: None,
                delta: outcome.delta,
                count: outcome.count,
            },
            Err(e) => Self::failed(id, e),
        }
    }

    fn failed(id: String, error: ActionError) -> Self {
        Self {
            id,
            error: Some(error),
            delta: 0,
            count: 0,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Scheduler tuning.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How long to wait for an action before giving up and disabling the group.
    pub action_timeout: Duration,
    /// Delay before a finished group is scheduled again. `None` schedules
    /// each group only when asked.
    pub reschedule_after: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            action_timeout: Duration::from_secs(60 * 60),
            reschedule_after: Some(Duration::from_secs(10)),
        }
    }
}

/// Cloneable sender for scheduler commands.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Wrap a raw command sender. Tests use this to observe commands directly.
    pub fn new(tx: mpsc::UnboundedSender<SchedulerCommand>) -> Self {
        Self { tx }
    }

    pub fn schedule(&self, id: &str) -> Result<(), SchedulerError> {
        self.send(SchedulerCommand::Schedule(id.to_string()))
    }

    pub fn enable_group(&self, id: &str) -> Result<(), SchedulerError> {
        self.send(SchedulerCommand::EnableGroup(id.to_string()))
    }

    pub fn disable_group(&self, id: &str) -> Result<(), SchedulerError> {
        self.send(SchedulerCommand::DisableGroup(id.to_string()))
    }

    fn send(&self, cmd: SchedulerCommand) -> Result<(), SchedulerError> {
        self.tx.send(cmd).map_err(|_| SchedulerError::Closed)
    }
}

/// Sent by an action unit once it has stopped waiting.
#[derive(Debug)]
struct Completion {
    id: String,
    failed: bool,
}

/// A re-enqueue timer that has fired.
#[derive(Debug)]
struct Due {
    id: String,
    generation: u64,
}

/// The scheduler event loop.
pub struct Scheduler {
    action: Arc<dyn GroupAction>,
    config: SchedulerConfig,
    commands_tx: mpsc::UnboundedSender<SchedulerCommand>,
    commands_rx: mpsc::UnboundedReceiver<SchedulerCommand>,
    activity_tx: mpsc::Sender<SchedulerActivity>,
    /// Groups whose schedules are rejected. Only the loop touches it.
    disabled: HashSet<String>,
    /// Groups with an action the loop is still waiting on.
    in_flight: HashSet<String>,
    due_tx: mpsc::UnboundedSender<Due>,
    due_rx: mpsc::UnboundedReceiver<Due>,
    /// Pending re-enqueue per group, keyed to the generation of its timer.
    pending: HashMap<String, u64>,
    generation: u64,
}

impl Scheduler {
    /// Create a scheduler and the receiving end of its activity stream.
    pub fn new(
        action: Arc<dyn GroupAction>,
        config: SchedulerConfig,
    ) -> (Self, mpsc::Receiver<SchedulerActivity>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (activity_tx, activity_rx) = mpsc::channel(ACTIVITY_CAPACITY);
        let (due_tx, due_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            action,
            config,
            commands_tx,
            commands_rx,
            activity_tx,
            disabled: HashSet::new(),
            in_flight: HashSet::new(),
            due_tx,
            due_rx,
            pending: HashMap::new(),
            generation: 0,
        };
        (scheduler, activity_rx)
    }

    /// A handle for sending commands to this scheduler.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle::new(self.commands_tx.clone())
    }

    /// Run the event loop until shutdown.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            timeout_secs = self.config.action_timeout.as_secs(),
            "scheduler started"
        );
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();

        loop {
            tokio::select! {
                biased;
                Some(done) = done_rx.recv() => {
                    self.on_completion(done);
                }
                Some(due) = self.due_rx.recv() => {
                    self.on_due(due, &done_tx);
                }
                cmd = self.commands_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.on_command(cmd, &done_tx),
                        None => break,
                    }
                }
                _ = shutdown.changed() => {
                    info!("scheduler shutting down");
                    break;
                }
            }
        }
    }

    fn on_command(&mut self, cmd: SchedulerCommand, done_tx: &mpsc::UnboundedSender<Completion>) {
        match cmd {
            SchedulerCommand::EnableGroup(id) => {
                if self.disabled.remove(&id) {
                    info!(group_id = %id, "group enabled");
                }
            }
            SchedulerCommand::DisableGroup(id) => {
                if self.pending.remove(&id).is_some() {
                    debug!(group_id = %id, "pending reschedule cancelled");
                }
                if self.disabled.insert(id.clone()) {
                    info!(group_id = %id, "group disabled");
                }
            }
            SchedulerCommand::Schedule(id) => self.schedule(id, done_tx),
        }
    }

    fn schedule(&mut self, id: String, done_tx: &mpsc::UnboundedSender<Completion>) {
        if self.disabled.contains(&id) {
            warn!(group_id = %id, "schedule rejected, group disabled");
            let err = ActionError::GroupDisabled(id.clone());
            self.publish(SchedulerActivity::failed(id, err));
            return;
        }
        if self.in_flight.contains(&id) {
            warn!(group_id = %id, "schedule rejected, action already running");
            let err = ActionError::AlreadyRunning(id.clone());
            self.publish(SchedulerActivity::failed(id, err));
            return;
        }

        debug!(group_id = %id, "scheduling action");
        self.in_flight.insert(id.clone());

        let action = Arc::clone(&self.action);
        let timeout = self.config.action_timeout;
        let done_tx = done_tx.clone();
        let activity_tx = self.activity_tx.clone();

        tokio::spawn(async move {
            let result = action.perform(&id).wait(timeout).await;
            match &result {
                Ok(outcome) => {
                    debug!(group_id = %id, delta = outcome.delta, count = outcome.count, "action finished");
                }
                Err(e @ ActionError::TimedOut(_)) => {
                    warn!(group_id = %id, error = %e, "action timed out, disabling group");
                }
                Err(e) => {
                    error!(group_id = %id, error = %e, "action failed, disabling group");
                }
            }

            // Completion first, so the loop applies the disable before any
            // command sent in reaction to the activity.
            let _ = done_tx.send(Completion {
                id: id.clone(),
                failed: result.is_err(),
            });
            if activity_tx
                .send(SchedulerActivity::from_result(id, result))
                .await
                .is_err()
            {
                debug!("activity stream closed");
            }
        });
    }

    fn on_completion(&mut self, done: Completion) {
        self.in_flight.remove(&done.id);
        if done.failed {
            self.disabled.insert(done.id.clone());
        }

        let Some(delay) = self.config.reschedule_after else {
            return;
        };
        if self.pending.contains_key(&done.id) {
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        self.pending.insert(done.id.clone(), generation);

        let tx = self.due_tx.clone();
        let id = done.id;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Due { id, generation });
        });
    }

    fn on_due(&mut self, due: Due, done_tx: &mpsc::UnboundedSender<Completion>) {
        if self.pending.get(&due.id) != Some(&due.generation) {
            debug!(group_id = %due.id, "stale reschedule dropped");
            return;
        }
        self.pending.remove(&due.id);
        self.schedule(due.id, done_tx);
    }

    /// Emit an activity from the loop without waiting on a full stream.
    fn publish(&self, activity: SchedulerActivity) {
        match self.activity_tx.try_send(activity) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(activity)) => {
                let tx = self.activity_tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(activity).await;
                });
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("activity stream closed");
            }
        }
    }

    #[cfg(test)]
    fn is_disabled(&self, id: &str) -> bool {
        self.disabled.contains(id)
    }
}
