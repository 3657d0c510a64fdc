//! ActivityManager — fans the scheduler's activity stream out to listeners.
//!
//! Each event is offered to every registered listener. A listener whose
//! receiver has been dropped is removed for good; a listener that is merely
//! slow gets a bounded wait and keeps its registration.
//!
//! Listeners should be sized to [`ACTIVITY_CAPACITY`](crate::ACTIVITY_CAPACITY).
//! Then an event is skipped only when a listener has stopped draining while
//! more than a full stream's worth of events is waiting for it.

use std::time::Duration;

use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::scheduler::SchedulerActivity;

/// Default time to wait on a full listener before skipping the event for it.
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Replicates one activity stream to N listener channels.
pub struct ActivityManager {
    upstream: mpsc::Receiver<SchedulerActivity>,
    listeners: Vec<mpsc::Sender<SchedulerActivity>>,
    send_timeout: Duration,
}

impl ActivityManager {
    pub fn new(upstream: mpsc::Receiver<SchedulerActivity>) -> Self {
        Self {
            upstream,
            listeners: Vec::new(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Set how long a full listener may hold up delivery of one event.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn register_listener(&mut self, listener: mpsc::Sender<SchedulerActivity>) {
        self.listeners.push(listener);
        debug!(listeners = self.listeners.len(), "activity listener registered");
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Deliver events until the upstream closes or shutdown is signalled.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(listeners = self.listeners.len(), "activity manager started");

        loop {
            tokio::select! {
                event = self.upstream.recv() => {
                    match event {
                        Some(activity) => self.dispatch(activity).await,
                        None => {
                            info!("activity stream closed");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("activity manager shutting down");
                    break;
                }
            }
        }
    }

    async fn dispatch(&mut self, activity: SchedulerActivity) {
        let mut kept = Vec::with_capacity(self.listeners.len());

        for listener in self.listeners.drain(..) {
            match listener.try_send(activity.clone()) {
                Ok(()) => kept.push(listener),
                Err(TrySendError::Full(activity)) => {
                    match listener.send_timeout(activity, self.send_timeout).await {
                        Ok(()) => kept.push(listener),
                        Err(SendTimeoutError::Timeout(activity)) => {
                            warn!(group_id = %activity.id, "activity listener full, event skipped");
                            kept.push(listener);
                        }
                        Err(SendTimeoutError::Closed(_)) => {
                            info!("activity listener closed, removing");
                        }
                    }
                }
                Err(TrySendError::Closed(_)) => {
                    info!("activity listener closed, removing");
                }
            }
        }

        self.listeners = kept;
    }
}
