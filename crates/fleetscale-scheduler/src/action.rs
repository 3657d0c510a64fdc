//! Action completion signalling.
//!
//! An action reports its result exactly once through an [`ActionReporter`].
//! The scheduler holds the matching [`ActionStatus`] and races it against the
//! action timeout. A result that arrives after the timeout is dropped with
//! the receiving half.

use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::ActionError;

/// Result of a successful action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Signed change in resource count.
    pub delta: i64,
    /// Resource count after the action.
    pub count: u32,
}

type Slot = Result<ActionOutcome, ActionError>;

/// Sending half of an action's completion slot.
#[derive(Debug)]
pub struct ActionReporter {
    tx: oneshot::Sender<Slot>,
}

impl ActionReporter {
    /// Report the action's result. Consumes the reporter.
    pub fn complete(self, result: Result<ActionOutcome, ActionError>) {
        // The receiver is gone once the scheduler has stopped waiting.
        let _ = self.tx.send(result);
    }
}

/// Receiving half of an action's completion slot.
#[derive(Debug)]
pub struct ActionStatus {
    rx: oneshot::Receiver<Slot>,
}

impl ActionStatus {
    /// Create a connected reporter/status pair.
    pub fn channel() -> (ActionReporter, ActionStatus) {
        let (tx, rx) = oneshot::channel();
        (ActionReporter { tx }, ActionStatus { rx })
    }

    /// A status that is already complete.
    pub fn ready(result: Result<ActionOutcome, ActionError>) -> Self {
        let (reporter, status) = Self::channel();
        reporter.complete(result);
        status
    }

    /// Wait for the result, giving up after `timeout`.
    ///
    /// A reporter dropped without completing yields [`ActionError::Aborted`].
    pub async fn wait(self, timeout: Duration) -> Result<ActionOutcome, ActionError> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ActionError::Aborted),
            Err(_) => Err(ActionError::TimedOut(timeout)),
        }
    }
}

/// A scaling action executed by the scheduler for one group.
///
/// `perform` must return promptly; implementors spawn the actual work and
/// report through the [`ActionReporter`] paired with the returned status.
pub trait GroupAction: Send + Sync + 'static {
    fn perform(&self, group_id: &str) -> ActionStatus;
}
