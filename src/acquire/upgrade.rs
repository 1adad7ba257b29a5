use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// Result of a background screenshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// Inline JPEG data URI
    Captured(String),
    Failed(String),
}

const WORKER_GONE: &str = "screenshot worker exited without reporting";

/// Handle to a screenshot still being taken for a doc-like URL.
///
/// Dropping the handle does not cancel the capture; the worker finishes and
/// its result is discarded.
#[derive(Debug)]
pub struct PendingScreenshot {
    rx: Receiver<UpgradeOutcome>,
    outcome: Option<UpgradeOutcome>,
}

impl PendingScreenshot {
    pub(crate) fn new(rx: Receiver<UpgradeOutcome>) -> Self {
        Self { rx, outcome: None }
    }

    /// Non-blocking poll.
    pub fn try_outcome(&mut self) -> Option<&UpgradeOutcome> {
        if self.outcome.is_none() {
            self.outcome = match self.rx.try_recv() {
                Ok(outcome) => Some(outcome),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => Some(UpgradeOutcome::Failed(WORKER_GONE.into())),
            };
        }
        self.outcome.as_ref()
    }

    /// Block until the worker reports.
    pub fn wait(mut self) -> UpgradeOutcome {
        if let Some(outcome) = self.outcome.take() {
            return outcome;
        }
        self.rx
            .recv()
            .unwrap_or_else(|_| UpgradeOutcome::Failed(WORKER_GONE.into()))
    }

    /// Block for at most `timeout`. `None` means the worker is still running.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<&UpgradeOutcome> {
        if self.outcome.is_none() {
            self.outcome = match self.rx.recv_timeout(timeout) {
                Ok(outcome) => Some(outcome),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => {
                    Some(UpgradeOutcome::Failed(WORKER_GONE.into()))
                }
            };
        }
        self.outcome.as_ref()
    }
}
