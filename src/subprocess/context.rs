//! Cancellation and deadline shared by every invocation of one run.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::ProcessError;

/// Execution context handed to every [`ProcessRunner`](super::ProcessRunner) call.
///
/// A single context spans a whole deployment: once it is cancelled or its
/// deadline passes, the in-flight command is stopped and no further command
/// may start.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    cancel: CancellationToken,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl RunContext {
    /// A context without deadline that only ends when cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            timeout: Some(timeout),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the error a runner must report if the context is already done.
    pub fn check(&self) -> Result<(), ProcessError> {
        if self.cancel.is_cancelled() {
            return Err(ProcessError::Cancelled);
        }
        match (self.deadline, self.timeout) {
            (Some(deadline), Some(timeout)) if Instant::now() >= deadline => {
                Err(ProcessError::Timeout(timeout))
            }
            _ => Ok(()),
        }
    }

    /// Resolves once the context is cancelled or its deadline elapses.
    pub async fn done(&self) -> ProcessError {
        match (self.deadline, self.timeout) {
            (Some(deadline), Some(timeout)) => tokio::select! {
                _ = self.cancel.cancelled() => ProcessError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => ProcessError::Timeout(timeout),
            },
            _ => {
                self.cancel.cancelled().await;
                ProcessError::Cancelled
            }
        }
    }
}
