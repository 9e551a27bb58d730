use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Failed to spawn '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("exit status {0}")]
    ExitCode(i32),

    #[error("Process terminated by signal {0}")]
    Signal(i32),

    #[error("Deadline of {0:?} exceeded")]
    Timeout(Duration),

    #[error("Execution cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure injected by [`MockProcessRunner`](super::MockProcessRunner).
    #[error("{0}")]
    Mock(String),
}

impl ProcessError {
    /// Whether the failure came from the run context rather than the command.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, ProcessError::Timeout(_) | ProcessError::Cancelled)
    }
}
