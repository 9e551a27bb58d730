use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use super::context::RunContext;
use super::error::ProcessError;
use super::redact::redact_args;

/// A single command invocation: an executable and its ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ProcessCommand {
    /// Build a command from a token list whose first token is the program.
    pub fn from_tokens<I, S>(tokens: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tokens = tokens.into_iter().map(Into::into);
        let program = tokens.next()?;
        Some(Self {
            program,
            args: tokens.collect(),
        })
    }

    /// Command line with `--set` values masked, for logging.
    pub fn redacted(&self) -> String {
        let mut line = self.program.clone();
        for arg in redact_args(&self.args) {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }
}

impl fmt::Display for ProcessCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Executes commands on behalf of the deployment.
///
/// Implementations must return promptly once `ctx` is cancelled or past its
/// deadline, and must not start a command on a context that is already done.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, ctx: &RunContext, command: &ProcessCommand) -> Result<(), ProcessError>;
}

/// Runs commands as child processes sharing this process' stdio.
pub struct TokioProcessRunner {
    grace_period: Duration,
}

impl Default for TokioProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self {
            grace_period: Duration::from_secs(10),
        }
    }

    /// How long an interrupted child gets between SIGTERM and SIGKILL.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Configure the command with a process group and inherited stdio
    fn configure_command(command: &ProcessCommand) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&command.program);

        // Own process group so an interrupt reaches helm's children as well
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        cmd.args(&command.args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::inherit())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }

    /// Map spawn error to ProcessError
    fn map_spawn_error(error: std::io::Error, command: &ProcessCommand) -> ProcessError {
        if error.kind() == std::io::ErrorKind::NotFound {
            ProcessError::CommandNotFound(command.program.clone())
        } else {
            ProcessError::SpawnFailed {
                command: command.redacted(),
                source: error,
            }
        }
    }

    /// Convert process exit status to a result
    fn parse_exit_status(status: std::process::ExitStatus) -> Result<(), ProcessError> {
        if status.success() {
            Ok(())
        } else if let Some(code) = status.code() {
            Err(ProcessError::ExitCode(code))
        } else {
            Err(Self::parse_signal_status(status))
        }
    }

    #[cfg(unix)]
    fn parse_signal_status(status: std::process::ExitStatus) -> ProcessError {
        use std::os::unix::process::ExitStatusExt;
        match status.signal() {
            Some(signal) => ProcessError::Signal(signal),
            None => ProcessError::ExitCode(1),
        }
    }

    #[cfg(not(unix))]
    fn parse_signal_status(_status: std::process::ExitStatus) -> ProcessError {
        ProcessError::ExitCode(1)
    }

    /// Ask the child's process group to stop, then kill it after the grace period.
    async fn terminate(&self, child: &mut tokio::process::Child, program: &str) {
        let group = child.id();
        #[cfg(unix)]
        {
            if let Some(pid) = group {
                signal_group(pid, nix::sys::signal::Signal::SIGTERM, program);
            }
        }

        match tokio::time::timeout(self.grace_period, child.wait()).await {
            Ok(_) => tracing::debug!("'{}' stopped after SIGTERM", program),
            Err(_) => {
                tracing::warn!(
                    "'{}' still running after {:?}, killing it",
                    program,
                    self.grace_period
                );
                #[cfg(unix)]
                {
                    if let Some(pid) = group {
                        signal_group(pid, nix::sys::signal::Signal::SIGKILL, program);
                    }
                }
                if let Err(e) = child.kill().await {
                    tracing::error!("Unable to kill '{}': {}", program, e);
                }
            }
        }
    }
}

/// Signal every process in the group led by `pid`.
#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal, program: &str) {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
        tracing::debug!("Unable to send {:?} to '{}': {}", signal, program, e);
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, ctx: &RunContext, command: &ProcessCommand) -> Result<(), ProcessError> {
        ctx.check()?;

        tracing::info!("running: {}", command.redacted());
        let start = std::time::Instant::now();

        let mut child = Self::configure_command(command)
            .spawn()
            .map_err(|e| Self::map_spawn_error(e, command))?;

        let result = tokio::select! {
            status = child.wait() => status
                .map_err(ProcessError::Io)
                .and_then(Self::parse_exit_status),
            err = ctx.done() => {
                tracing::warn!("Interrupting '{}': {}", command.program, err);
                self.terminate(&mut child, &command.program).await;
                Err(err)
            }
        };

        match &result {
            Ok(()) => tracing::debug!(
                "Subprocess completed successfully in {:?}: {}",
                start.elapsed(),
                command.program
            ),
            Err(e) => tracing::debug!(
                "Subprocess failed in {:?}: {}: {}",
                start.elapsed(),
                command.program,
                e
            ),
        }

        result
    }
}
