//! Reporting the outcome of a deployment.
//!
//! A reporter turns the final result into the process exit code. Only a
//! fully successful run exits zero.

mod pushgateway;

pub use pushgateway::{push_body, status_label, PushError, PushgatewayReporter};

use std::process::ExitCode;

use async_trait::async_trait;
use tracing::{error, info};

use crate::helm::HelmError;

#[async_trait]
pub trait StatusReporter: Send + Sync {
    /// Report a failure that happened before the plan could run.
    fn fatal(&self, error: &anyhow::Error) -> ExitCode;

    /// Report the result of running the plan. `message` is logged on
    /// success.
    async fn status(&self, result: &Result<(), HelmError>, message: &str) -> ExitCode;
}

/// Logs the outcome and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

#[async_trait]
impl StatusReporter for LogReporter {
    fn fatal(&self, error: &anyhow::Error) -> ExitCode {
        error!("{:#}", error);
        ExitCode::FAILURE
    }

    async fn status(&self, result: &Result<(), HelmError>, message: &str) -> ExitCode {
        match result {
            Ok(()) => {
                info!("{}", message);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(kind = e.kind().as_str(), "error running helm: {}", e);
                ExitCode::FAILURE
            }
        }
    }
}
