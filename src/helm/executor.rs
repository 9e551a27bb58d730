//! Runs a [`HelmCommand`] phase by phase.
//!
//! Phases run strictly one after another:
//! pre-commands, the main invocation, `helm test` with an optional
//! `helm rollback`, then post-commands. The first failure ends the run with
//! a classified [`HelmError`]; nothing is retried.

use std::fmt;

use tracing::{error, info, warn};

use super::command::{helm, HelmCommand};
use super::error::{ErrorKind, HelmError};
use crate::subprocess::{ProcessCommand, ProcessError, RunContext};

const PRECMD_FAILED: &str = "precmd failed";
const HELM_FAILED: &str = "helm failed";
const TEST_FAILED: &str = "release test failed";
const ROLLBACK_SUCCESS: &str = "release failed and rollback successful";
const ROLLBACK_FAILED: &str = "release and rollback failed";
const POSTCMD_FAILED: &str = "postcmd failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PreCommands,
    Main,
    Test,
    Rollback,
    PostCommands,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::PreCommands => "pre-commands",
            Phase::Main => "main",
            Phase::Test => "test",
            Phase::Rollback => "rollback",
            Phase::PostCommands => "post-commands",
        })
    }
}

impl HelmCommand {
    /// Execute the plan once. `ctx` bounds the whole run.
    pub async fn run(&self, ctx: &RunContext) -> Result<(), HelmError> {
        self.run_all(Phase::PreCommands, ctx, &self.pre_commands)
            .await
            .map_err(|e| HelmError::wrap(e, PRECMD_FAILED, ErrorKind::PreFail))?;

        self.enter(Phase::Main);
        self.runner
            .run(ctx, &self.main_command())
            .await
            .map_err(|e| HelmError::wrap(e, HELM_FAILED, ErrorKind::Failed))?;

        if self.test {
            self.run_tests(ctx).await?;
        }

        self.run_all(Phase::PostCommands, ctx, &self.post_commands)
            .await
            .map_err(|e| HelmError::wrap(e, POSTCMD_FAILED, ErrorKind::PostFail))?;

        info!("release {} deployed", self.release);
        Ok(())
    }

    fn enter(&self, phase: Phase) {
        info!(release = %self.release, "entering {} phase", phase);
    }

    async fn run_all(
        &self,
        phase: Phase,
        ctx: &RunContext,
        commands: &[ProcessCommand],
    ) -> Result<(), ProcessError> {
        if commands.is_empty() {
            return Ok(());
        }
        self.enter(phase);
        for command in commands {
            self.runner.run(ctx, command).await?;
        }
        Ok(())
    }

    async fn run_tests(&self, ctx: &RunContext) -> Result<(), HelmError> {
        self.enter(Phase::Test);
        let test = helm_release_command(&["test", "--logs"], &self.release);
        let Err(test_err) = self.runner.run(ctx, &test).await else {
            return Ok(());
        };
        warn!("TEST FAILED: {}", test_err);

        if !self.test_rollback {
            return Err(HelmError::wrap(test_err, TEST_FAILED, ErrorKind::TestFailed));
        }

        self.enter(Phase::Rollback);
        let rollback = helm_release_command(&["rollback"], &self.release);
        match self.runner.run(ctx, &rollback).await {
            Ok(()) => {
                warn!("release {} rolled back after failed tests", self.release);
                Err(HelmError::wrap(
                    test_err,
                    ROLLBACK_SUCCESS,
                    ErrorKind::RollbackSuccess,
                ))
            }
            Err(rollback_err) => {
                error!("ROLLBACK FAILED: {}", rollback_err);
                Err(HelmError::wrap(
                    rollback_err,
                    ROLLBACK_FAILED,
                    ErrorKind::RollbackFailed,
                ))
            }
        }
    }
}

fn helm_release_command(args: &[&str], release: &str) -> ProcessCommand {
    helm(args.iter().copied().chain([release]))
}
