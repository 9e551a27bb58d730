use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::error::PlanError;
use super::options::{Draft, HelmOption};
use crate::subprocess::{redact_args, ProcessCommand, ProcessRunner};

/// Executable every helm invocation goes through.
pub const HELM: &str = "helm";

/// `helm <args..>`
pub(super) fn helm<I, S>(args: I) -> ProcessCommand
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ProcessCommand {
        program: HELM.to_string(),
        args: args.into_iter().map(Into::into).collect(),
    }
}

/// What the main helm invocation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelmMode {
    /// `helm upgrade --install <release> <chart>`
    InstallUpgrade,
    /// `helm uninstall <release>`
    Uninstall,
}

impl HelmMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HelmMode::InstallUpgrade => "installupgrade",
            HelmMode::Uninstall => "uninstall",
        }
    }

    /// Leading arguments of the main invocation, written before any option.
    pub(super) fn prefix(&self) -> &'static [&'static str] {
        match self {
            HelmMode::InstallUpgrade => &["upgrade", "--install"],
            HelmMode::Uninstall => &["uninstall"],
        }
    }
}

impl FromStr for HelmMode {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "installupgrade" => Ok(HelmMode::InstallUpgrade),
            "uninstall" => Ok(HelmMode::Uninstall),
            other => Err(PlanError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for HelmMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated deployment plan: the pre-commands, the main helm
/// invocation, the test/rollback policy and the post-commands.
///
/// Built once with [`HelmCommand::new`] and never modified afterwards;
/// [`HelmCommand::run`] only reads it.
pub struct HelmCommand {
    pub(super) mode: HelmMode,
    pub(super) release: String,
    pub(super) chart: Option<String>,
    pub(super) args: Vec<String>,
    pub(super) pre_commands: Vec<ProcessCommand>,
    pub(super) post_commands: Vec<ProcessCommand>,
    pub(super) test: bool,
    pub(super) test_rollback: bool,
    pub(super) runner: Arc<dyn ProcessRunner>,
}

impl HelmCommand {
    /// Apply `options` in order on top of the mode prefix, then validate.
    ///
    /// Validation checks the release, then the chart (install-upgrade only),
    /// then the runner, and stops at the first violation. Requested lints are
    /// resolved against the final chart only after validation passed.
    pub fn new<I>(mode: HelmMode, options: I) -> Result<Self, PlanError>
    where
        I: IntoIterator<Item = HelmOption>,
    {
        let mut draft = Draft::new(mode);
        for option in options {
            option.apply(&mut draft)?;
        }

        let Draft {
            release,
            chart,
            mut args,
            mut pre_commands,
            lint_at,
            post_commands,
            test,
            test_rollback,
            runner,
        } = draft;

        if release.is_empty() {
            return Err(PlanError::MissingRelease);
        }
        if chart.is_empty() && mode == HelmMode::InstallUpgrade {
            return Err(PlanError::MissingChart);
        }
        let runner = runner.ok_or(PlanError::MissingRunner)?;

        // Uninstall plans may have no chart to lint
        if !chart.is_empty() {
            for &at in lint_at.iter().rev() {
                pre_commands.insert(at, helm(["lint", chart.as_str()]));
            }
        }

        let chart = match mode {
            HelmMode::InstallUpgrade => {
                args.push(release.clone());
                args.push(chart.clone());
                Some(chart)
            }
            HelmMode::Uninstall => {
                args.push(release.clone());
                None
            }
        };

        Ok(Self {
            mode,
            release,
            chart,
            args,
            pre_commands,
            post_commands,
            test,
            test_rollback,
            runner,
        })
    }

    pub fn mode(&self) -> HelmMode {
        self.mode
    }

    pub fn release(&self) -> &str {
        &self.release
    }

    pub fn chart(&self) -> Option<&str> {
        self.chart.as_deref()
    }

    /// Arguments of the main helm invocation.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn pre_commands(&self) -> &[ProcessCommand] {
        &self.pre_commands
    }

    pub fn post_commands(&self) -> &[ProcessCommand] {
        &self.post_commands
    }

    pub fn test(&self) -> bool {
        self.test
    }

    pub fn test_rollback(&self) -> bool {
        self.test_rollback
    }

    pub fn main_command(&self) -> ProcessCommand {
        helm(self.args.iter().cloned())
    }
}

impl fmt::Debug for HelmCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HelmCommand")
            .field("mode", &self.mode)
            .field("release", &self.release)
            .field("chart", &self.chart)
            .field("args", &redact_args(&self.args))
            .field("pre_commands", &self.pre_commands)
            .field("post_commands", &self.post_commands)
            .field("test", &self.test)
            .field("test_rollback", &self.test_rollback)
            .finish_non_exhaustive()
    }
}
