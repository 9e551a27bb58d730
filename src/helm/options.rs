//! Options accepted by [`HelmCommand::new`](super::HelmCommand::new).
//!
//! Options are applied strictly in the order given. Flags and pre/post
//! commands are appended, never merged or sorted, so two differently
//! ordered option lists can produce different command lines.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::command::{helm, HelmMode};
use super::error::PlanError;
use crate::subprocess::{ProcessCommand, ProcessRunner};

/// One configuration effect on the plan being built.
#[derive(Clone)]
pub enum HelmOption {
    Release(String),
    Chart(String),
    /// `-n <namespace>`
    Namespace(String),
    /// Pre-command `helm lint <chart>`. It keeps its place among the
    /// pre-commands but lints the chart the plan ends up with.
    Lint(bool),
    Atomic(bool),
    Wait(bool),
    Force(bool),
    CleanupOnFail(bool),
    DryRun(bool),
    Debug(bool),
    DisableOpenApiValidation(bool),
    /// `--timeout <duration>`
    Timeout(Duration),
    /// `name=url` pairs, each added with `helm repo add`, followed by one
    /// `helm repo update`.
    HelmRepos(Vec<String>),
    BuildDependencies {
        enabled: bool,
        chart: String,
    },
    UpdateDependencies {
        enabled: bool,
        chart: String,
    },
    /// `key=value` pairs passed with `--set`.
    Values(Vec<String>),
    /// `key=value` pairs passed with `--set-string`.
    ValuesString(Vec<String>),
    /// `--values <file>`, skipped when empty.
    ValuesYaml(String),
    /// `--values <chart_dir>/values.yaml`; the file must exist.
    ValuesYamlAddDefault {
        enabled: bool,
        chart_dir: PathBuf,
    },
    /// Appends to `<dir>/kustomization.yaml` and renders through
    /// `<dir>/kustomize.sh`.
    PostKustomization {
        kustomization: String,
        dir: PathBuf,
    },
    PreCommand(Vec<String>),
    PostCommand(Vec<String>),
    /// `--kubeconfig <path>`, skipped when empty.
    KubeConfig(String),
    Test(bool),
    /// Roll back when tests fail; enabling it enables tests as well.
    TestRollback(bool),
    Runner(Arc<dyn ProcessRunner>),
}

impl HelmOption {
    pub fn runner<R: ProcessRunner + 'static>(runner: R) -> Self {
        HelmOption::Runner(Arc::new(runner))
    }

    pub(super) fn apply(self, draft: &mut Draft) -> Result<(), PlanError> {
        match self {
            HelmOption::Release(release) => draft.release = release,
            HelmOption::Chart(chart) => draft.chart = chart,
            HelmOption::Namespace(namespace) => {
                draft.args.push("-n".to_string());
                draft.args.push(namespace);
            }
            HelmOption::Lint(enabled) => {
                if enabled {
                    draft.lint_at.push(draft.pre_commands.len());
                }
            }
            HelmOption::Atomic(enabled) => draft.flag(enabled, "--atomic"),
            HelmOption::Wait(enabled) => draft.flag(enabled, "--wait"),
            HelmOption::Force(enabled) => draft.flag(enabled, "--force"),
            HelmOption::CleanupOnFail(enabled) => draft.flag(enabled, "--cleanup-on-fail"),
            HelmOption::DryRun(enabled) => draft.flag(enabled, "--dry-run"),
            HelmOption::Debug(enabled) => draft.flag(enabled, "--debug"),
            HelmOption::DisableOpenApiValidation(enabled) => {
                draft.flag(enabled, "--disable-openapi-validation")
            }
            HelmOption::Timeout(timeout) => {
                draft.args.push("--timeout".to_string());
                draft.args.push(format_duration(timeout));
            }
            HelmOption::HelmRepos(repos) => {
                if repos.is_empty() {
                    return Ok(());
                }
                for repo in &repos {
                    let (name, url) = split_pair(repo)?;
                    debug!("added repo: name:{:?} url:{:?}", name, url);
                    draft.pre_commands.push(helm(["repo", "add", name, url]));
                }
                draft.pre_commands.push(helm(["repo", "update"]));
            }
            HelmOption::BuildDependencies { enabled, chart } => {
                if enabled {
                    draft
                        .pre_commands
                        .push(helm(["dependency", "build", chart.as_str()]));
                }
            }
            HelmOption::UpdateDependencies { enabled, chart } => {
                if enabled {
                    draft
                        .pre_commands
                        .push(helm(["dependency", "update", chart.as_str()]));
                }
            }
            HelmOption::Values(values) => draft.set_values("--set", &values)?,
            HelmOption::ValuesString(values) => draft.set_values("--set-string", &values)?,
            HelmOption::ValuesYaml(file) => {
                if !file.is_empty() {
                    draft.args.push("--values".to_string());
                    draft.args.push(file);
                }
            }
            HelmOption::ValuesYamlAddDefault { enabled, chart_dir } => {
                if enabled {
                    let file = chart_dir.join("values.yaml");
                    if !file.exists() {
                        return Err(PlanError::MissingDefaultValues(file));
                    }
                    draft.args.push("--values".to_string());
                    draft.args.push(file.to_string_lossy().into_owned());
                }
            }
            HelmOption::PostKustomization { kustomization, dir } => {
                if !kustomization.is_empty() {
                    append_kustomization(&dir, &kustomization)?;
                    draft.args.push("--post-renderer".to_string());
                    draft
                        .args
                        .push(dir.join("kustomize.sh").to_string_lossy().into_owned());
                }
            }
            HelmOption::PreCommand(tokens) => {
                let command =
                    ProcessCommand::from_tokens(tokens).ok_or(PlanError::EmptyCommand("pre"))?;
                draft.pre_commands.push(command);
            }
            HelmOption::PostCommand(tokens) => {
                let command =
                    ProcessCommand::from_tokens(tokens).ok_or(PlanError::EmptyCommand("post"))?;
                draft.post_commands.push(command);
            }
            HelmOption::KubeConfig(path) => {
                if !path.is_empty() {
                    draft.args.push("--kubeconfig".to_string());
                    draft.args.push(path);
                }
            }
            HelmOption::Test(enabled) => draft.test = enabled,
            HelmOption::TestRollback(enabled) => {
                draft.test_rollback = enabled;
                if enabled {
                    draft.test = true;
                }
            }
            HelmOption::Runner(runner) => draft.runner = Some(runner),
        }
        Ok(())
    }
}

/// Plan under construction.
pub(super) struct Draft {
    pub(super) release: String,
    pub(super) chart: String,
    pub(super) args: Vec<String>,
    pub(super) pre_commands: Vec<ProcessCommand>,
    /// Pre-command positions where `helm lint` goes once the chart is known.
    pub(super) lint_at: Vec<usize>,
    pub(super) post_commands: Vec<ProcessCommand>,
    pub(super) test: bool,
    pub(super) test_rollback: bool,
    pub(super) runner: Option<Arc<dyn ProcessRunner>>,
}

impl Draft {
    /// Start a plan whose arguments already hold the mode prefix.
    pub(super) fn new(mode: HelmMode) -> Self {
        Self {
            release: String::new(),
            chart: String::new(),
            args: mode.prefix().iter().map(|s| s.to_string()).collect(),
            pre_commands: Vec::new(),
            lint_at: Vec::new(),
            post_commands: Vec::new(),
            test: false,
            test_rollback: false,
            runner: None,
        }
    }

    fn flag(&mut self, enabled: bool, flag: &str) {
        if enabled {
            self.args.push(flag.to_string());
        }
    }

    fn set_values(&mut self, flag: &str, values: &[String]) -> Result<(), PlanError> {
        for value in values {
            let (key, value) = split_pair(value)?;
            self.args.push(flag.to_string());
            self.args.push(format!("{key}={value}"));
        }
        Ok(())
    }
}

fn split_pair(pair: &str) -> Result<(&str, &str), PlanError> {
    pair.split_once('=')
        .ok_or_else(|| PlanError::InvalidKeyValue(pair.to_string()))
}

fn append_kustomization(dir: &std::path::Path, kustomization: &str) -> Result<(), PlanError> {
    let path = dir.join("kustomization.yaml");
    let to_plan_error = |source| PlanError::Kustomization {
        path: path.clone(),
        source,
    };
    let mut file = OpenOptions::new()
        .append(true)
        .open(&path)
        .map_err(to_plan_error)?;
    file.write_all(kustomization.as_bytes())
        .map_err(to_plan_error)?;
    Ok(())
}

/// Render a duration the way helm's `--timeout` flag prints it,
/// e.g. `15m0s`, `1h0m0s`, `1.5s` or `250ms`.
pub fn format_duration(duration: Duration) -> String {
    const NANOS_PER_SEC: u128 = 1_000_000_000;

    let nanos = duration.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < NANOS_PER_SEC {
        let (unit, scale) = if nanos < 1_000 {
            ("ns", 1)
        } else if nanos < 1_000_000 {
            ("µs", 1_000)
        } else {
            ("ms", 1_000_000)
        };
        return format!("{}{unit}", decimal(nanos, scale));
    }

    let secs = duration.as_secs();
    let (hours, minutes) = (secs / 3600, (secs % 3600) / 60);
    let mut out = String::new();
    if hours > 0 {
        let _ = write!(out, "{hours}h");
    }
    if hours > 0 || minutes > 0 {
        let _ = write!(out, "{minutes}m");
    }
    let seconds = u128::from(secs % 60) * NANOS_PER_SEC + u128::from(duration.subsec_nanos());
    let _ = write!(out, "{}s", decimal(seconds, NANOS_PER_SEC));
    out
}

/// `value / scale` with trailing zeros of the fraction dropped.
fn decimal(value: u128, scale: u128) -> String {
    let whole = value / scale;
    let fraction = value % scale;
    if fraction == 0 {
        return whole.to_string();
    }
    let width = scale.ilog10() as usize;
    let digits = format!("{fraction:0width$}");
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(15 * 60)), "15m0s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h0m0s");
        assert_eq!(format_duration(Duration::from_secs(5400)), "1h30m0s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_micros(1500)), "1.5ms");
        assert_eq!(format_duration(Duration::from_nanos(7)), "7ns");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn test_split_pair() {
        assert_eq!(split_pair("a=b").unwrap(), ("a", "b"));
        assert_eq!(split_pair("a=b=c").unwrap(), ("a", "b=c"));
        assert_eq!(split_pair("a=").unwrap(), ("a", ""));
        assert!(matches!(
            split_pair("novalue"),
            Err(PlanError::InvalidKeyValue(pair)) if pair == "novalue"
        ));
    }

    #[test]
    fn test_options_append_in_order() {
        let mut draft = Draft::new(HelmMode::InstallUpgrade);
        for option in [
            HelmOption::Wait(true),
            HelmOption::Namespace("ns".into()),
            HelmOption::Atomic(false),
            HelmOption::Values(vec!["a=1".into(), "b=2".into()]),
            HelmOption::Force(true),
        ] {
            option.apply(&mut draft).unwrap();
        }

        assert_eq!(
            draft.args,
            vec![
                "upgrade", "--install", "--wait", "-n", "ns", "--set", "a=1", "--set", "b=2",
                "--force"
            ]
        );
    }

    #[test]
    fn test_lint_records_its_position() {
        let mut draft = Draft::new(HelmMode::InstallUpgrade);
        for option in [
            HelmOption::Lint(false),
            HelmOption::PreCommand(vec!["echo".into(), "first".into()]),
            HelmOption::Lint(true),
        ] {
            option.apply(&mut draft).unwrap();
        }

        assert_eq!(draft.lint_at, vec![1]);
        assert_eq!(draft.pre_commands.len(), 1);
    }

    #[test]
    fn test_test_rollback_enables_test() {
        let mut draft = Draft::new(HelmMode::InstallUpgrade);
        HelmOption::TestRollback(true).apply(&mut draft).unwrap();
        assert!(draft.test);
        assert!(draft.test_rollback);

        let mut draft = Draft::new(HelmMode::InstallUpgrade);
        HelmOption::TestRollback(false).apply(&mut draft).unwrap();
        assert!(!draft.test);
    }

    #[test]
    fn test_empty_pre_command_is_rejected() {
        let mut draft = Draft::new(HelmMode::InstallUpgrade);
        assert!(matches!(
            HelmOption::PreCommand(Vec::new()).apply(&mut draft),
            Err(PlanError::EmptyCommand("pre"))
        ));
    }

    #[test]
    fn test_post_kustomization_appends_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kustomization.yaml"), "resources: []\n").unwrap();

        let mut draft = Draft::new(HelmMode::InstallUpgrade);
        HelmOption::PostKustomization {
            kustomization: "namePrefix: dev-\n".into(),
            dir: dir.path().to_path_buf(),
        }
        .apply(&mut draft)
        .unwrap();

        let written = std::fs::read_to_string(dir.path().join("kustomization.yaml")).unwrap();
        assert_eq!(written, "resources: []\nnamePrefix: dev-\n");
        let renderer = dir.path().join("kustomize.sh").to_string_lossy().into_owned();
        assert_eq!(draft.args[2..], ["--post-renderer".to_string(), renderer]);
    }

    #[test]
    fn test_post_kustomization_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut draft = Draft::new(HelmMode::InstallUpgrade);
        let result = HelmOption::PostKustomization {
            kustomization: "namePrefix: dev-\n".into(),
            dir: dir.path().to_path_buf(),
        }
        .apply(&mut draft);

        assert!(matches!(result, Err(PlanError::Kustomization { .. })));
    }
}
