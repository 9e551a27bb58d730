//! From plugin settings to a finished deployment.
//!
//! Writes the kubeconfig, expands values, maps the settings onto helm
//! options, runs the plan and hands the result to a status reporter.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError};
use crate::envsubst::expand_env;
use crate::helm::{format_duration, HelmCommand, HelmMode, HelmOption};
use crate::kube::KubeConfig;
use crate::status::StatusReporter;
use crate::subprocess::{ProcessRunner, RunContext};

/// Extra time granted on top of the helm timeout before the run is cut off.
pub const GRACE_PERIOD: Duration = Duration::from_secs(60);

const SUCCESS_MESSAGE: &str = "finished deployment successfully";

/// Run a full deployment and report its outcome.
pub async fn deploy(
    config: Config,
    runner: Arc<dyn ProcessRunner>,
    reporter: &dyn StatusReporter,
) -> ExitCode {
    let timeout = config.timeout;
    let cmd = match prepare(config, runner) {
        Ok(cmd) => cmd,
        Err(e) => return reporter.fatal(&e),
    };
    debug!("plan: {:?}", cmd);

    info!("running with a timeout of {}", format_duration(timeout));
    let ctx = RunContext::with_timeout(timeout + GRACE_PERIOD);
    let signals = tokio::spawn(listen_for_shutdown_signals(ctx.cancellation_token()));

    let result = cmd.run(&ctx).await;
    signals.abort();

    reporter.status(&result, SUCCESS_MESSAGE).await
}

/// Everything that happens before the first subprocess.
pub fn prepare(mut config: Config, runner: Arc<dyn ProcessRunner>) -> anyhow::Result<HelmCommand> {
    if config.kube_skip {
        info!("skipping kubeconfig creation");
    } else {
        KubeConfig::from_parts(config.kube_config_parts())
            .and_then(|kube| kube.write())
            .context("unable to create kubernetes config")?;
    }

    if config.envsubst {
        info!("envsubst is enabled");
        substitute_values(&mut config)?;
    }

    let options = helm_options(&config, runner)?;
    HelmCommand::new(config.mode, options).context("unable to generate helm command")
}

fn substitute_values(config: &mut Config) -> anyhow::Result<()> {
    for value in config
        .values
        .iter_mut()
        .chain(config.values_string.iter_mut())
    {
        let expanded =
            expand_env(value).with_context(|| format!("unable to envsubst {value}"))?;
        *value = expanded;
    }
    Ok(())
}

/// Map the settings onto helm options, in the order they end up on the
/// command line.
///
/// Dependency updates replace dependency builds and a test rollback turns
/// tests on. Uninstalling only receives the options `helm uninstall`
/// understands.
pub fn helm_options(
    config: &Config,
    runner: Arc<dyn ProcessRunner>,
) -> Result<Vec<HelmOption>, ConfigError> {
    let chart = config.chart().to_string();
    let build_dependencies = config.build_dependencies && !config.update_dependencies;
    let test = config.test || config.test_rollback;
    let kube_config = config.kube_config.to_string_lossy().into_owned();

    let mut options = match config.mode {
        HelmMode::InstallUpgrade => vec![
            HelmOption::Chart(chart.clone()),
            HelmOption::Release(config.release.clone()),
            HelmOption::Namespace(config.namespace.clone()),
            HelmOption::Timeout(config.timeout),
            HelmOption::Lint(config.lint),
            HelmOption::Atomic(config.atomic),
            HelmOption::Wait(config.wait),
            HelmOption::Force(config.force),
            HelmOption::CleanupOnFail(config.cleanup_on_fail),
            HelmOption::DryRun(config.dry_run),
            HelmOption::Debug(config.helm_debug),
            HelmOption::DisableOpenApiValidation(config.disable_openapi_validation),
            HelmOption::HelmRepos(non_empty(&config.helm_repos)),
            HelmOption::BuildDependencies {
                enabled: build_dependencies,
                chart: chart.clone(),
            },
            HelmOption::UpdateDependencies {
                enabled: config.update_dependencies,
                chart: chart.clone(),
            },
            HelmOption::Test(test),
            HelmOption::TestRollback(config.test_rollback),
            HelmOption::Values(non_empty(&config.values)),
            HelmOption::ValuesString(non_empty(&config.values_string)),
            HelmOption::ValuesYaml(config.values_yaml.clone().unwrap_or_default()),
            HelmOption::ValuesYamlAddDefault {
                enabled: config.values_yaml_add_default,
                chart_dir: chart.clone().into(),
            },
            HelmOption::PostKustomization {
                kustomization: config.post_kustomization.clone().unwrap_or_default(),
                dir: config.kustomize_dir.clone(),
            },
        ],
        HelmMode::Uninstall => vec![
            HelmOption::Release(config.release.clone()),
            HelmOption::Namespace(config.namespace.clone()),
            HelmOption::Timeout(config.timeout),
            HelmOption::Wait(config.wait),
            HelmOption::DryRun(config.dry_run),
            HelmOption::Debug(config.helm_debug),
        ],
    };

    for tokens in config.pre_command_tokens()? {
        options.push(HelmOption::PreCommand(tokens));
    }
    for tokens in config.post_command_tokens()? {
        options.push(HelmOption::PostCommand(tokens));
    }
    options.push(HelmOption::KubeConfig(kube_config));
    options.push(HelmOption::Runner(runner));

    Ok(options)
}

fn non_empty(items: &[String]) -> Vec<String> {
    items.iter().filter(|s| !s.is_empty()).cloned().collect()
}

/// Cancels `token` on SIGINT or SIGTERM.
pub async fn listen_for_shutdown_signals(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigint, mut sigterm) =
            match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
                (Err(e), _) | (_, Err(e)) => {
                    warn!("unable to install signal handlers: {}", e);
                    return;
                }
            };

        tokio::select! {
            _ = sigint.recv() => warn!("received SIGINT, cancelling deployment"),
            _ = sigterm.recv() => warn!("received SIGTERM, cancelling deployment"),
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("unable to listen for ctrl-c: {}", e);
            return;
        }
        warn!("received ctrl-c, cancelling deployment");
    }

    token.cancel();
}
