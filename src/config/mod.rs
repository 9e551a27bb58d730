//! Plugin settings.
//!
//! Drone hands plugin settings over as `PLUGIN_*` environment variables;
//! every setting can also be given as a command line flag, which is handy
//! when running the binary by hand.

mod env_file;

pub use env_file::{load_env_file, parse_env_file, EnvFileError};

use std::path::PathBuf;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use thiserror::Error;

use crate::helm::HelmMode;
use crate::kube::KubeConfigParts;
use crate::subprocess::{redact_pair, REDACTED};

/// Names a dotenv file loaded before the settings are parsed.
pub const ENV_FILE_VAR: &str = "PLUGIN_ENV_FILE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to parse {kind} command {command:?}: {source}")]
    Command {
        kind: &'static str,
        command: String,
        #[source]
        source: shell_words::ParseError,
    },
}

/// Deploy a helm chart from a Drone pipeline
#[derive(Debug, Clone, Parser)]
#[command(name = "drone-helm3", version, long_about = None)]
pub struct Config {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Log the effective configuration, secrets masked
    #[arg(long, env = "PLUGIN_DEBUG", default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub debug: bool,

    /// Use the existing kubeconfig instead of writing one
    #[arg(long, env = "PLUGIN_KUBE_SKIP", default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub kube_skip: bool,

    /// Path of the kubeconfig to write and hand to helm
    #[arg(long, env = "PLUGIN_KUBE_CONFIG", default_value = "/root/.kube/config")]
    pub kube_config: PathBuf,

    #[arg(long, env = "PLUGIN_KUBE_API_SERVER")]
    pub kube_api_server: Option<String>,

    #[arg(long, env = "PLUGIN_KUBE_TOKEN")]
    pub kube_token: Option<String>,

    /// Base64 encoded CA bundle of the api server
    #[arg(long, env = "PLUGIN_KUBE_CERTIFICATE")]
    pub kube_certificate: Option<String>,

    #[arg(long, env = "PLUGIN_KUBE_SKIP_TLS", default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub kube_skip_tls: bool,

    /// EKS cluster id, authenticates through aws-iam-authenticator
    #[arg(long, env = "PLUGIN_EKS_CLUSTER")]
    pub eks_cluster: Option<String>,

    #[arg(long, env = "PLUGIN_EKS_ROLE_ARN")]
    pub eks_role_arn: Option<String>,

    /// Prometheus Pushgateway receiving the deployment status
    #[arg(long, env = "PLUGIN_PUSHGATEWAY_URL")]
    pub pushgateway_url: Option<String>,

    /// installupgrade or uninstall
    #[arg(long, env = "PLUGIN_MODE", default_value = "installupgrade")]
    pub mode: HelmMode,

    /// Chart to deploy, required for installupgrade
    #[arg(long, env = "PLUGIN_CHART")]
    pub chart: Option<String>,

    #[arg(long, env = "PLUGIN_RELEASE")]
    pub release: String,

    #[arg(long, env = "PLUGIN_NAMESPACE")]
    pub namespace: String,

    #[arg(long, env = "PLUGIN_LINT", default_value_t = true, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub lint: bool,

    #[arg(long, env = "PLUGIN_ATOMIC", default_value_t = true, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub atomic: bool,

    #[arg(long, env = "PLUGIN_WAIT", default_value_t = true, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub wait: bool,

    #[arg(long, env = "PLUGIN_FORCE", default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub force: bool,

    #[arg(long, env = "PLUGIN_CLEANUP_ON_FAIL", default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub cleanup_on_fail: bool,

    #[arg(long, env = "PLUGIN_DRY_RUN", default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub dry_run: bool,

    /// Pass --debug to helm
    #[arg(long, env = "PLUGIN_HELM_DEBUG", default_value_t = true, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub helm_debug: bool,

    #[arg(long, env = "PLUGIN_DISABLE_OPENAPI_VALIDATION", default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub disable_openapi_validation: bool,

    /// Extra chart repositories as name=url
    #[arg(long, env = "PLUGIN_HELM_REPOS", value_delimiter = ',')]
    pub helm_repos: Vec<String>,

    #[arg(long, env = "PLUGIN_BUILD_DEPENDENCIES", default_value_t = true, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub build_dependencies: bool,

    /// Run `helm dependency update`; turns off dependency builds
    #[arg(long, env = "PLUGIN_UPDATE_DEPENDENCIES", default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub update_dependencies: bool,

    /// Run `helm test` after deploying
    #[arg(long, env = "PLUGIN_TEST", default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub test: bool,

    /// Roll back when tests fail; implies --test
    #[arg(long, env = "PLUGIN_TEST_ROLLBACK", default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub test_rollback: bool,

    /// Expand environment variables in --values and --values-string
    #[arg(long, env = "PLUGIN_ENVSUBST", default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub envsubst: bool,

    /// key=value pairs passed with --set
    #[arg(long, env = "PLUGIN_VALUES", value_delimiter = ',')]
    pub values: Vec<String>,

    /// key=value pairs passed with --set-string
    #[arg(long, env = "PLUGIN_VALUES_STRING", value_delimiter = ',')]
    pub values_string: Vec<String>,

    /// Additional values file
    #[arg(long, env = "PLUGIN_VALUES_YAML")]
    pub values_yaml: Option<String>,

    /// Also pass the chart's own values.yaml
    #[arg(long, env = "PLUGIN_VALUES_YAML_ADD_DEFAULT", default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub values_yaml_add_default: bool,

    /// Kustomization appended before rendering through kustomize
    #[arg(long, env = "PLUGIN_POST_KUSTOMIZATION")]
    pub post_kustomization: Option<String>,

    #[arg(long, env = "PLUGIN_KUSTOMIZE_DIR", default_value = "/kustomize")]
    pub kustomize_dir: PathBuf,

    /// Commands run before helm, comma separated
    #[arg(long, env = "PLUGIN_PRE_COMMANDS", value_delimiter = ',')]
    pub pre_commands: Vec<String>,

    /// Commands run after a successful deployment, comma separated
    #[arg(long, env = "PLUGIN_POST_COMMANDS", value_delimiter = ',')]
    pub post_commands: Vec<String>,

    /// Timeout handed to helm, e.g. 15m or 1h30m
    #[arg(long, env = "PLUGIN_TIMEOUT", default_value = "15m", value_parser = humantime::parse_duration)]
    pub timeout: Duration,

    /// Repository being built, set by Drone
    #[arg(long, env = "DRONE_REPO")]
    pub drone_repo: String,
}

impl Config {
    /// A copy safe to log: the token and every `--set`/`--set-string`
    /// value are masked.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.kube_token.is_some() {
            config.kube_token = Some(REDACTED.to_string());
        }
        config.values = self.values.iter().map(|v| redact_pair(v)).collect();
        config.values_string = self.values_string.iter().map(|v| redact_pair(v)).collect();
        config
    }

    /// Log filter used when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> &'static str {
        match (self.verbose, self.debug) {
            (0, false) => "info",
            (0, true) | (1, _) => "debug",
            _ => "trace",
        }
    }

    pub fn chart(&self) -> &str {
        self.chart.as_deref().unwrap_or_default()
    }

    pub fn pre_command_tokens(&self) -> Result<Vec<Vec<String>>, ConfigError> {
        split_commands("pre", &self.pre_commands)
    }

    pub fn post_command_tokens(&self) -> Result<Vec<Vec<String>>, ConfigError> {
        split_commands("post", &self.post_commands)
    }

    pub fn kube_config_parts(&self) -> KubeConfigParts {
        KubeConfigParts {
            path: self.kube_config.clone(),
            api_server: self.kube_api_server.clone().unwrap_or_default(),
            token: self.kube_token.clone().unwrap_or_default(),
            certificate: self.kube_certificate.clone().unwrap_or_default(),
            skip_tls: self.kube_skip_tls,
            namespace: self.namespace.clone(),
            eks_cluster: self.eks_cluster.clone().unwrap_or_default(),
            eks_role_arn: self.eks_role_arn.clone().unwrap_or_default(),
        }
    }
}

/// Split command lines into argv, skipping blank entries.
fn split_commands(
    kind: &'static str,
    commands: &[String],
) -> Result<Vec<Vec<String>>, ConfigError> {
    commands
        .iter()
        .filter(|command| !command.trim().is_empty())
        .map(|command| {
            shell_words::split(command).map_err(|source| ConfigError::Command {
                kind,
                command: command.clone(),
                source,
            })
        })
        .collect()
}
