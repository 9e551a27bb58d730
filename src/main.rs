use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, info, trace, warn};
use tracing_subscriber::EnvFilter;

use drone_helm3::config::{load_env_file, Config, ENV_FILE_VAR};
use drone_helm3::deploy::deploy;
use drone_helm3::status::{LogReporter, PushgatewayReporter, StatusReporter};
use drone_helm3::subprocess;

fn main() -> ExitCode {
    // The env file has to be loaded before any other thread exists.
    let env_file = std::env::var_os(ENV_FILE_VAR).map(PathBuf::from);
    let env_file_result = env_file.as_deref().map(load_env_file);

    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.verbose >= 2)
        .init();

    if let (Some(path), Some(result)) = (&env_file, env_file_result) {
        info!("loading envfile {:?}", path);
        match result {
            Ok(count) => debug!("loaded {} variables from envfile", count),
            Err(e) => warn!("unable to load environment from file: {}", e),
        }
    }
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    if config.debug {
        info!("configuration: {:?}", config.redacted());
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: unable to start tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async move {
        let reporter = reporter(&config);
        deploy(config, subprocess::production(), reporter.as_ref()).await
    })
}

fn reporter(config: &Config) -> Box<dyn StatusReporter> {
    let Some(url) = config.pushgateway_url.as_deref().filter(|url| !url.is_empty()) else {
        return Box::new(LogReporter);
    };
    info!("pushgateway is {}", url);
    match PushgatewayReporter::new(url, &config.drone_repo, &config.namespace, &config.release) {
        Ok(reporter) => Box::new(reporter),
        Err(e) => {
            warn!("{}, status will only be logged", e);
            Box::new(LogReporter)
        }
    }
}
