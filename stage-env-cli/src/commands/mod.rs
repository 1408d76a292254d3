//! Command handlers -- one module per subcommand
//!
//! Handlers that touch the node cluster are generic over the runner and the
//! container probe so they can be driven by scripted runners in tests. The
//! binary wires them to [`DockerExecRunner`] and [`BollardProbe`].

pub mod config;
pub mod datum;
pub mod health;
pub mod run;
pub mod wait_ready;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use stage_env_core::config::StageEnvConfig;
use stage_env_core::error::StageEnvError;
use stage_env_monitoring::MonitoringContext;
use stage_env_runner::{BollardProbe, DockerExecRunner};

use crate::error::CliError;

/// Configuration file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "stage-env.toml";

/// Monitoring context backed by real containers.
pub type LiveContext = MonitoringContext<DockerExecRunner, BollardProbe>;

/// Resolve the configuration file to read, if any.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
        fallback.exists().then_some(fallback)
    })
}

/// Human-readable name of the configuration source.
pub fn describe_source(path: Option<&Path>) -> String {
    path.map_or_else(
        || "(defaults + environment)".to_owned(),
        |p| p.display().to_string(),
    )
}

/// Load the effective configuration.
///
/// Without a file the built-in defaults are used; environment overrides and
/// validation apply in both cases.
pub async fn load_config(path: Option<&Path>) -> Result<StageEnvConfig, StageEnvError> {
    match path {
        Some(path) => StageEnvConfig::load(path).await,
        None => {
            let mut config = StageEnvConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Connect to the local Docker daemon and build the shared monitoring context.
pub fn connect(config: StageEnvConfig) -> Result<Arc<LiveContext>, CliError> {
    let runner = DockerExecRunner::from_config(&config.runner)
        .map_err(|e| CliError::Command(format!("failed to create node runner: {e}")))?;
    let probe = BollardProbe::connect_local()
        .map_err(|e| CliError::Command(format!("failed to connect to docker: {e}")))?;
    Ok(Arc::new(MonitoringContext::new(
        Arc::new(runner),
        probe,
        config,
    )))
}
