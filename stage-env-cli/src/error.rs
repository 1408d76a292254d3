//! CLI-specific error types and exit code mapping

use stage_env_core::error::StageEnvError;
use stage_env_monitoring::MonitoringError;
use stage_env_scenario::ScenarioError;

/// CLI-specific error type.
///
/// `exit_code()` maps each variant to the process exit status.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// At least one scenario failed.
    #[error("{failed} of {total} scenario(s) failed")]
    ScenarioFailed { failed: usize, total: usize },

    /// The suite setup scenario failed, so no scenario ran.
    #[error("suite setup failed, {skipped} scenario(s) skipped")]
    SuiteSetupFailed { skipped: usize },

    /// The cluster did not become ready, or a wait timed out.
    #[error("{0}")]
    NotReady(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                |
    /// |------|----------------------------------------|
    /// | 0    | Success                                |
    /// | 1    | Scenario or command failure            |
    /// | 2    | Configuration error                    |
    /// | 3    | Network not ready / timeout            |
    /// | 10   | IO error                               |
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::NotReady(_) => 3,
            Self::Io(_) => 10,
            Self::Command(_)
            | Self::ScenarioFailed { .. }
            | Self::SuiteSetupFailed { .. }
            | Self::JsonSerialize(_) => 1,
        }
    }
}

impl From<StageEnvError> for CliError {
    fn from(err: StageEnvError) -> Self {
        match err {
            StageEnvError::Config(e) => Self::Config(e.to_string()),
            StageEnvError::Io(e) => Self::Io(e),
            other => Self::Command(other.to_string()),
        }
    }
}

impl From<MonitoringError> for CliError {
    fn from(err: MonitoringError) -> Self {
        match err {
            MonitoringError::ConsensusTimeout { .. } | MonitoringError::HealthTimeout { .. } => {
                Self::NotReady(err.to_string())
            }
            MonitoringError::Config { .. } => Self::Config(err.to_string()),
            other => Self::Command(other.to_string()),
        }
    }
}

impl From<ScenarioError> for CliError {
    fn from(err: ScenarioError) -> Self {
        Self::Command(err.to_string())
    }
}
