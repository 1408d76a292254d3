//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no I/O happens here.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use stage_env_monitoring::CheckKind;

/// stage-env -- declarative scenario runner for a Cellframe stage network.
///
/// Use `stage-env <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "stage-env", version, about, long_about = None)]
pub struct Cli {
    /// Path to the stage-env.toml configuration file.
    ///
    /// When omitted, `stage-env.toml` in the working directory is used if it
    /// exists; otherwise built-in defaults plus environment overrides apply.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Colored human-readable text.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute one or more scenario files in order.
    Run(RunArgs),

    /// Wait until the node cluster reaches a ready consensus state.
    WaitReady(WaitReadyArgs),

    /// Follow a datum until it lands in a block or fails.
    Datum(DatumArgs),

    /// Probe every configured node.
    Health(HealthArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- run ----

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Scenario YAML files, executed sequentially.
    #[arg(required = true)]
    pub scenarios: Vec<PathBuf>,

    /// Setup-only scenario executed once before the suite. When it fails, no
    /// scenario runs.
    #[arg(long, value_name = "PATH")]
    pub suite_setup: Option<PathBuf>,

    /// Wait up to N seconds for network readiness before the first scenario.
    #[arg(long, value_name = "SECS")]
    pub wait_ready: Option<u64>,

    /// JSON cache of per-command CLI options. Discovered from the first node
    /// and written here when the file does not exist yet.
    #[arg(long, value_name = "PATH")]
    pub options_cache: Option<PathBuf>,

    /// Stop after the first failing scenario.
    #[arg(long)]
    pub fail_fast: bool,
}

// ---- wait-ready ----

#[derive(Args, Debug)]
pub struct WaitReadyArgs {
    /// Give up after N seconds (default: monitoring.consensus_timeout_secs).
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

// ---- datum ----

#[derive(Args, Debug)]
pub struct DatumArgs {
    /// Datum hash (0x + 64 hex digits).
    pub hash: String,

    /// Node whose mempool and chain are polled.
    #[arg(long, default_value = "node1")]
    pub node: String,

    /// Network name (default: network.name).
    #[arg(long)]
    pub network: Option<String>,

    /// Chain name (default: network.chain).
    #[arg(long)]
    pub chain: Option<String>,

    /// Report IN_BLOCKS instead of waiting for master-node verification.
    #[arg(long)]
    pub no_master_check: bool,

    /// Overall timeout in seconds.
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    pub timeout: u64,
}

// ---- health ----

#[derive(Args, Debug)]
pub struct HealthArgs {
    /// Probe type.
    #[arg(long, default_value = "container")]
    pub kind: HealthKind,

    /// Keep probing for up to N seconds until every node is healthy.
    #[arg(long, value_name = "SECS")]
    pub wait: Option<u64>,
}

/// Probe types accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HealthKind {
    Container,
    Http,
    Rpc,
}

impl From<HealthKind> for CheckKind {
    fn from(kind: HealthKind) -> Self {
        match kind {
            HealthKind::Container => CheckKind::Container,
            HealthKind::Http => CheckKind::Http,
            HealthKind::Rpc => CheckKind::Rpc,
        }
    }
}

// ---- config ----

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only one section (general, network, runner, monitoring).
        #[arg(long)]
        section: Option<String>,
    },
}
