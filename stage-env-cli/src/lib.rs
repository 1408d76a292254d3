//! stage-env command-line interface.
//!
//! # Module Structure
//!
//! - [`cli`]: clap argument definitions
//! - [`commands`]: one handler per subcommand
//! - [`error`]: [`CliError`](error::CliError) and exit codes
//! - [`logging`]: tracing subscriber setup
//! - [`output`]: text / JSON rendering
//!
//! # Architecture
//!
//! ```text
//! stage-env.toml ──> StageEnvConfig ──> MonitoringContext<DockerExecRunner, BollardProbe>
//!                                              │
//!         ┌───────────────┬────────────────────┼──────────────┬─────────────┐
//!         ▼               ▼                    ▼              ▼             ▼
//!        run          wait-ready             datum          health        config
//!  (ScenarioExecutor) (consensus monitor) (datum monitor) (health checker)
//!         │               │                    │              │             │
//!         └───────────────┴────────── OutputWriter (text | json) ───────────┘
//! ```

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;

// --- Public API Re-exports ---

pub use cli::{Cli, Commands, OutputFormat};
pub use error::CliError;
pub use output::{OutputWriter, Render};
