use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use stage_env_cli::cli::{Cli, Commands};
use stage_env_cli::commands::{self, config, datum, health, run, wait_ready};
use stage_env_cli::error::CliError;
use stage_env_cli::logging::init_tracing;
use stage_env_cli::output::OutputWriter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            ExitCode::from(err.exit_code())
        }
    }
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config_path = commands::resolve_config_path(cli.config);
    let loaded = commands::load_config(config_path.as_deref()).await;

    // `config validate` reports a broken file instead of failing here
    let general = loaded
        .as_ref()
        .map(|c| c.general.clone())
        .unwrap_or_default();
    init_tracing(&general, cli.log_level.as_deref())
        .map_err(|e| CliError::Config(e.to_string()))?;

    tracing::debug!(
        source = %commands::describe_source(config_path.as_deref()),
        "stage-env starting"
    );

    let writer = OutputWriter::new(cli.output);

    match cli.command {
        Commands::Config(args) => config::execute(args, config_path.as_deref(), &writer).await,
        Commands::Run(args) => {
            let monitoring = commands::connect(loaded?)?;
            run::execute(args, monitoring, &writer).await
        }
        Commands::WaitReady(args) => {
            let monitoring = commands::connect(loaded?)?;
            wait_ready::execute(args, monitoring.as_ref(), &writer).await
        }
        Commands::Datum(args) => {
            let monitoring = commands::connect(loaded?)?;
            datum::execute(args, monitoring.as_ref(), &writer).await
        }
        Commands::Health(args) => {
            let monitoring = commands::connect(loaded?)?;
            health::execute(args, monitoring.as_ref(), &writer).await
        }
    }
}
