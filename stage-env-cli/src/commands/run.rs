//! `stage-env run` command handler
//!
//! Scenarios run one after another against the same monitoring context. A
//! scenario that cannot be loaded is reported as failed and does not stop the
//! remaining ones unless `--fail-fast` is set. An optional suite setup runs
//! first; if it fails every scenario is skipped.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use stage_env_core::runner::NodeCommandRunner;
use stage_env_monitoring::MonitoringContext;
use stage_env_runner::ContainerProbe;
use stage_env_scenario::{
    CliOptionRegistry, ExecutionSummary, Scenario, ScenarioExecutor, ScenarioKind, StepFailure,
};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render, status_label};

/// Execute the `run` command.
pub async fn execute<R: NodeCommandRunner, P: ContainerProbe>(
    args: RunArgs,
    monitoring: Arc<MonitoringContext<R, P>>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    if let Some(secs) = args.wait_ready {
        let state = monitoring
            .consensus()
            .wait_for_network_ready(Some(Duration::from_secs(secs)))
            .await?;
        info!(state = %state, "network ready");
    }

    let registry = match &args.options_cache {
        Some(cache) => prepare_cli_options(monitoring.as_ref(), cache).await,
        None => CliOptionRegistry::builtin(),
    };
    let executor = ScenarioExecutor::new(monitoring).with_cli_options(registry);

    let report = run_suite(
        &executor,
        args.suite_setup.as_deref(),
        &args.scenarios,
        args.fail_fast,
    )
    .await;
    writer.render(&report)?;

    if report.suite_setup.as_ref().is_some_and(|s| !s.passed) {
        return Err(CliError::SuiteSetupFailed {
            skipped: report.total,
        });
    }
    if report.failed > 0 {
        return Err(CliError::ScenarioFailed {
            failed: report.failed,
            total: report.total,
        });
    }
    Ok(())
}

/// Built-in CLI options merged with the cache, or with a fresh discovery from
/// the first configured node when the cache is missing or empty.
///
/// Discovery failures fall back to the built-in list.
pub async fn prepare_cli_options<R: NodeCommandRunner, P: ContainerProbe>(
    monitoring: &MonitoringContext<R, P>,
    cache: &Path,
) -> CliOptionRegistry {
    let mut registry = CliOptionRegistry::builtin();

    match CliOptionRegistry::load_cache(cache).await {
        Ok(Some(cached)) => {
            info!(path = %cache.display(), commands = cached.len(), "loaded cli option cache");
            registry.extend(cached);
            return registry;
        }
        Ok(None) => {}
        Err(e) => warn!(path = %cache.display(), error = %e, "cli option cache unusable, rediscovering"),
    }

    let config = monitoring.config();
    let Some(node) = config.network.nodes.first() else {
        return registry;
    };
    match CliOptionRegistry::discover(
        monitoring.runner().as_ref(),
        node,
        config.runner.command_timeout(),
    )
    .await
    {
        Ok(discovered) => {
            if let Err(e) = discovered.save_cache(cache).await {
                warn!(path = %cache.display(), error = %e, "failed to write cli option cache");
            }
            registry.extend(discovered);
        }
        Err(e) => warn!(node = %node, error = %e, "cli option discovery failed, using built-in options"),
    }
    registry
}

/// Run the optional suite setup, then every scenario unless the setup failed.
pub async fn run_suite<R: NodeCommandRunner, P: ContainerProbe>(
    executor: &ScenarioExecutor<R, P>,
    suite_setup: Option<&Path>,
    paths: &[PathBuf],
    fail_fast: bool,
) -> RunReport {
    let Some(setup_path) = suite_setup else {
        return run_scenarios(executor, paths, fail_fast).await;
    };

    let setup = run_one(executor, setup_path, ScenarioKind::SuiteSetup).await;
    if !setup.passed {
        warn!(
            path = %setup_path.display(),
            skipped = paths.len(),
            "suite setup failed, skipping all scenarios"
        );
        return RunReport {
            total: paths.len(),
            passed: 0,
            failed: 0,
            suite_setup: Some(setup),
            scenarios: Vec::new(),
        };
    }
    info!(path = %setup_path.display(), "suite setup completed");

    let mut report = run_scenarios(executor, paths, fail_fast).await;
    report.suite_setup = Some(setup);
    report
}

/// Load and execute each scenario file in order.
pub async fn run_scenarios<R: NodeCommandRunner, P: ContainerProbe>(
    executor: &ScenarioExecutor<R, P>,
    paths: &[PathBuf],
    fail_fast: bool,
) -> RunReport {
    let mut scenarios = Vec::with_capacity(paths.len());

    for path in paths {
        let report = run_one(executor, path, ScenarioKind::Test).await;
        let failed = !report.passed;
        scenarios.push(report);
        if failed && fail_fast {
            warn!(path = %path.display(), "stopping after failed scenario");
            break;
        }
    }

    let failed = scenarios.iter().filter(|s| !s.passed).count();
    RunReport {
        total: paths.len(),
        passed: scenarios.len() - failed,
        failed,
        suite_setup: None,
        scenarios,
    }
}

async fn run_one<R: NodeCommandRunner, P: ContainerProbe>(
    executor: &ScenarioExecutor<R, P>,
    path: &Path,
    kind: ScenarioKind,
) -> ScenarioReport {
    let source = path.display().to_string();

    let scenario = match Scenario::load_file_as(path, kind).await {
        Ok(scenario) => scenario,
        Err(e) => {
            warn!(path = %source, error = %e, "failed to load scenario");
            return ScenarioReport {
                path: source,
                name: None,
                passed: false,
                summary: None,
                phase: None,
                failure: None,
                error: Some(e.to_string()),
            };
        }
    };

    match executor.execute_scenario(&scenario).await {
        Ok(ctx) => ScenarioReport {
            path: source,
            name: Some(scenario.name),
            passed: true,
            summary: Some(ctx.get_summary()),
            phase: None,
            failure: None,
            error: None,
        },
        Err(err) => ScenarioReport {
            path: source,
            name: Some(scenario.name),
            passed: false,
            phase: Some(err.phase.to_string()),
            error: Some(err.failure.to_string()),
            failure: Some(err.failure),
            summary: Some(err.summary),
        },
    }
}

/// Outcome of every scenario in one `run` invocation.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub total: usize,
    pub passed: usize,
    /// Includes scenarios that could not be loaded
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite_setup: Option<ScenarioReport>,
    pub scenarios: Vec<ScenarioReport>,
}

#[derive(Debug, Serialize)]
pub struct ScenarioReport {
    pub path: String,
    pub name: Option<String>,
    pub passed: bool,
    pub summary: Option<ExecutionSummary>,
    pub phase: Option<String>,
    pub failure: Option<StepFailure>,
    pub error: Option<String>,
}

impl Render for RunReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(setup) = &self.suite_setup {
            write!(w, "suite setup: ")?;
            render_scenario(setup, w)?;
        }
        for scenario in &self.scenarios {
            render_scenario(scenario, w)?;
        }

        let skipped = self.total - self.scenarios.len();
        writeln!(w)?;
        write!(
            w,
            "Scenarios: {} passed, {} failed",
            self.passed.to_string().green(),
            self.failed.to_string().red()
        )?;
        if skipped > 0 {
            write!(w, ", {skipped} skipped")?;
        }
        writeln!(w, " ({} total)", self.total)
    }
}

fn render_scenario(scenario: &ScenarioReport, w: &mut dyn Write) -> std::io::Result<()> {
    use colored::Colorize;

    let name = scenario.name.as_deref().unwrap_or(&scenario.path);
    writeln!(w, "{} {}", status_label(scenario.passed), name.bold())?;
    if let Some(summary) = &scenario.summary {
        writeln!(
            w,
            "    steps: {}/{} passed ({:.1}%) in {:.2}s",
            summary.passed, summary.total_steps, summary.success_rate, summary.duration_secs
        )?;
    }
    if let Some(failure) = &scenario.failure {
        let phase = scenario.phase.as_deref().unwrap_or("-");
        writeln!(w, "    phase: {phase}  kind: {}", failure.kind.as_str())?;
        if let Some(node) = &failure.node {
            writeln!(w, "    node: {node}")?;
        }
        if let Some(command) = &failure.command {
            writeln!(w, "    command: {command}")?;
        }
        if let Some(stage) = &failure.stage {
            writeln!(w, "    stage: {stage}")?;
        }
        writeln!(w, "    error: {}", failure.message.red())?;
        if let Some(output) = &failure.output_excerpt {
            writeln!(w, "    output: {}", output.dimmed())?;
        }
    } else if let Some(error) = &scenario.error {
        writeln!(w, "    error: {}", error.red())?;
    }
    Ok(())
}
