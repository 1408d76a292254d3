//! `stage-env health` command handler

use std::io::Write;
use std::time::Duration;

use serde::Serialize;

use stage_env_core::runner::NodeCommandRunner;
use stage_env_monitoring::{CheckKind, HealthStatus, MonitoringContext, MonitoringError};
use stage_env_runner::ContainerProbe;

use crate::cli::HealthArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render, status_label};

/// Execute the `health` command.
pub async fn execute<R: NodeCommandRunner, P: ContainerProbe>(
    args: HealthArgs,
    monitoring: &MonitoringContext<R, P>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let kind = CheckKind::from(args.kind);
    let report = probe(monitoring, kind, args.wait.map(Duration::from_secs)).await?;
    writer.render(&report)?;

    if report.unhealthy > 0 {
        return Err(CliError::NotReady(format!(
            "{} of {} node(s) unhealthy ({kind})",
            report.unhealthy, report.total
        )));
    }
    Ok(())
}

/// Probe every configured node once, or keep probing until healthy when `wait` is set.
pub async fn probe<R: NodeCommandRunner, P: ContainerProbe>(
    monitoring: &MonitoringContext<R, P>,
    kind: CheckKind,
    wait: Option<Duration>,
) -> Result<HealthReport, CliError> {
    let statuses = match wait {
        None => monitoring.check_all_nodes(kind).await,
        Some(timeout) => {
            let nodes = &monitoring.config().network.nodes;
            match monitoring.health().wait_for_healthy(nodes, kind, timeout).await {
                Ok(statuses) => statuses,
                // final round for the report
                Err(MonitoringError::HealthTimeout { .. }) => monitoring.check_all_nodes(kind).await,
                Err(other) => return Err(other.into()),
            }
        }
    };
    Ok(HealthReport::new(kind, statuses))
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub kind: CheckKind,
    pub total: usize,
    pub unhealthy: usize,
    pub nodes: Vec<HealthStatus>,
}

impl HealthReport {
    pub fn new(kind: CheckKind, nodes: Vec<HealthStatus>) -> Self {
        Self {
            kind,
            total: nodes.len(),
            unhealthy: nodes.iter().filter(|s| !s.healthy).count(),
            nodes,
        }
    }
}

impl Render for HealthReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Health ({}): {}/{} healthy",
            self.kind,
            self.total - self.unhealthy,
            self.total
        )?;
        for status in &self.nodes {
            write!(
                w,
                "  {} {:<8} {:>8.1}ms",
                status_label(status.healthy),
                status.node_id,
                status.response_time_ms
            )?;
            if let Some(error) = &status.error {
                write!(w, "  {}", error.red())?;
            }
            writeln!(w)?;
        }
        Ok(())
    }
}
