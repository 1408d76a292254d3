//! `stage-env wait-ready` command handler

use std::io::Write;
use std::time::Duration;

use serde::Serialize;

use stage_env_core::runner::NodeCommandRunner;
use stage_env_monitoring::{MonitoringContext, MonitoringError, NetworkConsensusState};
use stage_env_runner::ContainerProbe;

use crate::cli::WaitReadyArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render, status_label};

/// Execute the `wait-ready` command.
///
/// The last observed state is rendered on timeout too, then the command fails
/// with `CliError::NotReady`.
pub async fn execute<R: NodeCommandRunner, P: ContainerProbe>(
    args: WaitReadyArgs,
    monitoring: &MonitoringContext<R, P>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let report = wait(monitoring, args.timeout.map(Duration::from_secs)).await?;
    writer.render(&report)?;
    if !report.ready {
        return Err(CliError::NotReady(format!(
            "network not ready after {:.0}s",
            report.waited_secs
        )));
    }
    Ok(())
}

/// Wait for consensus and fold a timeout into the report.
pub async fn wait<R: NodeCommandRunner, P: ContainerProbe>(
    monitoring: &MonitoringContext<R, P>,
    timeout: Option<Duration>,
) -> Result<ReadyReport, CliError> {
    let started = tokio::time::Instant::now();
    match monitoring.consensus().wait_for_network_ready(timeout).await {
        Ok(state) => Ok(ReadyReport {
            ready: true,
            waited_secs: started.elapsed().as_secs_f64(),
            state,
            node_details: Vec::new(),
        }),
        Err(MonitoringError::ConsensusTimeout {
            waited_secs,
            state,
            node_details,
        }) => Ok(ReadyReport {
            ready: false,
            waited_secs,
            state: *state,
            node_details,
        }),
        Err(other) => Err(other.into()),
    }
}

#[derive(Debug, Serialize)]
pub struct ReadyReport {
    pub ready: bool,
    pub waited_secs: f64,
    pub state: NetworkConsensusState,
    /// Per-node diagnostics, filled only on timeout
    pub node_details: Vec<String>,
}

impl Render for ReadyReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(
            w,
            "{} network {} after {:.1}s",
            status_label(self.ready),
            if self.ready { "ready" } else { "not ready" },
            self.waited_secs
        )?;
        let s = &self.state;
        writeln!(w, "  online nodes:    {}/{}", s.online_nodes, s.expected_nodes)?;
        writeln!(w, "  full node list:  {}/{}", s.nodes_with_full_list, s.expected_nodes)?;
        writeln!(w, "  same node list:  {}", s.all_nodes_have_same_list)?;
        writeln!(
            w,
            "  chains synced:   {} ({} distinct state(s))",
            s.all_chains_synced, s.unique_chain_states
        )?;
        for detail in &self.node_details {
            writeln!(w, "  - {detail}")?;
        }
        Ok(())
    }
}
