//! `stage-env datum` command handler

use std::io::Write;
use std::time::Duration;

use stage_env_core::runner::NodeCommandRunner;
use stage_env_monitoring::{DatumMonitorResult, DatumRequest, DatumTimeouts, MonitoringContext};
use stage_env_runner::ContainerProbe;

use crate::cli::DatumArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render, status_label};

/// Execute the `datum` command.
pub async fn execute<R: NodeCommandRunner, P: ContainerProbe>(
    args: DatumArgs,
    monitoring: &MonitoringContext<R, P>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let request = build_request(&args, monitoring);
    let result = monitoring.datum().wait_for_datum(&request).await;
    writer.render(&result)?;

    if result.status.is_success() {
        return Ok(());
    }
    let message = format!("datum {} ended as {}", result.datum_hash, result.status);
    if result.status.as_str().starts_with("timeout") {
        Err(CliError::NotReady(message))
    } else {
        Err(CliError::Command(message))
    }
}

/// Build the monitor request. Stage timeouts are clamped to the overall timeout.
pub fn build_request<R: NodeCommandRunner, P: ContainerProbe>(
    args: &DatumArgs,
    monitoring: &MonitoringContext<R, P>,
) -> DatumRequest {
    let network = &monitoring.config().network;
    let total = Duration::from_secs(args.timeout);
    let defaults = DatumTimeouts::default();
    let timeouts = DatumTimeouts {
        total,
        mempool: defaults.mempool.min(total),
        verification: defaults.verification.min(total),
        in_blocks: defaults.in_blocks.min(total),
    };

    DatumRequest::new(
        &args.hash,
        &args.node,
        args.network.as_deref().unwrap_or(&network.name),
        args.chain.as_deref().unwrap_or(&network.chain),
    )
    .with_timeouts(timeouts)
    .with_check_interval(monitoring.datum().config().default_check_interval)
    .with_master_check(!args.no_master_check)
}

impl Render for DatumMonitorResult {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "{} datum {} -> {}",
            status_label(self.status.is_success()),
            self.datum_hash,
            self.status.as_str().bold()
        )?;
        writeln!(w, "  elapsed: {:.1}s", self.elapsed_time.as_secs_f64())?;
        for (key, value) in &self.details {
            writeln!(w, "  {key}: {value}")?;
        }
        if let Some(error) = &self.error_message {
            writeln!(w, "  error: {}", error.red())?;
        }
        Ok(())
    }
}
