//! Subprocess execution with a hard timeout.
//!
//! Every external command (`docker exec`, local interpreters) goes through
//! [`run_with_timeout`]. The child is spawned with `kill_on_drop`, so when the
//! timeout fires and the wait future is dropped the process is killed rather
//! than left running in the background.

use std::process::Stdio;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio::process::Command;
use tracing::{debug, warn};

use stage_env_core::error::RunnerError;
use stage_env_core::metrics as m;
use stage_env_core::runner::{CommandOutput, truncate_chars};

/// Longest command text kept in logs and timeout errors.
const MAX_LOGGED_COMMAND: usize = 200;

/// Runs `command` to completion or until `timeout` elapses.
///
/// `node` and `label` only feed diagnostics (logs, metrics, the timeout error).
///
/// # Errors
///
/// - [`RunnerError::Spawn`] if the program cannot be started
/// - [`RunnerError::Timeout`] if it does not exit within `timeout`
pub async fn run_with_timeout(
    mut command: Command,
    node: &str,
    label: &str,
    timeout: Duration,
) -> Result<CommandOutput, RunnerError> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();
    let label = truncate_chars(label, MAX_LOGGED_COMMAND);

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|e| RunnerError::Spawn {
        program: program.clone(),
        reason: e.to_string(),
    })?;

    let started = Instant::now();
    debug!(node = node, command = %label, timeout_secs = timeout.as_secs_f64(), "running command");

    let waited = tokio::time::timeout(timeout, child.wait_with_output()).await;
    let elapsed = started.elapsed();
    histogram!(m::RUNNER_COMMAND_DURATION_SECONDS).record(elapsed.as_secs_f64());

    match waited {
        Ok(Ok(output)) => {
            let result = CommandOutput {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            };
            let outcome = if result.is_success() { "success" } else { "failure" };
            counter!(
                m::RUNNER_COMMANDS_TOTAL,
                m::LABEL_NODE => node.to_owned(),
                m::LABEL_RESULT => outcome
            )
            .increment(1);
            debug!(
                node = node,
                exit_code = result.exit_code,
                elapsed_ms = elapsed.as_millis() as u64,
                "command finished"
            );
            Ok(result)
        }
        Ok(Err(e)) => Err(RunnerError::Spawn {
            program,
            reason: format!("failed to collect output: {e}"),
        }),
        Err(_) => {
            // wait 퓨처가 drop되면서 kill_on_drop이 자식 프로세스를 종료한다
            counter!(m::RUNNER_TIMEOUTS_TOTAL, m::LABEL_NODE => node.to_owned()).increment(1);
            warn!(
                node = node,
                command = %label,
                timeout_secs = timeout.as_secs_f64(),
                "command timed out, process killed"
            );
            Err(RunnerError::Timeout {
                node: node.to_owned(),
                command: label,
                timeout_secs: timeout.as_secs_f64(),
            })
        }
    }
}
