//! 스텝 핸들러

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use stage_env_core::runner::{CommandOutput, NodeCommandRunner, RpcRequest, split_command};
use stage_env_monitoring::{DatumRequest, DatumStatus, DatumTimeouts};
use stage_env_runner::ContainerProbe;

use super::python::run_python;
use super::{ScenarioExecutor, variable_failure};
use crate::context::RuntimeContext;
use crate::defaults::{expect_or_default, node_or_fallback, timeout_or};
use crate::details;
use crate::error::{FailureKind, OUTPUT_EXCERPT_CHARS, StepFailure};
use crate::extract;
use crate::outcome::{self, Verdict};
use crate::schema::{
    BashStep, CliStep, ExpectResult, ExtractSpec, ExtractType, LoopStep, PythonStep, RpcStep,
    StepDefaults, ToolStep, WaitForDatumStep, WaitStep,
};

impl<R: NodeCommandRunner, P: ContainerProbe> ScenarioExecutor<R, P> {
    pub(super) async fn cli_step(
        &self,
        ctx: &mut RuntimeContext,
        step: &CliStep,
        defaults: &StepDefaults,
    ) -> Result<(), StepFailure> {
        let node = node_or_fallback(step.node.as_deref());
        let command = ctx
            .substitute(&step.cli)
            .map_err(|e| variable_failure("cli", e).on_node(node))?;
        let mut cli_defaults = BTreeMap::new();
        for (option, value) in &defaults.cli {
            let value = ctx
                .substitute(value)
                .map_err(|e| variable_failure("cli", e).on_node(node))?;
            cli_defaults.insert(option.clone(), value);
        }
        let command = self.cli_options.apply_cli_defaults(&command, &cli_defaults);
        let contains = step
            .contains
            .as_deref()
            .map(|c| ctx.substitute(c))
            .transpose()
            .map_err(|e| variable_failure("cli", e).on_node(node))?;
        let timeout = timeout_or(step.timeout, self.default_timeout());
        let expect = expect_or_default(step.expect);

        info!(node, command = %command, "cli");
        let output = self
            .runner()
            .run(node, &split_command(&command), timeout)
            .await
            .map_err(|e| StepFailure::from_runner("cli", node, &command, &e))?;

        let reused_wallet = expect == ExpectResult::Success
            && outcome::wallet_already_exists(&command, &output.stdout);
        if reused_wallet {
            info!(node, command = %command, "wallet already exists, reusing it");
        } else if let Verdict::Fail(reason) =
            outcome::evaluate(&output, expect, contains.as_deref())
        {
            return Err(StepFailure::new(
                FailureKind::Expectation,
                "cli",
                format!("expected {expect}: {reason}"),
            )
            .on_node(node)
            .with_command(&command)
            .with_output(&output.excerpt(OUTPUT_EXCERPT_CHARS)));
        }

        let wants_value = step.save.is_some() || !step.extract_to.is_empty();
        let wallet_info = if reused_wallet && wants_value {
            self.existing_wallet_info(node, &command, timeout).await
        } else {
            None
        };

        if let Some(var) = &step.save {
            let value = match &wallet_info {
                Some(info) => {
                    let spec = ExtractSpec {
                        required: false,
                        ..ExtractSpec::of_type(ExtractType::WalletAddress)
                    };
                    extract::extract(&info.stdout, &spec)
                        .map_err(|e| {
                            StepFailure::from_extraction(var, &e)
                                .on_node(node)
                                .with_command(&command)
                                .with_output(&info.stdout)
                        })?
                        .unwrap_or_else(|| outcome::saved_value_for(&command, &output.stdout))
                }
                None => outcome::saved_value_for(&command, &output.stdout),
            };
            ctx.set_variable(var, value);
        }
        let extract_source = wallet_info.as_ref().unwrap_or(&output);
        for (var, spec) in &step.extract_to {
            match extract::extract(&extract_source.stdout, spec) {
                Ok(Some(value)) => ctx.set_variable(var, value),
                Ok(None) => debug!(variable = %var, "optional extraction produced no value"),
                Err(e) => {
                    return Err(StepFailure::from_extraction(var, &e)
                        .on_node(node)
                        .with_command(&command)
                        .with_output(&extract_source.stdout));
                }
            }
        }

        ctx.add_result(
            "cli",
            true,
            details! {
                "command" => command,
                "node" => node,
                "saved_to" => step.save,
                "wallet_reused" => reused_wallet,
            },
        );
        pause(step.wait).await;
        Ok(())
    }

    /// 이미 있는 지갑의 `wallet info` 출력. 실패하면 `None`입니다.
    async fn existing_wallet_info(
        &self,
        node: &str,
        command: &str,
        timeout: Duration,
    ) -> Option<CommandOutput> {
        let name = outcome::wallet_name(command)?;
        let info_command = format!("wallet info -w {name}");
        match self
            .runner()
            .run(node, &split_command(&info_command), timeout)
            .await
        {
            Ok(info) if info.is_success() => Some(info),
            Ok(info) => {
                warn!(node, wallet = name, exit_code = info.exit_code, "wallet info failed");
                None
            }
            Err(e) => {
                warn!(node, wallet = name, error = %e, "wallet info failed");
                None
            }
        }
    }

    pub(super) async fn rpc_step(
        &self,
        ctx: &mut RuntimeContext,
        step: &RpcStep,
    ) -> Result<(), StepFailure> {
        let node = node_or_fallback(step.node.as_deref());
        let method = ctx
            .substitute(&step.rpc)
            .map_err(|e| variable_failure("rpc", e).on_node(node))?;
        let params = step
            .params
            .iter()
            .map(|p| ctx.substitute_value(p))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| variable_failure("rpc", e).on_node(node).with_command(&method))?;
        let timeout = timeout_or(step.timeout, self.default_timeout());

        info!(node, method = %method, "rpc");
        let request = RpcRequest::new(&method, params);
        let body = self
            .runner()
            .rpc(node, &request, timeout)
            .await
            .map_err(|e| StepFailure::from_runner("rpc", node, &method, &e))?;

        let rpc_error = rpc_error(&body);
        let mismatch = match (expect_or_default(step.expect), rpc_error) {
            (ExpectResult::Success, Some(err)) => Some(format!("rpc returned error: {err}")),
            (ExpectResult::Error, None) => Some("expected an rpc error but call succeeded".to_owned()),
            _ => None,
        };
        if let Some(message) = mismatch {
            return Err(StepFailure::new(FailureKind::Expectation, "rpc", message)
                .on_node(node)
                .with_command(&method)
                .with_output(&body.to_string()));
        }

        if let Some(var) = &step.save {
            let value = body.get("result").cloned().unwrap_or_else(|| body.clone());
            ctx.set_variable(var, value);
        }
        ctx.add_result(
            "rpc",
            true,
            details! {
                "method" => method,
                "node" => node,
                "saved_to" => step.save,
            },
        );
        pause(step.wait).await;
        Ok(())
    }

    pub(super) async fn wait_step(
        &self,
        ctx: &mut RuntimeContext,
        step: &WaitStep,
    ) -> Result<(), StepFailure> {
        debug!(duration = ?step.wait, "waiting");
        tokio::time::sleep(step.wait).await;
        ctx.add_result(
            "wait",
            true,
            details!("duration_secs" => step.wait.as_secs_f64()),
        );
        Ok(())
    }

    pub(super) async fn wait_for_datum_step(
        &self,
        ctx: &mut RuntimeContext,
        step: &WaitForDatumStep,
    ) -> Result<(), StepFailure> {
        const STEP: &str = "wait_for_datum";
        let node = node_or_fallback(step.node.as_deref());
        let network_config = &self.monitoring.config().network;
        let network = match &step.network {
            Some(network) => ctx.substitute(network),
            None => Ok(network_config.name.clone()),
        }
        .map_err(|e| variable_failure(STEP, e).on_node(node))?;
        let chain = match &step.chain {
            Some(chain) => ctx.substitute(chain),
            None => Ok(network_config.chain.clone()),
        }
        .map_err(|e| variable_failure(STEP, e).on_node(node))?;

        let base = DatumTimeouts::default();
        let timeouts = DatumTimeouts {
            total: step.timeout_total.unwrap_or(base.total),
            mempool: step.timeout_mempool.unwrap_or(base.mempool),
            verification: step.timeout_verification.unwrap_or(base.verification),
            in_blocks: step.timeout_in_blocks.unwrap_or(base.in_blocks),
        };
        let interval = step
            .check_interval
            .unwrap_or(self.monitoring.datum().config().default_check_interval);

        let hashes = step
            .wait_for_datum
            .as_slice()
            .iter()
            .map(|h| ctx.substitute(h))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| variable_failure(STEP, e).on_node(node))?;
        info!(node, datums = hashes.len(), network = %network, chain = %chain, "waiting for datums");

        let mut statuses = Vec::with_capacity(hashes.len());
        let mut results = Vec::with_capacity(hashes.len());
        for hash in &hashes {
            let request = DatumRequest::new(hash, node, &network, &chain)
                .with_timeouts(timeouts)
                .with_check_interval(interval)
                .with_master_check(step.check_master_nodes);
            let result = self.monitoring.datum().wait_for_datum(&request).await;

            if !result.status.is_success() {
                let stage = result
                    .details
                    .get("stage")
                    .and_then(Value::as_str)
                    .unwrap_or(result.status.as_str())
                    .to_owned();
                let kind = match result.status {
                    DatumStatus::Rejected => FailureKind::Datum,
                    _ => FailureKind::Timeout,
                };
                let reason = result.error_message.as_deref().unwrap_or("no reason reported");
                return Err(StepFailure::new(
                    kind,
                    STEP,
                    format!(
                        "datum {hash} ended as {} after {:.1}s: {reason}",
                        result.status,
                        result.elapsed_time.as_secs_f64()
                    ),
                )
                .on_node(node)
                .at_stage(stage));
            }

            info!(
                hash = %hash,
                status = %result.status,
                elapsed_secs = result.elapsed_time.as_secs_f64(),
                "datum confirmed"
            );
            statuses.push(result.status.as_str());
            results.push(json!({
                "hash": result.datum_hash,
                "status": result.status.as_str(),
                "elapsed": result.elapsed_time.as_secs_f64(),
                "details": result.details,
            }));
        }

        if let Some(var) = &step.save_status {
            match statuses.as_slice() {
                [single] => ctx.set_variable(var, *single),
                many => ctx.set_variable(var, many.to_vec()),
            }
        }
        ctx.add_result(
            STEP,
            true,
            details! {
                "datum_count" => hashes.len(),
                "results" => results,
            },
        );
        Ok(())
    }

    pub(super) async fn python_step(
        &self,
        ctx: &mut RuntimeContext,
        step: &PythonStep,
    ) -> Result<(), StepFailure> {
        let python_bin = &self.monitoring.config().runner.python_bin;
        let timeout = timeout_or(step.timeout, self.default_timeout());
        let outcome = run_python(self.runner(), python_bin, &step.python, ctx.variables(), timeout)
            .await
            .map_err(|e| StepFailure::from_runner("python", "host", python_bin, &e))?;

        if let Some(message) = exit_mismatch(&outcome.output, expect_or_default(step.expect)) {
            return Err(StepFailure::new(FailureKind::Expectation, "python", message)
                .with_command(snippet(&step.python))
                .with_output(&outcome.output.excerpt(OUTPUT_EXCERPT_CHARS)));
        }

        if let Some(var) = &step.save {
            match outcome.result {
                Some(value) => ctx.set_variable(var, value),
                None => warn!(variable = %var, "python step produced no result to save"),
            }
        }
        ctx.add_result(
            "python",
            true,
            details! {
                "exit_code" => outcome.output.exit_code,
                "saved_to" => step.save,
            },
        );
        Ok(())
    }

    pub(super) async fn bash_step(
        &self,
        ctx: &mut RuntimeContext,
        step: &BashStep,
    ) -> Result<(), StepFailure> {
        let node = node_or_fallback(step.node.as_deref());
        let script = ctx
            .substitute(&step.bash)
            .map_err(|e| variable_failure("bash", e).on_node(node))?;
        let timeout = timeout_or(step.timeout, self.default_timeout());
        let argv = vec!["bash".to_owned(), "-c".to_owned(), script.clone()];

        debug!(node, "bash");
        let output = self
            .runner()
            .exec(node, &argv, timeout)
            .await
            .map_err(|e| StepFailure::from_runner("bash", node, &snippet(&script), &e))?;
        self.finish_exec_step(ctx, "bash", node, &script, step.save.as_deref(), step.expect, &output)
    }

    pub(super) async fn tool_step(
        &self,
        ctx: &mut RuntimeContext,
        step: &ToolStep,
    ) -> Result<(), StepFailure> {
        let node = node_or_fallback(step.node.as_deref());
        let mut argv = vec![step.tool.clone()];
        for arg in &step.args {
            argv.push(
                ctx.substitute(arg)
                    .map_err(|e| variable_failure("tool", e).on_node(node))?,
            );
        }
        let command = argv.join(" ");
        let timeout = timeout_or(step.timeout, self.default_timeout());

        debug!(node, command = %command, "tool");
        let output = self
            .runner()
            .exec(node, &argv, timeout)
            .await
            .map_err(|e| StepFailure::from_runner("tool", node, &command, &e))?;
        self.finish_exec_step(ctx, "tool", node, &command, step.save.as_deref(), step.expect, &output)
    }

    /// bash/tool 공통: 저장 → 종료 코드 판정 → 기록
    #[allow(clippy::too_many_arguments)]
    fn finish_exec_step(
        &self,
        ctx: &mut RuntimeContext,
        step_type: &str,
        node: &str,
        command: &str,
        save: Option<&str>,
        expect: Option<ExpectResult>,
        output: &CommandOutput,
    ) -> Result<(), StepFailure> {
        if let Some(var) = save {
            ctx.set_variable(var, output.stdout.clone());
        }
        if let Some(message) = exit_mismatch(output, expect_or_default(expect)) {
            return Err(StepFailure::new(FailureKind::Expectation, step_type, message)
                .on_node(node)
                .with_command(snippet(command))
                .with_output(&output.excerpt(OUTPUT_EXCERPT_CHARS)));
        }
        ctx.add_result(
            step_type,
            true,
            details! {
                "node" => node,
                "exit_code" => output.exit_code,
                "saved_to" => save,
            },
        );
        Ok(())
    }

    pub(super) async fn loop_step(
        &self,
        ctx: &mut RuntimeContext,
        step: &LoopStep,
        defaults: &StepDefaults,
    ) -> Result<(), StepFailure> {
        info!(iterations = step.count, "starting loop");
        for i in 0..step.count {
            debug!(iteration = i + 1, total = step.count, "loop iteration");
            ctx.set_variable("i", i);
            ctx.set_variable("iteration", i + 1);
            self.execute_steps(ctx, &step.steps, defaults).await?;
        }
        ctx.add_result("loop", true, details!("iterations" => step.count));
        Ok(())
    }
}

/// JSON-RPC 응답의 `error` (null은 없는 것으로 봅니다)
pub(super) fn rpc_error(body: &Value) -> Option<&Value> {
    body.get("error").filter(|e| !e.is_null())
}

/// 종료 코드만으로 판정하는 스텝의 기대 결과 불일치
fn exit_mismatch(output: &CommandOutput, expect: ExpectResult) -> Option<String> {
    match expect {
        ExpectResult::Success if !output.is_success() => Some(format!(
            "expected success but exited with code {}",
            output.exit_code
        )),
        ExpectResult::Error if output.is_success() => {
            Some("expected an error but exited with code 0".to_owned())
        }
        _ => None,
    }
}

/// 진단 메시지용 스크립트 앞부분
pub(super) fn snippet(script: &str) -> String {
    stage_env_core::runner::truncate_chars(script.trim(), 100)
}

async fn pause(wait: Option<Duration>) {
    if let Some(wait) = wait.filter(|w| !w.is_zero()) {
        debug!(duration = ?wait, "post-step wait");
        tokio::time::sleep(wait).await;
    }
}
