//! 체크 핸들러
//!
//! 체크는 값을 저장하지 않고 조건만 검증합니다. 조건 불일치는
//! [`FailureKind::Assertion`]입니다.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info};

use stage_env_core::runner::{NodeCommandRunner, RpcRequest, split_command};
use stage_env_runner::ContainerProbe;

use super::python::run_python;
use super::steps::{rpc_error, snippet};
use super::{ScenarioExecutor, variable_failure};
use crate::context::{RuntimeContext, render_value};
use crate::defaults::{node_or_fallback, timeout_or};
use crate::details;
use crate::error::{FailureKind, OUTPUT_EXCERPT_CHARS, StepFailure};
use crate::schema::{BashCheck, CliCheck, PythonCheck, RpcCheck, StepDefaults};

impl<R: NodeCommandRunner, P: ContainerProbe> ScenarioExecutor<R, P> {
    pub(super) async fn cli_check(
        &self,
        ctx: &mut RuntimeContext,
        check: &CliCheck,
        defaults: &StepDefaults,
    ) -> Result<(), StepFailure> {
        const KIND: &str = "check_cli";
        let node = node_or_fallback(check.node.as_deref());
        let substitute = |text: &str| {
            ctx.substitute(text)
                .map_err(|e| variable_failure(KIND, e).on_node(node))
        };
        let command = substitute(&check.cli)?;
        let mut cli_defaults = BTreeMap::new();
        for (option, value) in &defaults.cli {
            cli_defaults.insert(option.clone(), substitute(value)?);
        }
        let command = self.cli_options.apply_cli_defaults(&command, &cli_defaults);
        let contains = check.contains.as_deref().map(substitute).transpose()?;
        let not_contains = check.not_contains.as_deref().map(substitute).transpose()?;
        let equals = check.equals.as_deref().map(substitute).transpose()?;
        let timeout = timeout_or(check.timeout, self.default_timeout());

        let output = self
            .runner()
            .run(node, &split_command(&command), timeout)
            .await
            .map_err(|e| StepFailure::from_runner(KIND, node, &command, &e))?;
        let stdout = output.stdout.trim();

        let mismatch = if !output.is_success() {
            Some(format!("command exited with code {}", output.exit_code))
        } else if let Some(needle) = contains.as_deref().filter(|n| !stdout.contains(n)) {
            Some(format!("output does not contain '{needle}'"))
        } else if let Some(needle) = not_contains.as_deref().filter(|n| stdout.contains(n)) {
            Some(format!("output unexpectedly contains '{needle}'"))
        } else if let Some(expected) = equals.as_deref().filter(|e| stdout != e.trim()) {
            Some(format!("output is not equal to '{expected}'"))
        } else {
            None
        };
        if let Some(message) = mismatch {
            return Err(StepFailure::new(FailureKind::Assertion, KIND, message)
                .on_node(node)
                .with_command(&command)
                .with_output(&output.excerpt(OUTPUT_EXCERPT_CHARS)));
        }

        info!(node, command = %command, "cli check passed");
        ctx.add_result(
            KIND,
            true,
            details! {
                "command" => command,
                "node" => node,
            },
        );
        Ok(())
    }

    pub(super) async fn rpc_check(
        &self,
        ctx: &mut RuntimeContext,
        check: &RpcCheck,
    ) -> Result<(), StepFailure> {
        const KIND: &str = "check_rpc";
        let node = node_or_fallback(check.node.as_deref());
        let method = ctx
            .substitute(&check.rpc)
            .map_err(|e| variable_failure(KIND, e).on_node(node))?;
        let params = check
            .params
            .iter()
            .map(|p| ctx.substitute_value(p))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| variable_failure(KIND, e).on_node(node).with_command(&method))?;
        let expected_fragment = check
            .result_contains
            .as_ref()
            .map(|v| ctx.substitute_value(v))
            .transpose()
            .map_err(|e| variable_failure(KIND, e).on_node(node))?;
        let expected_result = check
            .result_equals
            .as_ref()
            .map(|v| ctx.substitute_value(v))
            .transpose()
            .map_err(|e| variable_failure(KIND, e).on_node(node))?;
        let timeout = timeout_or(check.timeout, self.default_timeout());

        let body = self
            .runner()
            .rpc(node, &RpcRequest::new(&method, params), timeout)
            .await
            .map_err(|e| StepFailure::from_runner(KIND, node, &method, &e))?;
        let result = body.get("result").unwrap_or(&Value::Null);

        let mismatch = if let Some(err) = rpc_error(&body) {
            Some(format!("rpc returned error: {err}"))
        } else if let Some(fragment) =
            expected_fragment.filter(|f| !render_value(result).contains(&render_value(f)))
        {
            Some(format!("result does not contain {}", render_value(&fragment)))
        } else if let Some(expected) = expected_result.filter(|e| e != result) {
            Some(format!("result {result} is not equal to {expected}"))
        } else {
            None
        };
        if let Some(message) = mismatch {
            return Err(StepFailure::new(FailureKind::Assertion, KIND, message)
                .on_node(node)
                .with_command(&method)
                .with_output(&body.to_string()));
        }

        info!(node, method = %method, "rpc check passed");
        ctx.add_result(
            KIND,
            true,
            details! {
                "method" => method,
                "node" => node,
            },
        );
        Ok(())
    }

    pub(super) async fn python_check(
        &self,
        ctx: &mut RuntimeContext,
        check: &PythonCheck,
    ) -> Result<(), StepFailure> {
        const KIND: &str = "check_python";
        let python_bin = &self.monitoring.config().runner.python_bin;
        let timeout = timeout_or(check.timeout, self.default_timeout());
        let outcome = run_python(self.runner(), python_bin, &check.python, ctx.variables(), timeout)
            .await
            .map_err(|e| StepFailure::from_runner(KIND, "host", python_bin, &e))?;

        if !outcome.output.is_success() {
            return Err(StepFailure::new(
                FailureKind::Assertion,
                KIND,
                format!("python check exited with code {}", outcome.output.exit_code),
            )
            .with_command(snippet(&check.python))
            .with_output(&outcome.output.excerpt(OUTPUT_EXCERPT_CHARS)));
        }

        debug!("python check passed");
        ctx.add_result(KIND, true, details!("exit_code" => outcome.output.exit_code));
        Ok(())
    }

    pub(super) async fn bash_check(
        &self,
        ctx: &mut RuntimeContext,
        check: &BashCheck,
    ) -> Result<(), StepFailure> {
        const KIND: &str = "check_bash";
        let node = node_or_fallback(check.node.as_deref());
        let script = ctx
            .substitute(&check.bash)
            .map_err(|e| variable_failure(KIND, e).on_node(node))?;
        let timeout = timeout_or(check.timeout, self.default_timeout());
        let argv = vec!["bash".to_owned(), "-c".to_owned(), script.clone()];

        let output = self
            .runner()
            .exec(node, &argv, timeout)
            .await
            .map_err(|e| StepFailure::from_runner(KIND, node, &snippet(&script), &e))?;

        if !output.is_success() {
            return Err(StepFailure::new(
                FailureKind::Assertion,
                KIND,
                format!("bash check exited with code {}", output.exit_code),
            )
            .on_node(node)
            .with_command(snippet(&script))
            .with_output(&output.excerpt(OUTPUT_EXCERPT_CHARS)));
        }

        debug!(node, "bash check passed");
        ctx.add_result(
            KIND,
            true,
            details! {
                "node" => node,
                "exit_code" => output.exit_code,
            },
        );
        Ok(())
    }
}
