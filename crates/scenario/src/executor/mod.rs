//! 시나리오 실행기
//!
//! 시나리오 하나를 setup → test → check 순서로 실행합니다. 각 스텝은
//! 캐스케이드된 기본값으로 빈 필드를 채운 뒤 스텝 종류별 핸들러로 보냅니다.
//! 첫 번째 실패에서 남은 스텝을 모두 건너뛰고 [`ScenarioExecutionError`]를 돌려줍니다.
//!
//! 실패 기록은 실제로 명령을 실행한 스텝(리프)만 남깁니다. 루프와 그룹은
//! 하위 스텝의 실패를 그대로 전달합니다.

mod checks;
pub mod python;
mod steps;

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use metrics::counter;
use tracing::{debug, error, info};

use stage_env_core::metrics as m;
use stage_env_core::runner::NodeCommandRunner;
use stage_env_monitoring::MonitoringContext;
use stage_env_runner::ContainerProbe;

use crate::cli_options::CliOptionRegistry;
use crate::context::RuntimeContext;
use crate::error::{FailureKind, ScenarioError, ScenarioExecutionError, StepFailure};
use crate::schema::{Check, Phase, Scenario, Step, StepDefaults};

/// 시나리오 실행기
///
/// 모니터링 컨텍스트는 실행 전체에서 공유하고, 시나리오마다 새
/// [`RuntimeContext`]를 만듭니다.
pub struct ScenarioExecutor<R, P> {
    monitoring: Arc<MonitoringContext<R, P>>,
    cli_options: CliOptionRegistry,
}

impl<R: NodeCommandRunner, P: ContainerProbe> ScenarioExecutor<R, P> {
    /// 기본 제공 CLI 옵션 목록으로 실행기를 만듭니다.
    pub fn new(monitoring: Arc<MonitoringContext<R, P>>) -> Self {
        Self {
            monitoring,
            cli_options: CliOptionRegistry::builtin(),
        }
    }

    pub fn with_cli_options(mut self, registry: CliOptionRegistry) -> Self {
        self.cli_options = registry;
        self
    }

    pub fn monitoring(&self) -> &Arc<MonitoringContext<R, P>> {
        &self.monitoring
    }

    pub fn cli_options(&self) -> &CliOptionRegistry {
        &self.cli_options
    }

    fn runner(&self) -> &R {
        self.monitoring.runner()
    }

    /// 스텝에 타임아웃이 없을 때 쓰는 값
    fn default_timeout(&self) -> Duration {
        self.monitoring.config().runner.command_timeout()
    }

    /// 시나리오를 실행하고 결과가 기록된 컨텍스트를 돌려줍니다.
    pub async fn execute_scenario(
        &self,
        scenario: &Scenario,
    ) -> Result<RuntimeContext, ScenarioExecutionError> {
        let mut ctx = RuntimeContext::new(&scenario.name).with_variables(scenario.variables.clone());
        let network = &self.monitoring.config().network;
        ctx.set_default_variable("network_name", network.name.clone());
        ctx.set_default_variable("chain_name", network.chain.clone());

        info!(
            scenario = %scenario.name,
            run_id = %ctx.run_id(),
            setup = scenario.setup.steps.len(),
            test = scenario.test.steps.len(),
            check = scenario.check.steps.len(),
            "executing scenario"
        );

        match self.run_phases(&mut ctx, scenario).await {
            Ok(()) => {
                let summary = ctx.get_summary();
                counter!(m::SCENARIO_RUNS_TOTAL, m::LABEL_RESULT => "success").increment(1);
                info!(
                    scenario = %scenario.name,
                    passed = summary.passed,
                    total = summary.total_steps,
                    duration_secs = summary.duration_secs,
                    "scenario passed"
                );
                Ok(ctx)
            }
            Err((phase, failure)) => {
                let summary = ctx.get_summary();
                counter!(m::SCENARIO_RUNS_TOTAL, m::LABEL_RESULT => "failure").increment(1);
                error!(
                    scenario = %scenario.name,
                    phase = %phase,
                    kind = %failure.kind,
                    step = %failure.step_type,
                    node = failure.node.as_deref().unwrap_or("-"),
                    error = %failure.message,
                    "scenario failed"
                );
                Err(ScenarioExecutionError {
                    phase,
                    failure,
                    summary,
                })
            }
        }
    }

    async fn run_phases(
        &self,
        ctx: &mut RuntimeContext,
        scenario: &Scenario,
    ) -> Result<(), (Phase, StepFailure)> {
        let global = StepDefaults::cascade([scenario.defaults.as_ref()]);

        let setup = global.merge(scenario.setup.defaults.as_ref());
        self.execute_steps(ctx, &scenario.setup.steps, &setup)
            .await
            .map_err(|f| (Phase::Setup, f))?;

        let test = global.merge(scenario.test.defaults.as_ref());
        self.execute_steps(ctx, &scenario.test.steps, &test)
            .await
            .map_err(|f| (Phase::Test, f))?;

        let check = global.merge(scenario.check.defaults.as_ref());
        self.execute_checks(ctx, &scenario.check.steps, &check)
            .await
            .map_err(|f| (Phase::Check, f))
    }

    /// 스텝 목록을 순서대로 실행합니다. 그룹과 루프가 재귀 호출하므로 박싱합니다.
    fn execute_steps<'a>(
        &'a self,
        ctx: &'a mut RuntimeContext,
        steps: &'a [Step],
        defaults: &'a StepDefaults,
    ) -> BoxFuture<'a, Result<(), StepFailure>> {
        async move {
            for step in steps {
                self.execute_step(ctx, step, defaults).await?;
            }
            Ok(())
        }
        .boxed()
    }

    async fn execute_step(
        &self,
        ctx: &mut RuntimeContext,
        step: &Step,
        defaults: &StepDefaults,
    ) -> Result<(), StepFailure> {
        let mut step = step.clone();
        step.apply_defaults(defaults);
        debug!(step = %step.describe(), "executing step");

        let outcome = match &step {
            Step::Cli(s) => self.cli_step(ctx, s, defaults).await,
            Step::Rpc(s) => self.rpc_step(ctx, s).await,
            Step::Wait(s) => self.wait_step(ctx, s).await,
            Step::WaitForDatum(s) => self.wait_for_datum_step(ctx, s).await,
            Step::Python(s) => self.python_step(ctx, s).await,
            Step::Bash(s) => self.bash_step(ctx, s).await,
            Step::Tool(s) => self.tool_step(ctx, s).await,
            Step::Loop(s) => self.loop_step(ctx, s, defaults).await,
            Step::Group(group) => {
                let merged = defaults.merge(group.defaults.as_ref());
                if let Some(name) = &group.name {
                    debug!(group = %name, steps = group.steps.len(), "entering step group");
                }
                self.execute_steps(ctx, &group.steps, &merged).await
            }
        };

        if !step.is_composite() {
            record_outcome(ctx, step.kind(), &outcome);
        }
        outcome
    }

    async fn execute_checks(
        &self,
        ctx: &mut RuntimeContext,
        checks: &[Check],
        defaults: &StepDefaults,
    ) -> Result<(), StepFailure> {
        let total = checks.len();
        for (index, check) in checks.iter().enumerate() {
            let mut check = check.clone();
            check.apply_defaults(defaults);
            info!(check = index + 1, total, kind = check.kind(), "running check");

            let outcome = match &check {
                Check::Cli(c) => self.cli_check(ctx, c, defaults).await,
                Check::Rpc(c) => self.rpc_check(ctx, c).await,
                Check::Python(c) => self.python_check(ctx, c).await,
                Check::Bash(c) => self.bash_check(ctx, c).await,
            };
            record_outcome(ctx, check.kind(), &outcome);
            outcome?;
        }
        Ok(())
    }
}

/// 메트릭을 남기고, 실패면 컨텍스트에 기록합니다. 성공 기록은 각 핸들러가 남깁니다.
fn record_outcome(ctx: &mut RuntimeContext, kind: &'static str, outcome: &Result<(), StepFailure>) {
    let result = if outcome.is_ok() { "success" } else { "failure" };
    counter!(m::SCENARIO_STEPS_TOTAL, m::LABEL_STEP_TYPE => kind, m::LABEL_RESULT => result)
        .increment(1);
    if let Err(failure) = outcome {
        ctx.add_result(failure.step_type.clone(), false, failure.details());
    }
}

/// 변수 치환 실패를 스텝 실패로 바꿉니다.
fn variable_failure(step_type: &str, err: ScenarioError) -> StepFailure {
    StepFailure::new(FailureKind::Variable, step_type, err.to_string())
}
