//! 테스트용 스크립트 실행기
//!
//! 실제 컨테이너 없이 모니터와 실행기를 테스트하기 위해, 미리 등록한 응답을
//! (노드, 명령 접두어) 규칙에 따라 돌려줍니다. 규칙의 응답 큐가 하나만 남으면
//! 그 응답을 계속 반복합니다.
//!
//! ```ignore
//! use stage_env_core::runner::CommandOutput;
//! use stage_env_core::testing::ScriptedRunner;
//!
//! let runner = ScriptedRunner::new()
//!     .on(Some("node1"), "net -net stagenet get status", CommandOutput::ok("current: NET_STATE_ONLINE"));
//! ```

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::RunnerError;
use crate::runner::{CommandOutput, HOST_NODE, NodeCommandRunner, RpcRequest};

/// 기록된 호출의 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Cli,
    Exec,
    Host,
    Rpc,
}

/// 기록된 호출
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub node: String,
    /// 공백으로 이어 붙인 인자 (RPC는 메서드 이름)
    pub command: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
enum Scripted {
    Output(CommandOutput),
    Rpc(serde_json::Value),
    Timeout,
    Error(String),
}

#[derive(Debug)]
struct Rule {
    kind: Option<CallKind>,
    node: Option<String>,
    prefix: String,
    responses: VecDeque<Scripted>,
}

impl Rule {
    fn matches(&self, kind: CallKind, node: &str, command: &str) -> bool {
        self.kind.is_none_or(|k| k == kind)
            && self.node.as_deref().is_none_or(|n| n == node)
            && command.starts_with(&self.prefix)
    }

    fn next(&mut self) -> Option<Scripted> {
        if self.responses.len() > 1 {
            self.responses.pop_front()
        } else {
            self.responses.front().cloned()
        }
    }
}

/// 규칙 기반 가짜 [`NodeCommandRunner`]
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_rule(self, kind: Option<CallKind>, node: Option<&str>, prefix: &str, responses: Vec<Scripted>) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                kind,
                node: node.map(str::to_owned),
                prefix: prefix.to_owned(),
                responses: responses.into(),
            });
        }
        self
    }

    /// CLI/exec 호출에 대해 고정 응답을 등록합니다. `node`가 `None`이면 모든 노드에 적용됩니다.
    pub fn on(self, node: Option<&str>, prefix: &str, output: CommandOutput) -> Self {
        self.push_rule(None, node, prefix, vec![Scripted::Output(output)])
    }

    /// 호출 순서대로 응답을 돌려주고, 마지막 응답을 반복합니다.
    pub fn on_sequence(self, node: Option<&str>, prefix: &str, outputs: Vec<CommandOutput>) -> Self {
        let responses = outputs.into_iter().map(Scripted::Output).collect();
        self.push_rule(None, node, prefix, responses)
    }

    /// 해당 명령이 항상 타임아웃되도록 합니다.
    pub fn on_timeout(self, node: Option<&str>, prefix: &str) -> Self {
        self.push_rule(None, node, prefix, vec![Scripted::Timeout])
    }

    /// 해당 명령이 인프라 에러로 실패하도록 합니다.
    pub fn on_error(self, node: Option<&str>, prefix: &str, reason: &str) -> Self {
        self.push_rule(None, node, prefix, vec![Scripted::Error(reason.to_owned())])
    }

    /// 호스트 프로그램 실행 응답을 등록합니다. `prefix`는 프로그램 이름과 인자를 이은 문자열에 대해 비교합니다.
    pub fn on_host(self, prefix: &str, output: CommandOutput) -> Self {
        self.push_rule(Some(CallKind::Host), Some(HOST_NODE), prefix, vec![Scripted::Output(output)])
    }

    /// RPC 메서드 응답 본문을 등록합니다.
    pub fn on_rpc(self, node: Option<&str>, method: &str, body: serde_json::Value) -> Self {
        self.push_rule(Some(CallKind::Rpc), node, method, vec![Scripted::Rpc(body)])
    }

    /// 지금까지 기록된 호출 목록
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// 접두어로 시작하는 호출 수
    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.command.starts_with(prefix))
            .count()
    }

    fn respond(&self, kind: CallKind, node: &str, command: String, timeout: Duration) -> Option<Scripted> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                kind,
                node: node.to_owned(),
                command: command.clone(),
                timeout,
            });
        }
        let mut rules = self.rules.lock().ok()?;
        rules
            .iter_mut()
            .find(|r| r.matches(kind, node, &command))
            .and_then(Rule::next)
    }

    fn command_result(
        &self,
        kind: CallKind,
        node: &str,
        command: String,
        timeout: Duration,
    ) -> Result<CommandOutput, RunnerError> {
        match self.respond(kind, node, command.clone(), timeout) {
            Some(Scripted::Output(out)) => Ok(out),
            Some(Scripted::Timeout) => Err(RunnerError::Timeout {
                node: node.to_owned(),
                command,
                timeout_secs: timeout.as_secs_f64(),
            }),
            Some(Scripted::Error(reason)) => Err(RunnerError::ContainerUnavailable {
                container: node.to_owned(),
                reason,
            }),
            Some(Scripted::Rpc(_)) | None => Ok(CommandOutput::failed(
                127,
                format!("no scripted response for '{command}'"),
            )),
        }
    }
}

impl NodeCommandRunner for ScriptedRunner {
    async fn run(
        &self,
        node: &str,
        argv: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, RunnerError> {
        self.command_result(CallKind::Cli, node, argv.join(" "), timeout)
    }

    async fn exec(
        &self,
        node: &str,
        argv: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, RunnerError> {
        self.command_result(CallKind::Exec, node, argv.join(" "), timeout)
    }

    async fn run_host(
        &self,
        program: &str,
        args: &[String],
        _env: &[(String, String)],
        timeout: Duration,
    ) -> Result<CommandOutput, RunnerError> {
        let mut command = program.to_owned();
        for arg in args {
            command.push(' ');
            command.push_str(arg);
        }
        self.command_result(CallKind::Host, HOST_NODE, command, timeout)
    }

    async fn rpc(
        &self,
        node: &str,
        request: &RpcRequest,
        timeout: Duration,
    ) -> Result<serde_json::Value, RunnerError> {
        match self.respond(CallKind::Rpc, node, request.method.clone(), timeout) {
            Some(Scripted::Rpc(body)) => Ok(body),
            Some(Scripted::Timeout) => Err(RunnerError::Timeout {
                node: node.to_owned(),
                command: request.method.clone(),
                timeout_secs: timeout.as_secs_f64(),
            }),
            _ => Err(RunnerError::Rpc {
                node: node.to_owned(),
                method: request.method.clone(),
                reason: "no scripted response".to_owned(),
            }),
        }
    }
}
