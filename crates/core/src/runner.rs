//! 노드 명령 실행 trait 및 관련 타입
//!
//! 모든 상위 컴포넌트(모니터, 시나리오 실행기)는 [`NodeCommandRunner`]를 통해서만
//! 노드와 통신합니다. 실제 구현은 `docker exec` 서브프로세스와 HTTP JSON-RPC이며,
//! 테스트에서는 [`crate::testing::ScriptedRunner`]로 대체합니다.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RunnerError;

/// 호스트(로컬) 명령을 기록할 때 사용하는 노드 이름
pub const HOST_NODE: &str = "host";

/// 명령 실행 결과
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// 프로세스 종료 코드 (시그널로 종료된 경우 -1)
    pub exit_code: i32,
    /// 표준 출력
    pub stdout: String,
    /// 표준 에러
    pub stderr: String,
}

impl CommandOutput {
    /// 종료 코드 0, 주어진 stdout으로 결과를 만듭니다.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// 실패 결과를 만듭니다.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// 진단 메시지용 출력 발췌 (stdout 우선, 비어 있으면 stderr)
    pub fn excerpt(&self, max_chars: usize) -> String {
        let source = if self.stdout.trim().is_empty() {
            &self.stderr
        } else {
            &self.stdout
        };
        truncate_chars(source.trim(), max_chars)
    }
}

/// 문자 경계를 지키며 문자열을 자릅니다.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_owned(),
    }
}

/// JSON-RPC 2.0 요청 envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<serde_json::Value>,
    pub id: u64,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Vec<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_owned(),
            method: method.into(),
            params,
            id: 1,
        }
    }
}

/// 노드 ID를 컨테이너 이름으로 변환합니다.
///
/// - `node3` → `{prefix}node-3`
/// - 이미 접두어로 시작하는 이름은 그대로 사용
/// - 그 외 → `{prefix}{node}`
pub fn container_name(prefix: &str, node: &str) -> String {
    if !prefix.is_empty() && node.starts_with(prefix) {
        return node.to_owned();
    }
    match node.strip_prefix("node") {
        Some(index) if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) => {
            format!("{prefix}node-{index}")
        }
        _ => format!("{prefix}{node}"),
    }
}

/// 노드 명령 실행기
///
/// 모든 메서드는 `timeout` 안에 끝나야 하며, 넘기면 프로세스를 종료하고
/// [`RunnerError::Timeout`]을 반환해야 합니다.
pub trait NodeCommandRunner: Send + Sync + 'static {
    /// 노드 CLI 실행: `docker exec <container> <cli> <argv...>`
    fn run(
        &self,
        node: &str,
        argv: &[String],
        timeout: Duration,
    ) -> impl Future<Output = Result<CommandOutput, RunnerError>> + Send;

    /// 컨테이너 안에서 임의의 프로그램 실행: `docker exec <container> <argv...>`
    fn exec(
        &self,
        node: &str,
        argv: &[String],
        timeout: Duration,
    ) -> impl Future<Output = Result<CommandOutput, RunnerError>> + Send;

    /// 호스트에서 로컬 프로그램 실행 (Python 스텝 등)
    fn run_host(
        &self,
        program: &str,
        args: &[String],
        env: &[(String, String)],
        timeout: Duration,
    ) -> impl Future<Output = Result<CommandOutput, RunnerError>> + Send;

    /// 노드에 JSON-RPC 요청을 보내고 응답 본문 전체를 반환합니다.
    fn rpc(
        &self,
        node: &str,
        request: &RpcRequest,
        timeout: Duration,
    ) -> impl Future<Output = Result<serde_json::Value, RunnerError>> + Send;
}

/// 공백 기준으로 CLI 명령 문자열을 인자 배열로 분리합니다.
pub fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_owned).collect()
}
