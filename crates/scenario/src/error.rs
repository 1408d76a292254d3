//! 시나리오 에러 타입
//!
//! - [`ScenarioError`]: 시나리오 로딩, 검증, 변수 치환 실패
//! - [`StepFailure`]: 스텝/체크 하나의 실패. 예외가 아니라 값으로 전달되며
//!   `Result<_, StepFailure>`와 `?`로 남은 스텝을 중단합니다.
//! - [`ScenarioExecutionError`]: 실패한 스텝과 실행 요약을 함께 담아 호출자에게 전달

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use stage_env_core::error::{RunnerError, StageEnvError};
use stage_env_core::runner::truncate_chars;

use crate::context::ExecutionSummary;
use crate::extract::ExtractionError;
use crate::schema::Phase;

/// 실패 메시지에 붙이는 출력 발췌 최대 길이 (문자)
pub const OUTPUT_EXCERPT_CHARS: usize = 500;

/// 시나리오 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// 시나리오 파일을 읽을 수 없음
    #[error("failed to load scenario '{path}': {reason}")]
    Load { path: String, reason: String },

    /// YAML 파싱 실패
    #[error("failed to parse scenario: {reason}")]
    Parse { reason: String },

    /// 구조는 맞지만 의미상 잘못된 시나리오
    #[error("invalid scenario '{name}': {reason}")]
    Invalid { name: String, reason: String },

    /// 정의되지 않은 변수 참조
    #[error("undefined variable: {name}")]
    UndefinedVariable { name: String },

    /// 스텝 실패로 시나리오 중단
    #[error(transparent)]
    Execution(Box<ScenarioExecutionError>),
}

impl From<ScenarioExecutionError> for ScenarioError {
    fn from(err: ScenarioExecutionError) -> Self {
        Self::Execution(Box::new(err))
    }
}

impl From<ScenarioError> for StageEnvError {
    fn from(err: ScenarioError) -> Self {
        StageEnvError::Scenario(err.to_string())
    }
}

/// 스텝 실패 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// 종료 코드나 구조화된 `errors`가 `expect`와 맞지 않음
    Expectation,
    /// CLI/RPC/스크립트가 제한 시간을 넘김
    Timeout,
    /// 프로세스 생성 실패, 컨테이너 접근 불가 등
    Infrastructure,
    /// 출력에서 값을 추출/검증하지 못함
    Extraction,
    /// 정의되지 않은 변수
    Variable,
    /// 데이텀이 성공 상태에 도달하지 못함
    Datum,
    /// 체크 조건 불일치
    Assertion,
    /// 스텝 정의 자체가 실행 불가능 (잘못된 정규식 등)
    Invalid,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expectation => "expectation",
            Self::Timeout => "timeout",
            Self::Infrastructure => "infrastructure",
            Self::Extraction => "extraction",
            Self::Variable => "variable",
            Self::Datum => "datum",
            Self::Assertion => "assertion",
            Self::Invalid => "invalid",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 스텝 하나의 실패와 진단 정보
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{step_type} step failed ({kind}): {message}")]
pub struct StepFailure {
    pub kind: FailureKind,
    /// `cli`, `rpc`, `wait_for_datum`, `check_cli` ...
    pub step_type: String,
    pub node: Option<String>,
    /// 치환이 끝난 명령 (RPC는 메서드 이름)
    pub command: Option<String>,
    /// 데이텀 단계 등 세부 위치
    pub stage: Option<String>,
    pub message: String,
    pub output_excerpt: Option<String>,
}

impl StepFailure {
    pub fn new(kind: FailureKind, step_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            step_type: step_type.into(),
            node: None,
            command: None,
            stage: None,
            message: message.into(),
            output_excerpt: None,
        }
    }

    pub fn on_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn at_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn with_output(mut self, output: &str) -> Self {
        let trimmed = output.trim();
        if !trimmed.is_empty() {
            self.output_excerpt = Some(truncate_chars(trimmed, OUTPUT_EXCERPT_CHARS));
        }
        self
    }

    /// 실행기 에러를 분류합니다. 타임아웃은 [`FailureKind::Timeout`], 나머지는 인프라 에러입니다.
    pub fn from_runner(step_type: impl Into<String>, node: &str, command: &str, err: &RunnerError) -> Self {
        let kind = if err.is_timeout() {
            FailureKind::Timeout
        } else {
            FailureKind::Infrastructure
        };
        Self::new(kind, step_type, err.to_string())
            .on_node(node)
            .with_command(command)
    }

    /// 잘못된 정규식은 [`FailureKind::Invalid`], 나머지는 추출 실패입니다.
    pub fn from_extraction(variable: &str, err: &ExtractionError) -> Self {
        let kind = match err {
            ExtractionError::InvalidPattern { .. } => FailureKind::Invalid,
            _ => FailureKind::Extraction,
        };
        Self::new(
            kind,
            "extraction",
            format!("failed to extract '{variable}': {err}"),
        )
    }

    /// [`crate::context::RuntimeContext::add_result`]에 넘길 세부 정보
    pub fn details(&self) -> BTreeMap<String, Value> {
        let mut details = BTreeMap::new();
        details.insert("kind".to_owned(), Value::from(self.kind.as_str()));
        details.insert("error".to_owned(), Value::from(self.message.clone()));
        let optional = [
            ("node", &self.node),
            ("command", &self.command),
            ("stage", &self.stage),
            ("output", &self.output_excerpt),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                details.insert(key.to_owned(), Value::from(value.clone()));
            }
        }
        details
    }
}

/// 시나리오 실행 실패: 첫 번째 실패 스텝 + 그 시점까지의 요약
#[derive(Debug, Clone, thiserror::Error)]
#[error("scenario '{}' failed in {phase} phase: {failure}", .summary.scenario)]
pub struct ScenarioExecutionError {
    pub phase: Phase,
    pub failure: StepFailure,
    pub summary: ExecutionSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runner_timeout_maps_to_timeout_kind() {
        let err = RunnerError::Timeout {
            node: "node1".to_owned(),
            command: "token_decl".to_owned(),
            timeout_secs: 30.0,
        };
        let failure = StepFailure::from_runner("cli", "node1", "token_decl -token TKN", &err);
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert_eq!(failure.node.as_deref(), Some("node1"));
        assert_eq!(failure.command.as_deref(), Some("token_decl -token TKN"));
    }

    #[test]
    fn spawn_error_is_infrastructure() {
        let err = RunnerError::Spawn {
            program: "docker".to_owned(),
            reason: "not found".to_owned(),
        };
        let failure = StepFailure::from_runner("bash", "node2", "bash -c true", &err);
        assert_eq!(failure.kind, FailureKind::Infrastructure);
    }

    #[test]
    fn output_excerpt_is_trimmed_and_bounded() {
        let long = "x".repeat(OUTPUT_EXCERPT_CHARS + 50);
        let failure = StepFailure::new(FailureKind::Expectation, "cli", "boom").with_output(&long);
        let excerpt = failure.output_excerpt.unwrap();
        assert!(excerpt.ends_with("..."));
        assert_eq!(excerpt.chars().count(), OUTPUT_EXCERPT_CHARS + 3);

        let blank = StepFailure::new(FailureKind::Expectation, "cli", "boom").with_output("  \n");
        assert!(blank.output_excerpt.is_none());
    }

    #[test]
    fn details_skip_missing_fields() {
        let failure = StepFailure::new(FailureKind::Datum, "wait_for_datum", "rejected")
            .at_stage("awaiting_mempool");
        let details = failure.details();
        assert_eq!(details["kind"], "datum");
        assert_eq!(details["stage"], "awaiting_mempool");
        assert!(!details.contains_key("node"));
        assert!(!details.contains_key("output"));
    }

    #[test]
    fn display_names_step_type_and_kind() {
        let failure = StepFailure::new(FailureKind::Assertion, "check_cli", "expected 'ok'");
        assert_eq!(failure.to_string(), "check_cli step failed (assertion): expected 'ok'");
    }

    #[test]
    fn bad_extraction_pattern_is_invalid_step() {
        let err = ExtractionError::InvalidPattern {
            pattern: "(".to_owned(),
            reason: "unclosed group".to_owned(),
        };
        assert_eq!(StepFailure::from_extraction("addr", &err).kind, FailureKind::Invalid);

        let err = ExtractionError::NotFound {
            pattern: "addr: (\\S+)".to_owned(),
            searched: 10,
        };
        let failure = StepFailure::from_extraction("addr", &err);
        assert_eq!(failure.kind, FailureKind::Extraction);
        assert_eq!(failure.step_type, "extraction");
        assert!(failure.message.contains("'addr'"));
    }

    #[test]
    fn scenario_error_converts_to_stage_env_error() {
        let err = ScenarioError::UndefinedVariable {
            name: "wallet".to_owned(),
        };
        let top: StageEnvError = err.into();
        assert!(matches!(top, StageEnvError::Scenario(_)));
        assert!(top.to_string().contains("wallet"));
    }
}
