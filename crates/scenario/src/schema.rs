//! 시나리오 스키마
//!
//! YAML 시나리오 파일에서 역직렬화되는 타입들입니다.
//!
//! # YAML 형식
//! ```yaml
//! name: Token emission
//! description: Declare a token and wait until the emission lands in a block
//! variables:
//!   ticker: TKN
//! defaults:
//!   node: node1
//!   timeout: 30
//!   cli:
//!     net: stagenet
//! setup:
//!   - cli: wallet new -w alice
//!     extract_to:
//!       alice_addr: { type: wallet_address }
//! test:
//!   defaults:
//!     timeout: 60
//!   steps:
//!     - cli: token_decl -token {{ticker}} -total_supply 1000
//!       save: decl_hash
//!     - wait_for_datum: "{{decl_hash}}"
//!       save_status: decl_status
//! check:
//!   - cli: token list
//!     contains: "{{ticker}}"
//! ```
//!
//! 스텝은 액션 키(`cli`, `rpc`, `wait`, `wait_for_datum`, `python`, `bash`, `tool`,
//! `loop`)로 구분하고, 액션 키 없이 `steps`만 있으면 [`StepGroup`]입니다.
//! 공통 필드(`node`, `wait`, `expect`, `timeout`)는 모두 `Option`이며,
//! 값이 없으면 [`StepDefaults`] 캐스케이드에서 채워집니다.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::Value;

use stage_env_core::duration;

use crate::error::ScenarioError;

/// 시나리오 파일 최대 크기
const MAX_SCENARIO_FILE_SIZE: u64 = 4 * 1024 * 1024;

/// 스텝 액션 키 (`wait`는 다른 스텝의 공통 필드와 겹치므로 따로 처리)
const STEP_ACTION_KEYS: &[&str] = &["cli", "rpc", "wait_for_datum", "python", "bash", "tool", "loop"];

/// 체크 액션 키
const CHECK_ACTION_KEYS: &[&str] = &["cli", "rpc", "python", "bash"];

/// 기대 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectResult {
    #[default]
    Success,
    Error,
    Any,
}

impl ExpectResult {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for ExpectResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 추출 값의 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractType {
    #[serde(alias = "WALLET_ADDRESS")]
    WalletAddress,
    #[serde(alias = "NODE_ADDRESS")]
    NodeAddress,
    #[serde(alias = "HASH")]
    Hash,
    #[serde(alias = "NUMBER")]
    Number,
    #[serde(alias = "TOKEN_NAME")]
    TokenName,
    #[serde(alias = "BOOL")]
    Bool,
    #[default]
    #[serde(alias = "RAW")]
    Raw,
}

impl ExtractType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WalletAddress => "wallet_address",
            Self::NodeAddress => "node_address",
            Self::Hash => "hash",
            Self::Number => "number",
            Self::TokenName => "token_name",
            Self::Bool => "bool",
            Self::Raw => "raw",
        }
    }
}

impl fmt::Display for ExtractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_group() -> usize {
    1
}

fn default_true() -> bool {
    true
}

/// 출력에서 값을 추출하는 규칙
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractSpec {
    /// 정규식 (없으면 타입별 기본 패턴)
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: ExtractType,
    /// 캡처 그룹 번호
    #[serde(default = "default_group")]
    pub group: usize,
    /// 추출 실패 시 스텝을 실패시킬지
    #[serde(default = "default_true")]
    pub required: bool,
    /// `required: false`일 때 대체 값
    #[serde(default)]
    pub default: Option<String>,
}

impl ExtractSpec {
    pub fn of_type(kind: ExtractType) -> Self {
        Self {
            pattern: None,
            kind,
            group: 1,
            required: true,
            default: None,
        }
    }
}

/// 스텝 기본값 (전역 → 섹션 → 그룹 → 스텝 순으로 캐스케이드)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepDefaults {
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default, deserialize_with = "duration::deserialize_option")]
    pub wait: Option<Duration>,
    #[serde(default)]
    pub expect: Option<ExpectResult>,
    #[serde(default, deserialize_with = "duration::deserialize_option")]
    pub timeout: Option<Duration>,
    /// CLI 명령에 주입할 옵션 (`net: stagenet` → `-net stagenet`)
    #[serde(default)]
    pub cli: BTreeMap<String, String>,
}

/// 노드 CLI 명령 실행
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CliStep {
    pub cli: String,
    #[serde(default)]
    pub node: Option<String>,
    /// 결과를 저장할 변수
    #[serde(default)]
    pub save: Option<String>,
    #[serde(default)]
    pub extract_to: BTreeMap<String, ExtractSpec>,
    #[serde(default, deserialize_with = "duration::deserialize_option")]
    pub wait: Option<Duration>,
    #[serde(default)]
    pub expect: Option<ExpectResult>,
    /// 출력에 반드시 포함되어야 하는 문자열
    #[serde(default)]
    pub contains: Option<String>,
    #[serde(default, deserialize_with = "duration::deserialize_option")]
    pub timeout: Option<Duration>,
}

/// JSON-RPC 호출
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RpcStep {
    /// 메서드 이름
    pub rpc: String,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub save: Option<String>,
    #[serde(default, deserialize_with = "duration::deserialize_option")]
    pub wait: Option<Duration>,
    #[serde(default)]
    pub expect: Option<ExpectResult>,
    #[serde(default, deserialize_with = "duration::deserialize_option")]
    pub timeout: Option<Duration>,
}

/// 고정 시간 대기
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitStep {
    #[serde(deserialize_with = "duration::deserialize")]
    pub wait: Duration,
}

/// 해시 하나 또는 여러 개
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DatumHashes {
    One(String),
    Many(Vec<String>),
}

impl DatumHashes {
    pub fn as_slice(&self) -> &[String] {
        match self {
            Self::One(hash) => std::slice::from_ref(hash),
            Self::Many(hashes) => hashes,
        }
    }
}

/// 데이텀 수명주기 대기
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitForDatumStep {
    pub wait_for_datum: DatumHashes,
    #[serde(default)]
    pub node: Option<String>,
    /// 없으면 설정의 네트워크 이름
    #[serde(default)]
    pub network: Option<String>,
    /// 없으면 설정의 체인 이름
    #[serde(default)]
    pub chain: Option<String>,
    #[serde(default = "default_true")]
    pub check_master_nodes: bool,
    #[serde(default, deserialize_with = "duration::deserialize_option")]
    pub timeout_total: Option<Duration>,
    #[serde(default, deserialize_with = "duration::deserialize_option")]
    pub timeout_mempool: Option<Duration>,
    #[serde(default, deserialize_with = "duration::deserialize_option")]
    pub timeout_verification: Option<Duration>,
    #[serde(default, deserialize_with = "duration::deserialize_option")]
    pub timeout_in_blocks: Option<Duration>,
    #[serde(default, deserialize_with = "duration::deserialize_option")]
    pub check_interval: Option<Duration>,
    /// 최종 상태를 저장할 변수 (해시가 여러 개면 목록)
    #[serde(default)]
    pub save_status: Option<String>,
}

/// 호스트에서 실행하는 Python 코드 (`ctx`로 변수 접근, `result`를 저장)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PythonStep {
    pub python: String,
    #[serde(default)]
    pub save: Option<String>,
    #[serde(default)]
    pub expect: Option<ExpectResult>,
    #[serde(default, deserialize_with = "duration::deserialize_option")]
    pub timeout: Option<Duration>,
}

/// 노드 컨테이너 안에서 `bash -c`로 실행하는 스크립트
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BashStep {
    pub bash: String,
    #[serde(default)]
    pub node: Option<String>,
    /// stdout을 저장할 변수
    #[serde(default)]
    pub save: Option<String>,
    #[serde(default)]
    pub expect: Option<ExpectResult>,
    #[serde(default, deserialize_with = "duration::deserialize_option")]
    pub timeout: Option<Duration>,
}

/// 노드 컨테이너 안의 임의 바이너리 실행
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolStep {
    pub tool: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub save: Option<String>,
    #[serde(default)]
    pub expect: Option<ExpectResult>,
    #[serde(default, deserialize_with = "duration::deserialize_option")]
    pub timeout: Option<Duration>,
}

/// 본문을 N번 반복 (`i`는 0부터, `iteration`은 1부터)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoopStep {
    #[serde(rename = "loop")]
    pub count: u32,
    pub steps: Vec<Step>,
}

/// 기본값을 공유하는 스텝 묶음
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepGroup {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub defaults: Option<StepDefaults>,
    pub steps: Vec<Step>,
}

/// 테스트 스텝
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "serde_yaml::Value")]
pub enum Step {
    Cli(CliStep),
    Rpc(RpcStep),
    Wait(WaitStep),
    WaitForDatum(WaitForDatumStep),
    Python(PythonStep),
    Bash(BashStep),
    Tool(ToolStep),
    Loop(LoopStep),
    Group(StepGroup),
}

impl Step {
    /// 결과 기록과 메트릭 레이블에 쓰는 스텝 종류
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cli(_) => "cli",
            Self::Rpc(_) => "rpc",
            Self::Wait(_) => "wait",
            Self::WaitForDatum(_) => "wait_for_datum",
            Self::Python(_) => "python",
            Self::Bash(_) => "bash",
            Self::Tool(_) => "tool",
            Self::Loop(_) => "loop",
            Self::Group(_) => "group",
        }
    }

    /// 하위 스텝을 가진 스텝인지 (실패는 하위 스텝이 기록)
    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Loop(_) | Self::Group(_))
    }

    /// 로그용 한 줄 설명
    pub fn describe(&self) -> String {
        match self {
            Self::Cli(step) => format!("cli: {}", step.cli),
            Self::Rpc(step) => format!("rpc: {}", step.rpc),
            Self::Wait(step) => format!("wait: {:?}", step.wait),
            Self::WaitForDatum(step) => {
                let count = step.wait_for_datum.as_slice().len();
                format!("wait_for_datum: {count} datum{}", if count == 1 { "" } else { "s" })
            }
            Self::Python(_) => "python".to_owned(),
            Self::Bash(_) => "bash".to_owned(),
            Self::Tool(step) => format!("tool: {}", step.tool),
            Self::Loop(step) => format!("loop: {} iterations", step.count),
            Self::Group(group) => match &group.name {
                Some(name) => format!("group: {name}"),
                None => "group".to_owned(),
            },
        }
    }
}

impl TryFrom<serde_yaml::Value> for Step {
    type Error = String;

    fn try_from(value: serde_yaml::Value) -> Result<Self, Self::Error> {
        let action = detect_action(&value, STEP_ACTION_KEYS)?;
        let action = match action {
            Some(action) => action,
            None if has_key(&value, "wait") => "wait",
            None if has_key(&value, "steps") => "group",
            None => {
                return Err(format!(
                    "step has no action key (expected one of: {}, wait, or a group with 'steps')",
                    STEP_ACTION_KEYS.join(", ")
                ));
            }
        };
        let step = match action {
            "cli" => Self::Cli(from_value(value, action)?),
            "rpc" => Self::Rpc(from_value(value, action)?),
            "wait" => Self::Wait(from_value(value, action)?),
            "wait_for_datum" => Self::WaitForDatum(from_value(value, action)?),
            "python" => Self::Python(from_value(value, action)?),
            "bash" => Self::Bash(from_value(value, action)?),
            "tool" => Self::Tool(from_value(value, action)?),
            "loop" => Self::Loop(from_value(value, action)?),
            _ => Self::Group(from_value(value, action)?),
        };
        if let Self::Loop(step) = &step
            && step.count == 0
        {
            return Err("loop count must be greater than 0".to_owned());
        }
        Ok(step)
    }
}

/// CLI 출력 검증
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CliCheck {
    pub cli: String,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub contains: Option<String>,
    #[serde(default)]
    pub not_contains: Option<String>,
    /// 앞뒤 공백을 제거한 출력과 정확히 일치
    #[serde(default)]
    pub equals: Option<String>,
    #[serde(default, deserialize_with = "duration::deserialize_option")]
    pub timeout: Option<Duration>,
}

/// JSON-RPC 결과 검증
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RpcCheck {
    pub rpc: String,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default)]
    pub node: Option<String>,
    /// `result`의 문자열 표현에 포함되어야 하는 값
    #[serde(default)]
    pub result_contains: Option<Value>,
    #[serde(default)]
    pub result_equals: Option<Value>,
    #[serde(default, deserialize_with = "duration::deserialize_option")]
    pub timeout: Option<Duration>,
}

/// Python 조건 검사 (assert 실패나 예외가 나면 실패)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PythonCheck {
    pub python: String,
    #[serde(default, deserialize_with = "duration::deserialize_option")]
    pub timeout: Option<Duration>,
}

/// Bash 조건 검사 (종료 코드 0이면 통과)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BashCheck {
    pub bash: String,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default, deserialize_with = "duration::deserialize_option")]
    pub timeout: Option<Duration>,
}

/// 검증 단계 항목
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "serde_yaml::Value")]
pub enum Check {
    Cli(CliCheck),
    Rpc(RpcCheck),
    Python(PythonCheck),
    Bash(BashCheck),
}

impl Check {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cli(_) => "check_cli",
            Self::Rpc(_) => "check_rpc",
            Self::Python(_) => "check_python",
            Self::Bash(_) => "check_bash",
        }
    }
}

impl TryFrom<serde_yaml::Value> for Check {
    type Error = String;

    fn try_from(value: serde_yaml::Value) -> Result<Self, Self::Error> {
        let Some(action) = detect_action(&value, CHECK_ACTION_KEYS)? else {
            return Err(format!(
                "check has no action key (expected one of: {})",
                CHECK_ACTION_KEYS.join(", ")
            ));
        };
        Ok(match action {
            "cli" => Self::Cli(from_value(value, action)?),
            "rpc" => Self::Rpc(from_value(value, action)?),
            "python" => Self::Python(from_value(value, action)?),
            _ => Self::Bash(from_value(value, action)?),
        })
    }
}

/// 액션 키를 하나만 찾습니다. 둘 이상이면 모호한 스텝으로 거부합니다.
fn detect_action(value: &serde_yaml::Value, keys: &[&'static str]) -> Result<Option<&'static str>, String> {
    let serde_yaml::Value::Mapping(map) = value else {
        return Err(format!("expected a mapping, got {}", yaml_kind(value)));
    };
    let found: Vec<&'static str> = keys
        .iter()
        .copied()
        .filter(|key| map.contains_key(*key))
        .collect();
    match found.as_slice() {
        [] => Ok(None),
        [one] => Ok(Some(*one)),
        many => Err(format!("ambiguous step: multiple action keys {}", many.join(", "))),
    }
}

fn has_key(value: &serde_yaml::Value, key: &str) -> bool {
    value.as_mapping().is_some_and(|map| map.contains_key(key))
}

fn from_value<T: DeserializeOwned>(value: serde_yaml::Value, action: &str) -> Result<T, String> {
    serde_yaml::from_value(value).map_err(|e| format!("invalid '{action}' step: {e}"))
}

fn yaml_kind(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "a boolean",
        serde_yaml::Value::Number(_) => "a number",
        serde_yaml::Value::String(_) => "a string",
        serde_yaml::Value::Sequence(_) => "a list",
        serde_yaml::Value::Mapping(_) => "a mapping",
        serde_yaml::Value::Tagged(_) => "a tagged value",
    }
}

/// 목록 또는 `{defaults, steps}` 형태의 섹션을 분해합니다.
fn section_parts<T: DeserializeOwned>(
    value: serde_yaml::Value,
) -> Result<(Option<StepDefaults>, Vec<T>), String> {
    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    #[serde(bound = "T: DeserializeOwned")]
    struct Scoped<T> {
        #[serde(default)]
        defaults: Option<StepDefaults>,
        #[serde(default = "Vec::new")]
        steps: Vec<T>,
    }

    match value {
        serde_yaml::Value::Null => Ok((None, Vec::new())),
        serde_yaml::Value::Sequence(_) => serde_yaml::from_value(value)
            .map(|steps| (None, steps))
            .map_err(|e| e.to_string()),
        serde_yaml::Value::Mapping(_) => serde_yaml::from_value::<Scoped<T>>(value)
            .map(|scoped| (scoped.defaults, scoped.steps))
            .map_err(|e| e.to_string()),
        other => Err(format!("section must be a list or a mapping, got {}", yaml_kind(&other))),
    }
}

/// `setup`/`test` 섹션
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "serde_yaml::Value")]
pub struct StepSection {
    pub defaults: Option<StepDefaults>,
    pub steps: Vec<Step>,
}

impl TryFrom<serde_yaml::Value> for StepSection {
    type Error = String;

    fn try_from(value: serde_yaml::Value) -> Result<Self, Self::Error> {
        let (defaults, steps) = section_parts(value)?;
        Ok(Self { defaults, steps })
    }
}

/// `check` 섹션
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "serde_yaml::Value")]
pub struct CheckSection {
    pub defaults: Option<StepDefaults>,
    pub steps: Vec<Check>,
}

impl TryFrom<serde_yaml::Value> for CheckSection {
    type Error = String;

    fn try_from(value: serde_yaml::Value) -> Result<Self, Self::Error> {
        let (defaults, steps) = section_parts(value)?;
        Ok(Self { defaults, steps })
    }
}

/// 실행 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Test,
    Check,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Test => "test",
            Self::Check => "check",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 시나리오 파일의 용도
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    /// 일반 테스트 시나리오 (`test` 단계 필수)
    Test,
    /// 스위트 시작 전 한 번 실행되는 준비 시나리오 (`setup` 단계만 필수)
    SuiteSetup,
}

fn default_version() -> String {
    "1.0".to_owned()
}

/// 시나리오 정의 (파싱 후 불변)
///
/// 네트워크 토폴로지, 패키지, 파일 배치, include 같은 프로비저닝 필드는
/// 이 크레이트가 다루지 않으므로 무시합니다.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    #[serde(default)]
    pub defaults: Option<StepDefaults>,
    #[serde(default)]
    pub setup: StepSection,
    #[serde(default)]
    pub test: StepSection,
    #[serde(default)]
    pub check: CheckSection,
}

impl Scenario {
    /// YAML 문자열에서 시나리오를 파싱하고 검증합니다.
    pub fn from_yaml(yaml: &str) -> Result<Self, ScenarioError> {
        Self::from_yaml_as(yaml, ScenarioKind::Test)
    }

    /// 지정한 용도의 규칙으로 YAML 문자열을 파싱하고 검증합니다.
    pub fn from_yaml_as(yaml: &str, kind: ScenarioKind) -> Result<Self, ScenarioError> {
        let scenario: Self = serde_yaml::from_str(yaml).map_err(|e| ScenarioError::Parse {
            reason: e.to_string(),
        })?;
        scenario.validate_as(kind)?;
        Ok(scenario)
    }

    /// 단일 YAML 파일에서 테스트 시나리오를 로드합니다.
    pub async fn load_file(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        Self::load_file_as(path, ScenarioKind::Test).await
    }

    /// 단일 YAML 파일에서 지정한 용도의 시나리오를 로드합니다.
    pub async fn load_file_as(
        path: impl AsRef<Path>,
        kind: ScenarioKind,
    ) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let load_err = |reason: String| ScenarioError::Load {
            path: path.display().to_string(),
            reason,
        };

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| load_err(format!("failed to read file metadata: {e}")))?;
        if metadata.len() > MAX_SCENARIO_FILE_SIZE {
            return Err(load_err(format!(
                "file too large: {} bytes (max {MAX_SCENARIO_FILE_SIZE})",
                metadata.len()
            )));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| load_err(format!("failed to read file: {e}")))?;
        let scenario = Self::from_yaml_as(&content, kind)?;

        tracing::debug!(
            path = %path.display(),
            name = %scenario.name,
            ?kind,
            setup_steps = scenario.setup.steps.len(),
            steps = scenario.test.steps.len(),
            "loaded scenario"
        );
        Ok(scenario)
    }

    /// 테스트 시나리오 구조를 검증합니다.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        self.validate_as(ScenarioKind::Test)
    }

    /// 용도별 구조를 검증합니다.
    ///
    /// 스위트 준비 시나리오는 `test` 단계 없이 `setup` 단계만 가질 수 있습니다.
    pub fn validate_as(&self, kind: ScenarioKind) -> Result<(), ScenarioError> {
        let invalid = |reason: &str| ScenarioError::Invalid {
            name: self.name.clone(),
            reason: reason.to_owned(),
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        match kind {
            ScenarioKind::Test if self.test.steps.is_empty() => {
                Err(invalid("test section must contain at least one step"))
            }
            ScenarioKind::SuiteSetup if self.setup.steps.is_empty() => {
                Err(invalid("suite setup must contain at least one setup step"))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(yaml: &str) -> Result<Step, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    #[test]
    fn cli_step_with_shared_fields() {
        let parsed = step(
            "cli: token_decl -token TKN\nnode: node2\nwait: 5s\nexpect: error\ntimeout: 45\nsave: decl",
        )
        .unwrap();
        let Step::Cli(cli) = parsed else {
            panic!("expected cli step");
        };
        assert_eq!(cli.node.as_deref(), Some("node2"));
        assert_eq!(cli.wait, Some(Duration::from_secs(5)));
        assert_eq!(cli.expect, Some(ExpectResult::Error));
        assert_eq!(cli.timeout, Some(Duration::from_secs(45)));
        assert_eq!(cli.save.as_deref(), Some("decl"));
    }

    #[test]
    fn unset_fields_stay_none() {
        let Step::Cli(cli) = step("cli: net list").unwrap() else {
            panic!("expected cli step");
        };
        assert!(cli.node.is_none());
        assert!(cli.timeout.is_none());
        assert!(cli.expect.is_none());
        assert!(cli.wait.is_none());
    }

    #[test]
    fn bare_wait_is_wait_step() {
        assert_eq!(
            step("wait: 250ms").unwrap(),
            Step::Wait(WaitStep {
                wait: Duration::from_millis(250)
            })
        );
    }

    #[test]
    fn wait_for_datum_accepts_one_or_many() {
        let Step::WaitForDatum(one) = step("wait_for_datum: \"{{hash}}\"").unwrap() else {
            panic!("expected wait_for_datum");
        };
        assert_eq!(one.wait_for_datum.as_slice(), ["{{hash}}"]);
        assert!(one.check_master_nodes);
        assert!(one.timeout_total.is_none());

        let Step::WaitForDatum(many) =
            step("wait_for_datum: [a, b]\ncheck_master_nodes: false\ntimeout_mempool: 10").unwrap()
        else {
            panic!("expected wait_for_datum");
        };
        assert_eq!(many.wait_for_datum.as_slice().len(), 2);
        assert!(!many.check_master_nodes);
        assert_eq!(many.timeout_mempool, Some(Duration::from_secs(10)));
    }

    #[test]
    fn group_and_loop_nest() {
        let parsed = step(
            r#"
name: emit
defaults:
  node: node3
steps:
  - loop: 2
    steps:
      - cli: tx_create -value {{iteration}}
"#,
        )
        .unwrap();
        let Step::Group(group) = parsed else {
            panic!("expected group");
        };
        assert_eq!(group.name.as_deref(), Some("emit"));
        assert_eq!(group.defaults.unwrap().node.as_deref(), Some("node3"));
        let Step::Loop(inner) = &group.steps[0] else {
            panic!("expected loop");
        };
        assert_eq!(inner.count, 2);
        assert_eq!(inner.steps[0].kind(), "cli");
    }

    #[test]
    fn zero_loop_is_rejected() {
        let err = step("loop: 0\nsteps: [{wait: 1s}]").unwrap_err();
        assert!(err.to_string().contains("greater than 0"));
    }

    #[test]
    fn ambiguous_step_is_rejected() {
        let err = step("cli: net list\nbash: echo hi").unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
    }

    #[test]
    fn unknown_step_lists_accepted_keys() {
        let err = step("shell: echo hi").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("cli"));
        assert!(msg.contains("wait_for_datum"));
    }

    #[test]
    fn typo_in_step_field_is_rejected() {
        let err = step("cli: net list\nnodes: node2").unwrap_err();
        assert!(err.to_string().contains("nodes"));
    }

    #[test]
    fn extract_spec_defaults_and_aliases() {
        let spec: ExtractSpec = serde_yaml::from_str("type: WALLET_ADDRESS").unwrap();
        assert_eq!(spec.kind, ExtractType::WalletAddress);
        assert_eq!(spec.group, 1);
        assert!(spec.required);
        assert!(spec.pattern.is_none());

        let spec: ExtractSpec = serde_yaml::from_str("pattern: 'id: (\\d+)'").unwrap();
        assert_eq!(spec.kind, ExtractType::Raw);
    }

    #[test]
    fn checks_are_dispatched_by_key() {
        let checks: Vec<Check> = serde_yaml::from_str(
            r#"
- cli: token list
  contains: TKN
- rpc: eth_blockNumber
  result_contains: "0x"
- python: assert ctx["x"] == 1
- bash: test -f /tmp/ok
  node: node2
"#,
        )
        .unwrap();
        let kinds: Vec<_> = checks.iter().map(Check::kind).collect();
        assert_eq!(kinds, ["check_cli", "check_rpc", "check_python", "check_bash"]);
    }

    const MINIMAL: &str = r#"
name: smoke
description: minimal scenario
test:
  - cli: net list
"#;

    #[test]
    fn minimal_scenario_parses() {
        let scenario = Scenario::from_yaml(MINIMAL).unwrap();
        assert_eq!(scenario.version, "1.0");
        assert!(scenario.setup.steps.is_empty());
        assert!(scenario.check.steps.is_empty());
        assert_eq!(scenario.test.steps.len(), 1);
    }

    #[test]
    fn sections_accept_scoped_form() {
        let scenario = Scenario::from_yaml(
            r#"
name: scoped
description: sections with defaults
defaults:
  timeout: 10
test:
  defaults:
    timeout: 20
    cli:
      net: stagenet
  steps:
    - cli: token list
check:
  defaults:
    node: node2
  steps:
    - cli: token list
      contains: TKN
"#,
        )
        .unwrap();
        let test_defaults = scenario.test.defaults.unwrap();
        assert_eq!(test_defaults.timeout, Some(Duration::from_secs(20)));
        assert_eq!(test_defaults.cli["net"], "stagenet");
        assert_eq!(scenario.check.defaults.unwrap().node.as_deref(), Some("node2"));
    }

    #[test]
    fn empty_test_section_is_invalid() {
        let err = Scenario::from_yaml("name: x\ndescription: y\ntest: []").unwrap_err();
        assert!(matches!(err, ScenarioError::Invalid { .. }));
    }

    #[test]
    fn suite_setup_needs_only_setup_steps() {
        let yaml = r#"
name: wallets
description: suite-wide wallets
setup:
  - cli: wallet new -w suite_wallet
"#;
        let err = Scenario::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ScenarioError::Invalid { .. }));

        let scenario = Scenario::from_yaml_as(yaml, ScenarioKind::SuiteSetup).unwrap();
        assert_eq!(scenario.setup.steps.len(), 1);
        assert!(scenario.test.steps.is_empty());
    }

    #[test]
    fn suite_setup_without_setup_steps_is_invalid() {
        let err = Scenario::from_yaml_as(
            "name: x\ndescription: y\ntest: [{cli: net list}]",
            ScenarioKind::SuiteSetup,
        )
        .unwrap_err();
        assert!(err.to_string().contains("setup step"));
    }

    #[test]
    fn missing_description_is_parse_error() {
        let err = Scenario::from_yaml("name: x\ntest: [{cli: net list}]").unwrap_err();
        assert!(matches!(err, ScenarioError::Parse { .. }));
    }

    #[test]
    fn provisioning_fields_are_ignored() {
        let scenario = Scenario::from_yaml(
            r#"
name: provisioned
description: carries topology
includes: [common/wallets.yml]
network:
  topology: default
test:
  - wait: 1s
"#,
        )
        .unwrap();
        assert_eq!(scenario.name, "provisioned");
    }

    #[tokio::test]
    async fn load_file_reads_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smoke.yml");
        tokio::fs::write(&path, MINIMAL).await.unwrap();
        let scenario = Scenario::load_file(&path).await.unwrap();
        assert_eq!(scenario.name, "smoke");

        let err = Scenario::load_file(dir.path().join("missing.yml"))
            .await
            .unwrap_err();
        assert!(matches!(err, ScenarioError::Load { .. }));
    }
}
