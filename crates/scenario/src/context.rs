//! 런타임 컨텍스트
//!
//! 시나리오 실행 하나가 독점적으로 소유하는 변수 저장소와 결과 기록입니다.
//! 동시에 실행되는 시나리오끼리 공유하지 않습니다.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::ScenarioError;

static VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("variable pattern is valid"));

/// 스텝 실행 기록 한 건
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    #[serde(rename = "type")]
    pub step_type: String,
    pub success: bool,
    /// 실행 시작 후 경과 시간 (초)
    #[serde(serialize_with = "serialize_secs")]
    pub timestamp: Duration,
    /// 스텝별 세부 정보 (자체 키 아래에 두어 `type`/`success`와 겹치지 않음)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, Value>,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// 실행 요약
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionSummary {
    pub scenario: String,
    pub run_id: String,
    pub total_steps: usize,
    pub passed: usize,
    pub failed: usize,
    /// 소수 둘째 자리까지
    pub duration_secs: f64,
    /// 백분율, 소수 첫째 자리까지 (기록이 없으면 0)
    pub success_rate: f64,
}

impl fmt::Display for ExecutionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} passed ({:.1}%) in {:.2}s",
            self.scenario, self.passed, self.total_steps, self.success_rate, self.duration_secs
        )
    }
}

/// 시나리오 실행 컨텍스트
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    scenario: String,
    run_id: Uuid,
    started_at: DateTime<Utc>,
    start: Instant,
    variables: BTreeMap<String, Value>,
    results: Vec<StepRecord>,
}

impl RuntimeContext {
    pub fn new(scenario: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            start: Instant::now(),
            variables: BTreeMap::new(),
            results: Vec::new(),
        }
    }

    /// 초기 변수와 함께 만듭니다.
    pub fn with_variables(mut self, variables: BTreeMap<String, Value>) -> Self {
        self.variables.extend(variables);
        self
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// 변수를 저장합니다 (덮어쓰기 허용).
    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        tracing::debug!(variable = %name, value = %render_value(&value), "set variable");
        self.variables.insert(name, value);
    }

    /// 이미 있는 값은 유지하고, 없을 때만 저장합니다.
    pub fn set_default_variable(&mut self, name: &str, value: impl Into<Value>) {
        if !self.variables.contains_key(name) {
            self.variables.insert(name.to_owned(), value.into());
        }
    }

    /// 변수를 읽습니다. 없으면 실패합니다.
    pub fn get_variable(&self, name: &str) -> Result<&Value, ScenarioError> {
        self.variables
            .get(name)
            .ok_or_else(|| ScenarioError::UndefinedVariable {
                name: name.to_owned(),
            })
    }

    pub fn variables(&self) -> &BTreeMap<String, Value> {
        &self.variables
    }

    /// `{{name}}`을 변수 값으로 바꿉니다. 정의되지 않은 변수가 하나라도 있으면 실패합니다.
    pub fn substitute(&self, text: &str) -> Result<String, ScenarioError> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in VARIABLE.captures_iter(text) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let value = self.get_variable(name.as_str())?;
            out.push_str(&text[last..whole.start()]);
            out.push_str(&render_value(value));
            last = whole.end();
        }
        out.push_str(&text[last..]);
        Ok(out)
    }

    /// JSON 값 안의 문자열에만 치환을 적용합니다 (RPC 파라미터).
    pub fn substitute_value(&self, value: &Value) -> Result<Value, ScenarioError> {
        match value {
            Value::String(text) => self.substitute(text).map(Value::String),
            other => Ok(other.clone()),
        }
    }

    /// 스텝 결과를 기록합니다.
    pub fn add_result(
        &mut self,
        step_type: impl Into<String>,
        success: bool,
        details: BTreeMap<String, Value>,
    ) {
        self.results.push(StepRecord {
            step_type: step_type.into(),
            success,
            timestamp: self.start.elapsed(),
            details,
        });
    }

    pub fn results(&self) -> &[StepRecord] {
        &self.results
    }

    pub fn get_summary(&self) -> ExecutionSummary {
        let total = self.results.len();
        let passed = self.results.iter().filter(|r| r.success).count();
        let success_rate = if total == 0 {
            0.0
        } else {
            round_to(passed as f64 / total as f64 * 100.0, 1)
        };
        ExecutionSummary {
            scenario: self.scenario.clone(),
            run_id: self.run_id.to_string(),
            total_steps: total,
            passed,
            failed: total - passed,
            duration_secs: round_to(self.start.elapsed().as_secs_f64(), 2),
            success_rate,
        }
    }
}

/// 치환에 쓰는 변수 값의 문자열 표현 (문자열은 따옴표 없이)
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

/// `add_result`용 세부 정보 맵을 만듭니다.
#[macro_export]
macro_rules! details {
    () => { ::std::collections::BTreeMap::<String, ::serde_json::Value>::new() };
    ($($key:literal => $value:expr),+ $(,)?) => {{
        let mut map = ::std::collections::BTreeMap::<String, ::serde_json::Value>::new();
        $( map.insert($key.to_owned(), ::serde_json::json!($value)); )+
        map
    }};
}
