//! 호스트 Python 실행
//!
//! 스니펫은 임베드하지 않고 설정된 인터프리터로 실행합니다. 시나리오 변수는
//! JSON으로 넘겨 `ctx` 딕셔너리로 노출하고, 스니펫이 `result`에 바인딩한 값을
//! 표식 줄로 돌려받습니다.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

use stage_env_core::error::RunnerError;
use stage_env_core::runner::{CommandOutput, NodeCommandRunner};

/// 결과 JSON 앞에 붙는 표식
pub const RESULT_MARKER: &str = "__STAGE_ENV_RESULT__";

const CTX_ENV: &str = "STAGE_ENV_CTX";
const CODE_ENV: &str = "STAGE_ENV_CODE";

const WRAPPER: &str = r#"import json, os
ctx = json.loads(os.environ["STAGE_ENV_CTX"])
ns = {"ctx": ctx}
exec(os.environ["STAGE_ENV_CODE"], ns)
print("__STAGE_ENV_RESULT__" + json.dumps(ns.get("result"), default=str))
"#;

/// Python 실행 결과
#[derive(Debug, Clone, PartialEq)]
pub struct PythonOutcome {
    pub output: CommandOutput,
    /// `result` 값 (표식 줄이 없으면 `None`)
    pub result: Option<Value>,
}

pub async fn run_python<R: NodeCommandRunner>(
    runner: &R,
    python_bin: &str,
    code: &str,
    variables: &BTreeMap<String, Value>,
    timeout: Duration,
) -> Result<PythonOutcome, RunnerError> {
    let ctx_json = serde_json::to_string(variables).map_err(|e| RunnerError::Spawn {
        program: python_bin.to_owned(),
        reason: format!("failed to encode python context: {e}"),
    })?;
    let env = [
        (CTX_ENV.to_owned(), ctx_json),
        (CODE_ENV.to_owned(), code.to_owned()),
    ];
    let args = ["-c".to_owned(), WRAPPER.to_owned()];
    let output = runner.run_host(python_bin, &args, &env, timeout).await?;
    let result = parse_result(&output.stdout);
    Ok(PythonOutcome { output, result })
}

/// 마지막 표식 줄의 JSON을 읽습니다. 파싱에 실패하면 문자열 그대로입니다.
pub fn parse_result(stdout: &str) -> Option<Value> {
    let payload = stdout
        .lines()
        .rev()
        .find_map(|line| line.trim_end().strip_prefix(RESULT_MARKER))?;
    Some(serde_json::from_str(payload).unwrap_or_else(|_| Value::String(payload.to_owned())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stage_env_core::testing::{CallKind, ScriptedRunner};

    #[test]
    fn wrapper_prints_marker() {
        assert!(WRAPPER.contains(RESULT_MARKER));
        assert!(WRAPPER.contains(CTX_ENV));
        assert!(WRAPPER.contains(CODE_ENV));
    }

    #[test]
    fn parse_result_takes_last_marker_line() {
        let stdout = format!("hello\n{RESULT_MARKER}1\nmore\n{RESULT_MARKER}{{\"a\": [1, 2]}}\n");
        assert_eq!(parse_result(&stdout), Some(json!({"a": [1, 2]})));
        assert_eq!(parse_result(&format!("{RESULT_MARKER}null")), Some(Value::Null));
        assert_eq!(parse_result("no marker"), None);
    }

    #[tokio::test]
    async fn runs_through_host_runner() {
        let runner = ScriptedRunner::new().on_host(
            "python3 -c",
            CommandOutput::ok(format!("{RESULT_MARKER}\"0xabc\"\n")),
        );
        let vars = BTreeMap::from([("hash".to_owned(), json!("0xabc"))]);
        let outcome = run_python(&runner, "python3", "result = ctx['hash']", &vars, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(outcome.result, Some(json!("0xabc")));
        let calls = runner.calls();
        assert_eq!(calls[0].kind, CallKind::Host);
        assert_eq!(calls[0].timeout, Duration::from_secs(5));
    }
}
