//! CLI 출력 판정
//!
//! 노드 CLI는 실패해도 종료 코드 0을 돌려주는 경우가 많아서, 종료 코드와 함께
//! 출력에 담긴 구조화된 `errors` 필드를 확인합니다.
//!
//! `errors`가 매핑이고 `code`가 0이면 성공으로 봅니다. 노드가 성공 응답에도
//! `errors: {code: 0, message: ...}`를 붙이기 때문입니다.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use stage_env_core::runner::CommandOutput;

use crate::schema::ExpectResult;

/// 구조화되지 않은 출력에서 에러로 보는 문구
const TEXT_ERROR_MARKERS: &[&str] = &["error:", "Error:", "ERROR:", "failed", "Failed"];

/// 저장 시 해시를 뽑아내는 명령
const HASH_COMMANDS: &[&str] = &[
    "token_decl",
    "token_emit",
    "token_update",
    "tx_create",
    "tx_send",
    "wallet_new",
    "cert_create",
];

/// 해시를 찾을 출력 키 (앞에 있을수록 우선)
const HASH_KEYS: &[&str] = &[
    "hash",
    "tx_hash",
    "datum_hash",
    "token_hash",
    "emission_hash",
    "cert_hash",
    "wallet_addr",
];

static WALLET_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-w\s+(\S+)").expect("wallet name pattern is valid"));

static HEX_HASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"0x[0-9a-fA-F]{64,}").expect("hex hash pattern is valid"));

/// 출력을 YAML, 실패하면 JSON으로 파싱합니다.
fn parse_structured(stdout: &str) -> Option<Value> {
    serde_yaml::from_str::<Value>(stdout)
        .ok()
        .or_else(|| serde_json::from_str::<Value>(stdout).ok())
}

fn code_is_zero(entry: &Value) -> bool {
    entry
        .get("code")
        .and_then(Value::as_i64)
        .is_some_and(|code| code == 0)
}

/// `errors` 필드 하나를 판정합니다.
fn errors_field_reports_failure(errors: &Value) -> bool {
    match errors {
        Value::Object(map) if map.is_empty() => false,
        Value::Object(_) => !code_is_zero(errors),
        Value::Array(list) if list.is_empty() => false,
        Value::Array(list) => !list.iter().all(code_is_zero),
        _ => false,
    }
}

fn reports_failure(document: &Value) -> bool {
    match document {
        Value::Object(map) => map.get("errors").is_some_and(errors_field_reports_failure),
        Value::Array(items) => items.iter().any(|item| {
            item.get("errors").is_some_and(errors_field_reports_failure)
        }),
        _ => false,
    }
}

/// 출력이 에러를 보고하는지 판정합니다.
///
/// 구조화된 출력이면 `errors` 필드만 보고, 아니면 에러 문구를 찾습니다.
pub fn output_reports_error(stdout: &str) -> bool {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return false;
    }
    match parse_structured(trimmed) {
        Some(document @ (Value::Object(_) | Value::Array(_))) => reports_failure(&document),
        _ => TEXT_ERROR_MARKERS.iter().any(|marker| trimmed.contains(marker)),
    }
}

fn is_wallet_new(command: &str) -> bool {
    let mut words = command.split_whitespace();
    words.next() == Some("wallet") && words.next() == Some("new")
}

fn mentions_already_exists(entry: &Value) -> bool {
    entry
        .get("message")
        .and_then(Value::as_str)
        .is_some_and(|m| m.to_lowercase().contains("already exists"))
}

/// `wallet new`가 지갑이 이미 있어서 실패했는지 판정합니다.
///
/// 이 경우는 실패가 아니라 기존 지갑을 재사용하는 것으로 봅니다.
pub fn wallet_already_exists(command: &str, stdout: &str) -> bool {
    if !is_wallet_new(command) {
        return false;
    }
    let Some(Value::Object(map)) = parse_structured(stdout.trim()) else {
        return false;
    };
    match map.get("errors") {
        Some(errors @ Value::Object(_)) => mentions_already_exists(errors),
        Some(Value::Array(list)) => list.iter().any(mentions_already_exists),
        _ => false,
    }
}

/// 명령의 `-w <name>` 인자
pub fn wallet_name(command: &str) -> Option<&str> {
    WALLET_NAME
        .captures(command)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// 판정 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail(String),
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// 명령 결과가 기대 결과와 맞는지 판정합니다.
pub fn evaluate(output: &CommandOutput, expect: ExpectResult, contains: Option<&str>) -> Verdict {
    let has_error = output_reports_error(&output.stdout);
    match expect {
        ExpectResult::Success if !output.is_success() => {
            return Verdict::Fail(format!("command exited with code {}", output.exit_code));
        }
        ExpectResult::Success if has_error => {
            return Verdict::Fail("command output reports an error".to_owned());
        }
        ExpectResult::Error if output.is_success() && !has_error => {
            return Verdict::Fail("expected an error but command succeeded".to_owned());
        }
        _ => {}
    }
    if let Some(needle) = contains
        && !output.stdout.contains(needle)
    {
        return Verdict::Fail(format!("output does not contain '{needle}'"));
    }
    Verdict::Pass
}

/// 저장할 값: 해시를 만드는 명령이면 해시, 아니면 앞뒤 공백을 제거한 stdout
pub fn saved_value_for(command: &str, stdout: &str) -> String {
    let trimmed = stdout.trim();
    if !produces_hash(command) {
        return trimmed.to_owned();
    }
    if let Some(hash) = structured_hash(trimmed) {
        return hash;
    }
    if let Some(found) = HEX_HASH.find(trimmed) {
        return found.as_str().to_owned();
    }
    trimmed.to_owned()
}

fn produces_hash(command: &str) -> bool {
    let mut words = command.split_whitespace();
    let (Some(first), second) = (words.next(), words.next()) else {
        return false;
    };
    HASH_COMMANDS.iter().any(|candidate| {
        *candidate == first
            || second.is_some_and(|second| {
                candidate
                    .split_once('_')
                    .is_some_and(|(head, tail)| head == first && tail == second)
            })
    })
}

fn structured_hash(stdout: &str) -> Option<String> {
    let Some(Value::Object(map)) = parse_structured(stdout) else {
        return None;
    };
    HASH_KEYS.iter().find_map(|key| match map.get(*key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_code_zero_counts_as_success() {
        let out = CommandOutput::ok("errors:\n  code: 0\n  message: ok\nhash: 0xabc\n");
        assert!(!output_reports_error(&out.stdout));
        assert!(evaluate(&out, ExpectResult::Success, None).is_pass());
        assert!(!evaluate(&out, ExpectResult::Error, None).is_pass());
    }

    #[test]
    fn errors_with_nonzero_code_fails_despite_exit_zero() {
        let out = CommandOutput::ok("errors:\n  code: 3\n  message: token exists\n");
        assert!(output_reports_error(&out.stdout));
        assert_eq!(
            evaluate(&out, ExpectResult::Success, None),
            Verdict::Fail("command output reports an error".to_owned())
        );
        assert!(evaluate(&out, ExpectResult::Error, None).is_pass());
    }

    #[test]
    fn existing_wallet_is_detected_only_for_wallet_new() {
        let exists = "errors:\n  code: 4\n  message: Wallet Already Exists\n";
        assert!(wallet_already_exists("wallet new -w alice -sign sig_dil", exists));
        assert!(!wallet_already_exists("wallet info -w alice", exists));
        assert!(!wallet_already_exists(
            "wallet new -w alice",
            "errors:\n  code: 2\n  message: wrong signature type\n"
        ));
        assert!(!wallet_already_exists("wallet new -w alice", "wallet: alice\n"));
        assert!(wallet_already_exists(
            "wallet new -w alice",
            r#"{"errors": [{"code": 4, "message": "wallet already exists"}]}"#
        ));
    }

    #[test]
    fn wallet_name_comes_from_w_flag() {
        assert_eq!(wallet_name("wallet new -w alice -sign sig_dil"), Some("alice"));
        assert_eq!(wallet_name("wallet new -sign sig_dil"), None);
    }

    #[test]
    fn errors_list_passes_only_when_all_codes_zero() {
        assert!(!output_reports_error(r#"{"errors": [{"code": 0}, {"code": 0}]}"#));
        assert!(output_reports_error(r#"{"errors": [{"code": 0}, {"code": 7}]}"#));
        assert!(!output_reports_error(r#"{"errors": []}"#));
        assert!(!output_reports_error("errors: {}"));
    }

    #[test]
    fn errors_inside_top_level_list_are_checked() {
        assert!(output_reports_error("- status: ok\n- errors:\n    code: 2\n"));
        assert!(!output_reports_error("- status: ok\n- errors:\n    code: 0\n"));
    }

    #[test]
    fn scalar_errors_field_is_not_an_error() {
        assert!(!output_reports_error("errors: none\nstatus: ok"));
    }

    #[test]
    fn plain_text_markers() {
        assert!(output_reports_error("wallet creation failed\ndisk full"));
        assert!(output_reports_error("{unbalanced Error: bracket"));
        assert!(!output_reports_error("status: online"));
        assert!(!output_reports_error(""));
    }

    #[test]
    fn structured_output_ignores_text_markers() {
        assert!(!output_reports_error("message: nothing failed\ncount: 2"));
    }

    #[test]
    fn nonzero_exit_is_error() {
        let out = CommandOutput::failed(2, "unknown command");
        assert!(!evaluate(&out, ExpectResult::Success, None).is_pass());
        assert!(evaluate(&out, ExpectResult::Error, None).is_pass());
        assert!(evaluate(&out, ExpectResult::Any, None).is_pass());
    }

    #[test]
    fn contains_is_an_extra_gate() {
        let out = CommandOutput::ok("net: stagenet\nstate: ONLINE");
        assert!(evaluate(&out, ExpectResult::Success, Some("ONLINE")).is_pass());
        assert!(!evaluate(&out, ExpectResult::Success, Some("OFFLINE")).is_pass());
        assert!(!evaluate(&out, ExpectResult::Any, Some("OFFLINE")).is_pass());
    }

    #[test]
    fn saved_hash_from_structured_output() {
        let out = "status: ok\ntx_hash: \"0xDEAD\"\nhash: ''\n";
        assert_eq!(saved_value_for("tx_create -net stagenet", out), "0xDEAD");
        let out = "hash: first\ntx_hash: second\n";
        assert_eq!(saved_value_for("token_decl -token T", out), "first");
    }

    #[test]
    fn saved_hash_from_text_and_spaced_command() {
        let hash = format!("0x{}", "A1".repeat(32));
        let out = format!("Datum {hash} placed in mempool");
        assert_eq!(saved_value_for("token decl -token T", &out), hash);
    }

    #[test]
    fn other_commands_save_trimmed_stdout() {
        let hash = format!("0x{}", "A1".repeat(32));
        assert_eq!(saved_value_for("net list", &format!("  {hash}\n")), hash);
        assert_eq!(saved_value_for("net list", "  stagenet \n"), "stagenet");
        assert_eq!(saved_value_for("tx_create", "no hash here\n"), "no hash here");
    }
}
