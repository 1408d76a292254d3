//! 노드 CLI 명령별 옵션 레지스트리
//!
//! `defaults.cli`의 옵션은 대상 명령이 지원하고, 명령에 아직 없을 때만 붙입니다.
//! 기본 제공 목록으로 시작하고, 실행 중인 노드의 `help` 출력을 파싱해 확장할 수 있습니다.
//! 파싱 결과는 JSON 파일로 캐시합니다.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use stage_env_core::error::RunnerError;
use stage_env_core::runner::NodeCommandRunner;

use crate::error::ScenarioError;

static HELP_COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s{2,}(\w+)\s+").expect("help command pattern is valid"));

static HELP_OPTIONS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"-(\w+)\s+<").expect("angle option pattern is valid"),
        Regex::new(r"-(\w+)\s+\[").expect("bracket option pattern is valid"),
        Regex::new(r"(?m)-(\w+)(?:\s|$)").expect("flag option pattern is valid"),
    ]
});

/// `help` 목록에서 제외하는 명령
const IGNORED_COMMANDS: &[&str] = &["help", "version", "exit", "quit"];

const BUILTIN: &[(&str, &[&str])] = &[
    (
        "token_decl",
        &["net", "chain", "token", "total_supply", "signs_total", "signs_emission", "certs", "flags", "decimals", "type"],
    ),
    ("token_emit", &["net", "chain_emission", "chain_base_tx", "token", "emission_value", "addr", "certs", "emission"]),
    ("token_update", &["net", "chain", "token", "total_supply", "certs", "flags", "type"]),
    ("token", &["net", "name", "hash", "history_limit"]),
    ("tx_create", &["net", "chain", "from_wallet", "from_emission", "to_addr", "token", "value", "fee", "cert"]),
    ("tx_cond_create", &["net", "token", "w", "cert", "value", "fee", "unit", "srv_uid"]),
    ("tx_history", &["net", "chain", "addr", "w", "tx", "all", "limit", "offset"]),
    ("wallet", &["net", "w", "addr", "sign", "restore", "force", "password"]),
    ("block", &["net", "chain", "last", "from_hash", "to_hash", "from_date", "to_date", "limit", "offset"]),
    ("mempool_proc", &["net", "chain", "datum"]),
    ("mempool", &["net", "chain", "datum", "addr", "limit", "offset"]),
    ("net", &["net", "mode", "sync"]),
    ("node", &["net", "addr", "alias", "host", "port", "cell"]),
    ("ledger", &["net", "chain", "hash", "token", "addr", "w", "limit", "offset"]),
];

/// 명령 → 지원 옵션 집합
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOptionRegistry {
    commands: BTreeMap<String, BTreeSet<String>>,
}

impl CliOptionRegistry {
    /// 빈 레지스트리 (옵션 주입 없음)
    pub fn empty() -> Self {
        Self::default()
    }

    /// 기본 제공 명령 목록
    pub fn builtin() -> Self {
        let commands = BUILTIN
            .iter()
            .map(|(command, options)| {
                let options = options.iter().map(|o| (*o).to_owned()).collect();
                ((*command).to_owned(), options)
            })
            .collect();
        Self { commands }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn options(&self, command: &str) -> Option<&BTreeSet<String>> {
        self.commands.get(command)
    }

    pub fn supports(&self, command: &str, option: &str) -> bool {
        self.commands
            .get(command)
            .is_some_and(|options| options.contains(option))
    }

    /// 옵션 집합을 추가합니다. 이미 있는 명령이면 합칩니다.
    pub fn insert(&mut self, command: impl Into<String>, options: impl IntoIterator<Item = String>) {
        self.commands.entry(command.into()).or_default().extend(options);
    }

    pub fn extend(&mut self, other: CliOptionRegistry) {
        for (command, options) in other.commands {
            self.insert(command, options);
        }
    }

    /// 지원되고 아직 없는 기본 옵션을 명령 끝에 붙입니다.
    pub fn apply_cli_defaults(&self, command: &str, defaults: &BTreeMap<String, String>) -> String {
        if defaults.is_empty() {
            return command.to_owned();
        }
        let Some(name) = command.split_whitespace().next() else {
            return command.to_owned();
        };
        let present: BTreeSet<&str> = command
            .split_whitespace()
            .filter_map(|token| token.strip_prefix('-'))
            .collect();

        let additions: Vec<String> = defaults
            .iter()
            .filter(|(option, _)| self.supports(name, option) && !present.contains(option.as_str()))
            .map(|(option, value)| format!("-{option} {value}"))
            .collect();
        if additions.is_empty() {
            return command.to_owned();
        }
        tracing::debug!(command = name, added = ?additions, "injected default cli options");
        format!("{command} {}", additions.join(" "))
    }

    /// 노드의 `help` 출력으로 명령별 옵션을 수집합니다.
    ///
    /// 개별 명령의 도움말 실패는 건너뜁니다. 최상위 `help`가 실패하면 에러입니다.
    pub async fn discover<R: NodeCommandRunner>(
        runner: &R,
        node: &str,
        timeout: Duration,
    ) -> Result<Self, RunnerError> {
        let main = runner.run(node, &["help".to_owned()], timeout).await?;
        let commands = parse_help_commands(&main.stdout);
        tracing::info!(node, commands = commands.len(), "parsing cli help");

        let mut registry = Self::default();
        for command in commands {
            let argv = [command.clone(), "-h".to_owned()];
            let output = match runner.run(node, &argv, timeout).await {
                Ok(output) => output,
                Err(e) => {
                    tracing::debug!(node, command = %command, error = %e, "cli help failed");
                    continue;
                }
            };
            let text = if output.is_success() {
                &output.stdout
            } else {
                &output.stderr
            };
            registry.insert(command, parse_help_options(text));
        }
        tracing::info!(node, commands = registry.len(), "cli option discovery complete");
        Ok(registry)
    }

    /// JSON 캐시에서 읽습니다. 비어 있는 캐시는 `None`입니다.
    pub async fn load_cache(path: impl AsRef<Path>) -> Result<Option<Self>, ScenarioError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ScenarioError::Load {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        let commands: BTreeMap<String, BTreeSet<String>> =
            serde_json::from_str(&content).map_err(|e| ScenarioError::Parse {
                reason: format!("invalid cli option cache {}: {e}", path.display()),
            })?;
        if commands.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self { commands }))
    }

    pub async fn save_cache(&self, path: impl AsRef<Path>) -> Result<(), ScenarioError> {
        let path = path.as_ref();
        let io_err = |reason: String| ScenarioError::Load {
            path: path.display().to_string(),
            reason,
        };
        let json = serde_json::to_string_pretty(&self.commands).map_err(|e| io_err(e.to_string()))?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| io_err(e.to_string()))
    }
}

/// 최상위 `help` 출력에서 명령 이름을 뽑습니다.
pub fn parse_help_commands(help: &str) -> Vec<String> {
    help.lines()
        .filter_map(|line| HELP_COMMAND.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_owned()))
        .filter(|name| !IGNORED_COMMANDS.contains(&name.as_str()))
        .collect()
}

/// 명령 도움말에서 옵션 이름을 뽑습니다. 한 글자 옵션은 제외합니다.
pub fn parse_help_options(help: &str) -> BTreeSet<String> {
    HELP_OPTIONS
        .iter()
        .flat_map(|pattern| pattern.captures_iter(help))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .filter(|option| option.chars().count() > 1)
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use stage_env_core::runner::CommandOutput;
    use stage_env_core::testing::ScriptedRunner;

    const MAIN_HELP: &str = "\
Available commands:

  help          Description of command parameters
  token_decl    Token declaration
  token_emit    Token emission
  wallet        Wallet operations
  tx_create     Make transaction
  exit          Stop application
";

    const TOKEN_DECL_HELP: &str = "\
token_decl -net <net_name> [-chain <chain_name>] -token <token_ticker> -total_supply <total_supply>
    -signs_total <sign_total> -signs_emission <signs_for_emission> -certs <certs_list>
    [-flags [flag1,flag2]] [-decimals <18>] -v
";

    fn defaults(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn help_commands_skip_keywords() {
        let commands = parse_help_commands(MAIN_HELP);
        assert_eq!(commands, ["token_decl", "token_emit", "wallet", "tx_create"]);
    }

    #[test]
    fn help_options_drop_single_letters() {
        let options = parse_help_options(TOKEN_DECL_HELP);
        for expected in ["net", "chain", "token", "total_supply", "signs_total", "certs", "flags", "decimals"] {
            assert!(options.contains(expected), "missing {expected}");
        }
        assert!(!options.contains("v"));
    }

    #[test]
    fn injects_supported_missing_option() {
        let registry = CliOptionRegistry::builtin();
        let cmd = registry.apply_cli_defaults(
            "token_decl -token TEST -total_supply 1000000",
            &defaults(&[("net", "stagenet")]),
        );
        assert_eq!(cmd, "token_decl -token TEST -total_supply 1000000 -net stagenet");
    }

    #[test]
    fn does_not_duplicate_present_option() {
        let registry = CliOptionRegistry::builtin();
        let cmd = "token_decl -net stagenet -token TEST";
        assert_eq!(
            registry.apply_cli_defaults(cmd, &defaults(&[("net", "mainnet")])),
            cmd
        );
    }

    #[test]
    fn prefix_of_present_option_still_injected() {
        let registry = CliOptionRegistry::builtin();
        let cmd = registry.apply_cli_defaults(
            "token_emit -chain_emission main -token T",
            &defaults(&[("chain", "zerochain"), ("net", "stagenet")]),
        );
        assert_eq!(cmd, "token_emit -chain_emission main -token T -net stagenet");

        let cmd = registry.apply_cli_defaults(
            "tx_create -chain_id 3",
            &defaults(&[("chain", "main")]),
        );
        assert_eq!(cmd, "tx_create -chain_id 3 -chain main");
    }

    #[test]
    fn ignores_unsupported_options_and_unknown_commands() {
        let registry = CliOptionRegistry::builtin();
        let cmd = registry.apply_cli_defaults(
            "token_decl -token TEST",
            &defaults(&[("net", "stagenet"), ("unsupported_option", "value")]),
        );
        assert!(cmd.contains("-net stagenet"));
        assert!(!cmd.contains("-unsupported_option"));

        assert_eq!(
            registry.apply_cli_defaults("version", &defaults(&[("net", "stagenet")])),
            "version"
        );
        assert_eq!(CliOptionRegistry::empty().apply_cli_defaults("net list", &defaults(&[("net", "x")])), "net list");
    }

    #[tokio::test]
    async fn discover_reads_help_from_node() {
        let runner = ScriptedRunner::new()
            .on(Some("node1"), "help", CommandOutput::ok(MAIN_HELP))
            .on(Some("node1"), "token_decl -h", CommandOutput::ok(TOKEN_DECL_HELP))
            .on(
                Some("node1"),
                "wallet -h",
                CommandOutput::failed(1, "wallet new -w <wallet_name> [-sign <sign_type>]"),
            );

        let registry = CliOptionRegistry::discover(&runner, "node1", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(registry.supports("token_decl", "total_supply"));
        assert!(registry.supports("wallet", "sign"));
        assert!(!registry.supports("wallet", "w"));
        assert_eq!(runner.count_calls("help"), 1);
    }

    #[tokio::test]
    async fn cache_round_trip_and_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cli_options.json");

        let mut registry = CliOptionRegistry::empty();
        registry.insert("token_decl", ["net".to_owned(), "token".to_owned()]);
        registry.save_cache(&path).await.unwrap();
        let loaded = CliOptionRegistry::load_cache(&path).await.unwrap().unwrap();
        assert_eq!(loaded, registry);

        tokio::fs::write(&path, "{}").await.unwrap();
        assert!(CliOptionRegistry::load_cache(&path).await.unwrap().is_none());
    }
}
