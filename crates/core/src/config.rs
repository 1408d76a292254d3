//! 설정 관리: stage-env.toml 파싱 및 런타임 설정
//!
//! [`StageEnvConfig`]는 하네스 전체 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`STAGE_ENV_NETWORK_NAME=devnet` 형식)
//! 3. 설정 파일 (`stage-env.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), stage_env_core::error::StageEnvError> {
//! use stage_env_core::config::StageEnvConfig;
//!
//! let config = StageEnvConfig::load("stage-env.toml").await?;
//! let config = StageEnvConfig::parse("[network]\nname = \"devnet\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, StageEnvError};

/// 설정 가능한 최대 노드 수
pub const MAX_NODES: usize = 64;

/// 모든 타임아웃 설정의 상한 (초)
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// stage-env 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageEnvConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 테스트 네트워크 설정
    #[serde(default)]
    pub network: NetworkConfig,
    /// 노드 명령 실행 설정
    #[serde(default)]
    pub runner: RunnerConfig,
    /// 모니터링 설정
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl StageEnvConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StageEnvError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, StageEnvError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StageEnvError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                StageEnvError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, StageEnvError> {
        toml::from_str(toml_str).map_err(|e| {
            StageEnvError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `STAGE_ENV_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "STAGE_ENV_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "STAGE_ENV_GENERAL_LOG_FORMAT");

        // Network
        override_string(&mut self.network.name, "STAGE_ENV_NETWORK_NAME");
        override_string(&mut self.network.chain, "STAGE_ENV_NETWORK_CHAIN");
        override_csv(&mut self.network.nodes, "STAGE_ENV_NETWORK_NODES");
        override_csv(
            &mut self.network.master_nodes,
            "STAGE_ENV_NETWORK_MASTER_NODES",
        );

        // Runner
        override_string(&mut self.runner.docker_bin, "STAGE_ENV_RUNNER_DOCKER_BIN");
        override_string(&mut self.runner.cli_path, "STAGE_ENV_RUNNER_CLI_PATH");
        override_string(
            &mut self.runner.container_prefix,
            "STAGE_ENV_RUNNER_CONTAINER_PREFIX",
        );
        override_u16(&mut self.runner.rpc_port, "STAGE_ENV_RUNNER_RPC_PORT");
        override_string(&mut self.runner.rpc_scheme, "STAGE_ENV_RUNNER_RPC_SCHEME");
        override_string(&mut self.runner.python_bin, "STAGE_ENV_RUNNER_PYTHON_BIN");
        override_u64(
            &mut self.runner.command_timeout_secs,
            "STAGE_ENV_RUNNER_COMMAND_TIMEOUT_SECS",
        );

        // Monitoring
        override_u64(
            &mut self.monitoring.datum_check_interval_ms,
            "STAGE_ENV_MONITORING_DATUM_CHECK_INTERVAL_MS",
        );
        override_u64(
            &mut self.monitoring.mempool_grace_ms,
            "STAGE_ENV_MONITORING_MEMPOOL_GRACE_MS",
        );
        override_u64(
            &mut self.monitoring.heartbeat_secs,
            "STAGE_ENV_MONITORING_HEARTBEAT_SECS",
        );
        override_u64(
            &mut self.monitoring.consensus_check_interval_secs,
            "STAGE_ENV_MONITORING_CONSENSUS_CHECK_INTERVAL_SECS",
        );
        override_u64(
            &mut self.monitoring.consensus_progress_secs,
            "STAGE_ENV_MONITORING_CONSENSUS_PROGRESS_SECS",
        );
        override_u64(
            &mut self.monitoring.consensus_timeout_secs,
            "STAGE_ENV_MONITORING_CONSENSUS_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.monitoring.health_timeout_secs,
            "STAGE_ENV_MONITORING_HEALTH_TIMEOUT_SECS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), StageEnvError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.network.name.is_empty() {
            return Err(invalid("network.name", "must not be empty".to_owned()));
        }
        if self.network.chain.is_empty() {
            return Err(invalid("network.chain", "must not be empty".to_owned()));
        }
        if self.network.nodes.is_empty() {
            return Err(invalid("network.nodes", "must not be empty".to_owned()));
        }
        if self.network.nodes.len() > MAX_NODES {
            return Err(invalid(
                "network.nodes",
                format!("at most {MAX_NODES} nodes are supported"),
            ));
        }
        if let Some(unknown) = self
            .network
            .master_nodes
            .iter()
            .find(|m| !self.network.nodes.contains(m))
        {
            return Err(invalid(
                "network.master_nodes",
                format!("'{unknown}' is not listed in network.nodes"),
            ));
        }

        if self.runner.cli_path.is_empty() {
            return Err(invalid("runner.cli_path", "must not be empty".to_owned()));
        }
        if self.runner.rpc_port == 0 {
            return Err(invalid("runner.rpc_port", "must be non-zero".to_owned()));
        }
        if !matches!(self.runner.rpc_scheme.as_str(), "http" | "https") {
            return Err(invalid(
                "runner.rpc_scheme",
                "must be one of: http, https".to_owned(),
            ));
        }

        let timeouts = [
            ("runner.command_timeout_secs", self.runner.command_timeout_secs),
            (
                "monitoring.consensus_timeout_secs",
                self.monitoring.consensus_timeout_secs,
            ),
            (
                "monitoring.health_timeout_secs",
                self.monitoring.health_timeout_secs,
            ),
        ];
        for (field, value) in timeouts {
            if value == 0 || value > MAX_TIMEOUT_SECS {
                return Err(invalid(
                    field,
                    format!("must be between 1 and {MAX_TIMEOUT_SECS}"),
                ));
            }
        }

        let intervals = [
            (
                "monitoring.datum_check_interval_ms",
                self.monitoring.datum_check_interval_ms,
            ),
            (
                "monitoring.consensus_check_interval_secs",
                self.monitoring.consensus_check_interval_secs,
            ),
            ("monitoring.heartbeat_secs", self.monitoring.heartbeat_secs),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(invalid(field, "must be greater than 0".to_owned()));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> StageEnvError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 테스트 네트워크 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// 네트워크 이름 (`-net` 인자)
    pub name: String,
    /// 기본 체인 이름 (`-chain` 인자)
    pub chain: String,
    /// 클러스터를 구성하는 노드 ID 목록
    pub nodes: Vec<String>,
    /// 검증을 담당하는 마스터 노드 ID 목록
    pub master_nodes: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "stagenet".to_owned(),
            chain: "main".to_owned(),
            nodes: vec!["node1".to_owned(), "node2".to_owned(), "node3".to_owned()],
            master_nodes: vec!["node1".to_owned(), "node2".to_owned(), "node3".to_owned()],
        }
    }
}

/// 노드 명령 실행 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// docker 실행 파일
    pub docker_bin: String,
    /// 컨테이너 내부 노드 CLI 경로
    pub cli_path: String,
    /// 컨테이너 이름 접두어 (`node3` → `{prefix}node-3`)
    pub container_prefix: String,
    /// 노드 JSON-RPC 포트
    pub rpc_port: u16,
    /// 노드 JSON-RPC 스킴 (http, https)
    pub rpc_scheme: String,
    /// Python 스텝 인터프리터
    pub python_bin: String,
    /// 스텝이 타임아웃을 지정하지 않았을 때의 명령 타임아웃 (초)
    pub command_timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            docker_bin: "docker".to_owned(),
            cli_path: "cellframe-node-cli".to_owned(),
            container_prefix: "cellframe-stage-".to_owned(),
            rpc_port: 8545,
            rpc_scheme: "http".to_owned(),
            python_bin: "python3".to_owned(),
            command_timeout_secs: 30,
        }
    }
}

impl RunnerConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// 모니터링 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// 데이텀 폴링 기본 간격 (밀리초)
    pub datum_check_interval_ms: u64,
    /// 멤풀 최초 관측 유예 시간 (밀리초)
    pub mempool_grace_ms: u64,
    /// 정체 시 하트비트 로그 간격 (초)
    pub heartbeat_secs: u64,
    /// 합의 상태 폴링 간격 (초)
    pub consensus_check_interval_secs: u64,
    /// 합의 진행 로그 간격 (초)
    pub consensus_progress_secs: u64,
    /// 네트워크 준비 대기 기본 타임아웃 (초)
    pub consensus_timeout_secs: u64,
    /// 헬스체크 요청 타임아웃 (초)
    pub health_timeout_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            datum_check_interval_ms: 2000,
            mempool_grace_ms: 500,
            heartbeat_secs: 10,
            consensus_check_interval_secs: 2,
            consensus_progress_secs: 5,
            consensus_timeout_secs: 120,
            health_timeout_secs: 10,
        }
    }
}

// ─── 환경변수 오버라이드 헬퍼 ─────────────────────────────────────

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = StageEnvConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.network.name, "stagenet");
        assert_eq!(config.network.chain, "main");
        assert_eq!(config.network.nodes.len(), 3);
        assert_eq!(config.runner.cli_path, "cellframe-node-cli");
        assert_eq!(config.monitoring.mempool_grace_ms, 500);
    }

    #[test]
    fn default_config_passes_validation() {
        StageEnvConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_partial_toml_keeps_defaults() {
        let config = StageEnvConfig::parse(
            r#"
[network]
name = "devnet"
nodes = ["node1", "node2", "node3", "node4"]

[monitoring]
consensus_timeout_secs = 300
"#,
        )
        .unwrap();
        assert_eq!(config.network.name, "devnet");
        assert_eq!(config.network.chain, "main");
        assert_eq!(config.network.nodes.len(), 4);
        assert_eq!(config.monitoring.consensus_timeout_secs, 300);
        assert_eq!(config.monitoring.datum_check_interval_ms, 2000);
    }

    #[test]
    fn parse_invalid_toml_fails() {
        let err = StageEnvConfig::parse("[network\nname=").unwrap_err();
        assert!(matches!(
            err,
            StageEnvError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_unknown_log_level() {
        let mut config = StageEnvConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("general.log_level"));
    }

    #[test]
    fn validate_rejects_empty_nodes() {
        let mut config = StageEnvConfig::default();
        config.network.nodes.clear();
        config.network.master_nodes.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("network.nodes"));
    }

    #[test]
    fn validate_rejects_master_not_in_nodes() {
        let mut config = StageEnvConfig::default();
        config.network.master_nodes.push("node9".to_owned());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("node9"));
    }

    #[test]
    fn validate_rejects_unknown_rpc_scheme() {
        let mut config = StageEnvConfig::default();
        config.runner.rpc_scheme = "ftp".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("runner.rpc_scheme"));
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut config = StageEnvConfig::default();
        config.monitoring.datum_check_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_oversized_timeout() {
        let mut config = StageEnvConfig::default();
        config.monitoring.consensus_timeout_secs = MAX_TIMEOUT_SECS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn env_overrides_apply() {
        // SAFETY: serial 테스트에서만 환경변수를 변경
        unsafe {
            std::env::set_var("STAGE_ENV_NETWORK_NAME", "envnet");
            std::env::set_var("STAGE_ENV_NETWORK_NODES", "node1, node2,,node5");
            std::env::set_var("STAGE_ENV_RUNNER_RPC_PORT", "9545");
        }

        let mut config = StageEnvConfig::default();
        config.apply_env_overrides();

        unsafe {
            std::env::remove_var("STAGE_ENV_NETWORK_NAME");
            std::env::remove_var("STAGE_ENV_NETWORK_NODES");
            std::env::remove_var("STAGE_ENV_RUNNER_RPC_PORT");
        }

        assert_eq!(config.network.name, "envnet");
        assert_eq!(config.network.nodes, vec!["node1", "node2", "node5"]);
        assert_eq!(config.runner.rpc_port, 9545);
    }

    #[test]
    #[serial]
    fn env_override_with_bad_number_is_ignored() {
        unsafe {
            std::env::set_var("STAGE_ENV_MONITORING_HEARTBEAT_SECS", "often");
        }
        let mut config = StageEnvConfig::default();
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("STAGE_ENV_MONITORING_HEARTBEAT_SECS");
        }
        assert_eq!(config.monitoring.heartbeat_secs, 10);
    }

    #[tokio::test]
    async fn from_file_missing_path_is_file_not_found() {
        let err = StageEnvConfig::from_file("/nonexistent/stage-env.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StageEnvError::Config(ConfigError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stage-env.toml");
        std::fs::write(&path, "[runner]\ncli_path = \"/opt/cellframe-node/bin/cellframe-node-cli\"\n")
            .unwrap();

        let config = StageEnvConfig::from_file(&path).await.unwrap();
        assert_eq!(
            config.runner.cli_path,
            "/opt/cellframe-node/bin/cellframe-node-cli"
        );
    }
}
