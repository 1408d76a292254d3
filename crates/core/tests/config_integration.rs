//! stage-env.toml 통합 설정 테스트
//!
//! - stage-env.toml.example 파싱 테스트
//! - 부분 설정 (일부 섹션만) 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 파일 로딩 / 잘못된 형식 에러 테스트

use stage_env_core::config::StageEnvConfig;
use stage_env_core::error::{ConfigError, StageEnvError};

const EXAMPLE: &str = include_str!("../../../stage-env.toml.example");

// =============================================================================
// stage-env.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_and_validates() {
    let config = StageEnvConfig::parse(EXAMPLE).expect("example config should parse");
    config
        .validate()
        .expect("example config should pass validation");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "pretty");
}

#[test]
fn example_config_matches_built_in_defaults() {
    let example = StageEnvConfig::parse(EXAMPLE).expect("should parse");
    let defaults = StageEnvConfig::default();

    assert_eq!(example.network.name, defaults.network.name);
    assert_eq!(example.network.nodes, defaults.network.nodes);
    assert_eq!(example.network.master_nodes, defaults.network.master_nodes);
    assert_eq!(example.runner.container_prefix, defaults.runner.container_prefix);
    assert_eq!(example.runner.rpc_port, defaults.runner.rpc_port);
    assert_eq!(
        example.runner.command_timeout_secs,
        defaults.runner.command_timeout_secs
    );
    assert_eq!(
        example.monitoring.consensus_timeout_secs,
        defaults.monitoring.consensus_timeout_secs
    );
    assert_eq!(
        example.monitoring.datum_check_interval_ms,
        defaults.monitoring.datum_check_interval_ms
    );
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn empty_config_uses_defaults() {
    let config = StageEnvConfig::parse("").expect("empty config should parse");
    config.validate().expect("defaults should be valid");
    assert_eq!(config.network.chain, "main");
    assert_eq!(config.runner.cli_path, "cellframe-node-cli");
}

#[test]
fn partial_network_section_keeps_other_defaults() {
    let toml = r#"
[network]
name = "devnet"
nodes = ["node1", "node2", "node3", "node4", "node5"]
master_nodes = ["node1", "node2"]
"#;
    let config = StageEnvConfig::parse(toml).expect("should parse");
    config.validate().expect("should validate");

    assert_eq!(config.network.name, "devnet");
    assert_eq!(config.network.chain, "main");
    assert_eq!(config.network.nodes.len(), 5);
    assert_eq!(config.network.master_nodes, ["node1", "node2"]);
    assert_eq!(config.runner.rpc_port, 8545);
}

#[test]
fn master_node_outside_cluster_is_rejected() {
    let toml = r#"
[network]
nodes = ["node1", "node2"]
master_nodes = ["node3"]
"#;
    let config = StageEnvConfig::parse(toml).expect("should parse");
    let err = config.validate().unwrap_err();
    assert!(matches!(
        err,
        StageEnvError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "network.master_nodes"
    ));
}

#[test]
fn zero_command_timeout_is_rejected() {
    let toml = r#"
[runner]
command_timeout_secs = 0
"#;
    let config = StageEnvConfig::parse(toml).expect("should parse");
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("runner.command_timeout_secs"));
}

#[test]
fn unknown_rpc_scheme_is_rejected() {
    let toml = r#"
[runner]
rpc_scheme = "ftp"
"#;
    let config = StageEnvConfig::parse(toml).expect("should parse");
    assert!(config.validate().is_err());
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

#[test]
#[serial_test::serial]
fn env_override_wins_over_toml_value() {
    let toml = r#"
[network]
name = "from-file"
"#;

    let original = std::env::var("STAGE_ENV_NETWORK_NAME").ok();
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("STAGE_ENV_NETWORK_NAME", "from-env");
    }

    let mut config = StageEnvConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();
    let result = config.network.name.clone();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("STAGE_ENV_NETWORK_NAME", val),
            None => std::env::remove_var("STAGE_ENV_NETWORK_NAME"),
        }
    }

    assert_eq!(result, "from-env");
}

#[test]
#[serial_test::serial]
fn env_override_splits_node_list() {
    let original = std::env::var("STAGE_ENV_NETWORK_NODES").ok();
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("STAGE_ENV_NETWORK_NODES", "node1, node2,,node4");
    }

    let mut config = StageEnvConfig::parse("").expect("should parse");
    config.apply_env_overrides();
    let result = config.network.nodes.clone();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("STAGE_ENV_NETWORK_NODES", val),
            None => std::env::remove_var("STAGE_ENV_NETWORK_NODES"),
        }
    }

    assert_eq!(result, ["node1", "node2", "node4"]);
}

#[test]
#[serial_test::serial]
fn consensus_progress_interval_has_env_override() {
    let original = std::env::var("STAGE_ENV_MONITORING_CONSENSUS_PROGRESS_SECS").ok();
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("STAGE_ENV_MONITORING_CONSENSUS_PROGRESS_SECS", "15");
    }

    let mut config = StageEnvConfig::parse("").expect("should parse");
    config.apply_env_overrides();
    let result = config.monitoring.consensus_progress_secs;

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("STAGE_ENV_MONITORING_CONSENSUS_PROGRESS_SECS", val),
            None => std::env::remove_var("STAGE_ENV_MONITORING_CONSENSUS_PROGRESS_SECS"),
        }
    }

    assert_eq!(result, 15);
}

#[test]
#[serial_test::serial]
fn unparsable_numeric_override_is_ignored() {
    let toml = r#"
[runner]
rpc_port = 9000
"#;

    let original = std::env::var("STAGE_ENV_RUNNER_RPC_PORT").ok();
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("STAGE_ENV_RUNNER_RPC_PORT", "not-a-port");
    }

    let mut config = StageEnvConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();
    let result = config.runner.rpc_port;

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("STAGE_ENV_RUNNER_RPC_PORT", val),
            None => std::env::remove_var("STAGE_ENV_RUNNER_RPC_PORT"),
        }
    }

    assert_eq!(result, 9000);
}

// =============================================================================
// 파일 로딩 / 잘못된 형식 에러 테스트
// =============================================================================

#[tokio::test]
#[serial_test::serial]
async fn load_reads_file_from_disk() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("stage-env.toml");
    std::fs::write(&path, EXAMPLE).expect("should write config");

    let config = StageEnvConfig::load(&path).await.expect("should load");
    assert_eq!(config.network.name, "stagenet");
}

#[tokio::test]
async fn missing_file_is_file_not_found() {
    let err = StageEnvConfig::load("/nonexistent/stage-env.toml")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StageEnvError::Config(ConfigError::FileNotFound { ref path }) if path.contains("stage-env.toml")
    ));
}

#[test]
fn malformed_toml_is_parse_error() {
    let err = StageEnvConfig::parse("[network\nname = \"x\"").unwrap_err();
    assert!(matches!(
        err,
        StageEnvError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn wrong_value_type_is_parse_error() {
    let err = StageEnvConfig::parse("[runner]\nrpc_port = \"eighty\"").unwrap_err();
    assert!(matches!(
        err,
        StageEnvError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn effective_config_round_trips_through_toml() {
    let config = StageEnvConfig::default();
    let rendered = toml::to_string_pretty(&config).expect("should serialize");
    let parsed = StageEnvConfig::parse(&rendered).expect("should parse rendered config");
    assert_eq!(parsed.network.nodes, config.network.nodes);
    assert_eq!(parsed.monitoring.heartbeat_secs, config.monitoring.heartbeat_secs);
}
