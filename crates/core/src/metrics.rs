//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭 이름을 중앙에서 정의합니다. 각 크레이트는 이 상수로
//! `metrics::counter!()`, `metrics::histogram!()` 매크로를 호출합니다.
//! 레코더는 설치하지 않으며, 하네스를 임베드하는 쪽에서 필요 시 연결합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `stage_env_`
//! - 모듈명: `runner_`, `datum_`, `consensus_`, `scenario_`
//! - 접미어: `_total` (counter), `_seconds` (histogram), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 노드 레이블 키
pub const LABEL_NODE: &str = "node";

/// 스텝 종류 레이블 키 (cli, rpc, bash, ...)
pub const LABEL_STEP_TYPE: &str = "step_type";

/// 데이텀 최종 상태 레이블 키
pub const LABEL_STATUS: &str = "status";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── Runner 메트릭 ─────────────────────────────────────────────────

/// Runner: 실행한 명령 수 (counter, label: node, result)
pub const RUNNER_COMMANDS_TOTAL: &str = "stage_env_runner_commands_total";

/// Runner: 타임아웃으로 종료된 명령 수 (counter, label: node)
pub const RUNNER_TIMEOUTS_TOTAL: &str = "stage_env_runner_timeouts_total";

/// Runner: 명령 실행 시간 (histogram, 초)
pub const RUNNER_COMMAND_DURATION_SECONDS: &str = "stage_env_runner_command_duration_seconds";

// ─── Datum Monitor 메트릭 ──────────────────────────────────────────

/// Datum: 모니터링 완료 수 (counter, label: status)
pub const DATUM_RESULTS_TOTAL: &str = "stage_env_datum_results_total";

/// Datum: 최종 상태까지 걸린 시간 (histogram, 초)
pub const DATUM_WAIT_DURATION_SECONDS: &str = "stage_env_datum_wait_duration_seconds";

// ─── Consensus Monitor 메트릭 ──────────────────────────────────────

/// Consensus: 폴링 라운드 수 (counter)
pub const CONSENSUS_POLLS_TOTAL: &str = "stage_env_consensus_polls_total";

/// Consensus: 마지막 라운드의 온라인 노드 수 (gauge)
pub const CONSENSUS_ONLINE_NODES: &str = "stage_env_consensus_online_nodes";

// ─── Scenario 메트릭 ───────────────────────────────────────────────

/// Scenario: 실행한 스텝 수 (counter, label: step_type, result)
pub const SCENARIO_STEPS_TOTAL: &str = "stage_env_scenario_steps_total";

/// Scenario: 실행한 시나리오 수 (counter, label: result)
pub const SCENARIO_RUNS_TOTAL: &str = "stage_env_scenario_runs_total";

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        RUNNER_COMMANDS_TOTAL,
        "Commands executed against nodes, by node and result"
    );
    describe_counter!(
        RUNNER_TIMEOUTS_TOTAL,
        "Commands killed after exceeding their timeout"
    );
    describe_histogram!(
        RUNNER_COMMAND_DURATION_SECONDS,
        "Wall-clock duration of node commands in seconds"
    );
    describe_counter!(
        DATUM_RESULTS_TOTAL,
        "Datum monitoring outcomes by final status"
    );
    describe_histogram!(
        DATUM_WAIT_DURATION_SECONDS,
        "Time from monitoring start to final datum status in seconds"
    );
    describe_counter!(CONSENSUS_POLLS_TOTAL, "Network consensus poll rounds");
    describe_gauge!(
        CONSENSUS_ONLINE_NODES,
        "Online nodes observed in the latest consensus poll"
    );
    describe_counter!(
        SCENARIO_STEPS_TOTAL,
        "Scenario steps executed, by step type and result"
    );
    describe_counter!(SCENARIO_RUNS_TOTAL, "Scenario executions by result");
}
