//! 모니터링 에러 타입
//!
//! [`MonitoringError`]는 합의 대기, 헬스체크, 노드 메트릭 수집 중의 실패를 표현합니다.
//! 데이텀 모니터는 실패를 에러가 아닌 [`crate::datum::DatumStatus`]로 돌려주므로
//! 여기에는 나타나지 않습니다.

use stage_env_core::error::{RunnerError, StageEnvError};

use crate::consensus::NetworkConsensusState;

/// 모니터링 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum MonitoringError {
    /// 제한 시간 안에 네트워크가 준비 상태에 도달하지 못함
    #[error("network not ready after {waited_secs:.0}s: {state}")]
    ConsensusTimeout {
        waited_secs: f64,
        /// 마지막으로 관측한 합의 상태
        state: Box<NetworkConsensusState>,
        /// 노드별 진단 줄 (`node2: offline`, `node3: 12 blocks` ...)
        node_details: Vec<String>,
    },

    /// 제한 시간 안에 노드가 healthy 상태가 되지 못함
    #[error("nodes not healthy after {waited_secs:.0}s: {unhealthy:?}")]
    HealthTimeout {
        waited_secs: f64,
        unhealthy: Vec<String>,
    },

    /// 노드 CLI 명령이 0이 아닌 코드로 종료
    #[error("command '{command}' on {node} exited with {exit_code}: {excerpt}")]
    CommandFailed {
        node: String,
        command: String,
        exit_code: i32,
        excerpt: String,
    },

    /// 하위 실행기 에러
    #[error(transparent)]
    Runner(#[from] RunnerError),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config { field: String, reason: String },
}

impl From<MonitoringError> for StageEnvError {
    fn from(err: MonitoringError) -> Self {
        match err {
            MonitoringError::Runner(inner) => StageEnvError::Runner(inner),
            other => StageEnvError::Monitoring(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failed_display() {
        let err = MonitoringError::CommandFailed {
            node: "node2".to_owned(),
            command: "node dump".to_owned(),
            exit_code: 1,
            excerpt: "net not found".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("node2"));
        assert!(msg.contains("node dump"));
        assert!(msg.contains("net not found"));
    }

    #[test]
    fn consensus_timeout_display_includes_state() {
        let err = MonitoringError::ConsensusTimeout {
            waited_secs: 120.0,
            state: Box::new(NetworkConsensusState {
                expected_nodes: 3,
                online_nodes: 1,
                ..NetworkConsensusState::default()
            }),
            node_details: vec!["node2: offline".to_owned()],
        };
        let msg = err.to_string();
        assert!(msg.contains("120s"));
        assert!(msg.contains("1/3"));
    }

    #[test]
    fn runner_error_keeps_its_kind_when_converted() {
        let err = MonitoringError::from(RunnerError::Timeout {
            node: "node1".to_owned(),
            command: "node list".to_owned(),
            timeout_secs: 10.0,
        });
        let top: StageEnvError = err.into();
        assert!(matches!(top, StageEnvError::Runner(ref e) if e.is_timeout()));
    }

    #[test]
    fn other_errors_become_monitoring() {
        let err = MonitoringError::HealthTimeout {
            waited_secs: 30.0,
            unhealthy: vec!["node3".to_owned()],
        };
        let top: StageEnvError = err.into();
        assert!(matches!(top, StageEnvError::Monitoring(ref m) if m.contains("node3")));
    }
}
